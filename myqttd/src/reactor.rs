// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

//! Centralized scheduled-event mechanism replacing the per-connection timers
//! a naive translation of the original select/poll loop would spawn one of
//! per session. A single background task owns a `BinaryHeap` of deadlines
//! and wakes each registered session with a [`crate::session::ToSession::Tick`]
//! message on its own cadence, re-arming with `next = previous + period` so
//! scheduling jitter never accumulates into drift.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::session::ToSession;

type RegistrationId = u64;

struct Registration {
    id: RegistrationId,
    period: Duration,
    sender: mpsc::Sender<ToSession>,
}

struct Deadline {
    at: Instant,
    id: RegistrationId,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}
impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse so `BinaryHeap`, a max-heap, pops the soonest deadline first.
        other.at.cmp(&self.at)
    }
}

enum Command {
    Register {
        period: Duration,
        sender: mpsc::Sender<ToSession>,
        reply: tokio::sync::oneshot::Sender<RegistrationId>,
    },
    Unregister(RegistrationId),
}

/// A handle to the background scheduler task. Cloning shares the same
/// underlying task; dropping every handle lets the task exit.
#[derive(Clone)]
pub struct Scheduler {
    commands: mpsc::Sender<Command>,
}

/// A live registration. Dropping this unregisters the periodic tick.
pub struct Ticket {
    id: RegistrationId,
    commands: mpsc::Sender<Command>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let _ = self.commands.try_send(Command::Unregister(self.id));
    }
}

impl Scheduler {
    /// Spawn the scheduler's background task.
    #[must_use]
    pub fn spawn() -> Self {
        let (commands, mut rx) = mpsc::channel::<Command>(256);
        tokio::spawn(async move {
            let mut next_id: RegistrationId = 0;
            let mut registrations: std::collections::HashMap<RegistrationId, Registration> =
                std::collections::HashMap::new();
            let mut heap: BinaryHeap<Deadline> = BinaryHeap::new();

            loop {
                let sleep = match heap.peek() {
                    Some(deadline) => tokio::time::sleep_until(deadline.at),
                    None => tokio::time::sleep(Duration::from_secs(3600)),
                };
                tokio::pin!(sleep);

                tokio::select! {
                    () = &mut sleep, if !heap.is_empty() => {
                        let Some(deadline) = heap.pop() else { continue };
                        let Some(registration) = registrations.get(&deadline.id) else {
                            continue;
                        };
                        if registration.sender.try_send(ToSession::Tick).is_ok() {
                            heap.push(Deadline {
                                at: deadline.at + registration.period,
                                id: deadline.id,
                            });
                        } else {
                            registrations.remove(&deadline.id);
                        }
                    }
                    cmd = rx.recv() => {
                        match cmd {
                            Some(Command::Register { period, sender, reply }) => {
                                let id = next_id;
                                next_id += 1;
                                heap.push(Deadline { at: Instant::now() + period, id });
                                registrations.insert(id, Registration { id, period, sender });
                                let _ = reply.send(id);
                            }
                            Some(Command::Unregister(id)) => {
                                registrations.remove(&id);
                            }
                            None => break,
                        }
                    }
                }
            }
        });
        Self { commands }
    }

    /// Register a session for a recurring `Tick` message every `period`.
    ///
    /// Returns a [`Ticket`]; dropping it unregisters the session.
    pub async fn register(&self, period: Duration, sender: mpsc::Sender<ToSession>) -> Ticket {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        let _ = self
            .commands
            .send(Command::Register {
                period,
                sender,
                reply: reply_tx,
            })
            .await;
        let id = reply_rx.await.unwrap_or(0);
        Ticket {
            id,
            commands: self.commands.clone(),
        }
    }
}
