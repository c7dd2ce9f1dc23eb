// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::collections::HashMap;

use myqtt_codec::{PubTopic, QoS, SubTopic};
use tokio::sync::mpsc;

use crate::session::ToSession;

/// One client's registration against a filter: the granted QoS and, while
/// the client is connected, a sender to push matching publishes to. A
/// `None` sender means the client is a `clean_session=false` subscriber
/// that is currently offline; matching publishes are the caller's
/// responsibility to queue through `myqtt-storage` instead.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub client_id: String,
    pub qos: QoS,
    pub sender: Option<mpsc::Sender<ToSession>>,
}

struct Entry {
    filter: SubTopic,
    subscribers: Vec<Subscriber>,
}

/// A domain's subscription table: one [`Router`] per [`crate::domain::Domain`].
///
/// Exact-match filters (the common case) live in `exact`, keyed by the raw
/// filter string, so a publish to a non-wildcard topic never walks the
/// wildcard list. Filters containing `+` or `#` live in `wildcard` and are
/// matched with [`SubTopic::matches`].
#[derive(Default)]
pub struct Router {
    exact: HashMap<String, Entry>,
    wildcard: Vec<Entry>,
}

fn is_wildcard_filter(filter: &str) -> bool {
    filter.contains('+') || filter.contains('#')
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or update) `client_id`'s subscription to `filter`, per
    /// MQTT-3.8.4-3: re-subscribing replaces the prior QoS rather than
    /// duplicating the entry.
    pub fn subscribe(&mut self, client_id: &str, filter: SubTopic, qos: QoS, sender: mpsc::Sender<ToSession>) {
        let subscriber = Subscriber {
            client_id: client_id.to_string(),
            qos,
            sender: Some(sender),
        };
        self.upsert(filter, subscriber);
    }

    /// Recreate a persisted `clean_session=false` subscription recovered
    /// from storage at domain startup: the client is offline until it
    /// reconnects, so no sender is registered yet.
    pub fn subscribe_offline(&mut self, client_id: &str, filter: SubTopic, qos: QoS) {
        let subscriber = Subscriber {
            client_id: client_id.to_string(),
            qos,
            sender: None,
        };
        self.upsert(filter, subscriber);
    }

    /// Clear the live sender on every filter `client_id` holds, across the
    /// whole table, without dropping the subscription entries themselves.
    /// Called on a `clean_session=false` disconnect so a subsequent publish
    /// takes the offline (storage-queued) path in
    /// [`crate::session::route_to_subscriber`] instead of `try_send`-ing
    /// into a channel whose receiver is already gone.
    pub fn mark_client_offline(&mut self, client_id: &str) {
        for entry in self.exact.values_mut().chain(self.wildcard.iter_mut()) {
            for subscriber in &mut entry.subscribers {
                if subscriber.client_id == client_id {
                    subscriber.sender = None;
                }
            }
        }
    }

    /// Re-bind every filter `client_id` holds to a freshly registered
    /// sender, the counterpart of [`Router::mark_client_offline`]. Called
    /// on a `clean_session=false` reconnect so persisted subscriptions
    /// resume live delivery without the client having to re-SUBSCRIBE
    /// (MQTT-3.1.2.4).
    pub fn rebind_client(&mut self, client_id: &str, sender: &mpsc::Sender<ToSession>) {
        for entry in self.exact.values_mut().chain(self.wildcard.iter_mut()) {
            for subscriber in &mut entry.subscribers {
                if subscriber.client_id == client_id {
                    subscriber.sender = Some(sender.clone());
                }
            }
        }
    }

    fn upsert(&mut self, filter: SubTopic, subscriber: Subscriber) {
        let table = if is_wildcard_filter(filter.as_ref()) {
            if let Some(entry) = self.wildcard.iter_mut().find(|e| e.filter == filter) {
                entry.subscribers.retain(|s| s.client_id != subscriber.client_id);
                entry.subscribers.push(subscriber);
                return;
            }
            self.wildcard.push(Entry {
                filter,
                subscribers: vec![subscriber],
            });
            return;
        } else {
            &mut self.exact
        };
        table
            .entry(filter.as_ref().to_string())
            .and_modify(|entry| {
                entry.subscribers.retain(|s| s.client_id != subscriber.client_id);
                entry.subscribers.push(subscriber.clone());
            })
            .or_insert_with(|| Entry {
                filter,
                subscribers: vec![subscriber],
            });
    }

    /// Remove `client_id`'s subscription to `filter` entirely.
    pub fn unsubscribe(&mut self, client_id: &str, filter_str: &str) {
        if let Some(entry) = self.exact.get_mut(filter_str) {
            entry.subscribers.retain(|s| s.client_id != client_id);
            if entry.subscribers.is_empty() {
                self.exact.remove(filter_str);
            }
            return;
        }
        self.wildcard.retain_mut(|entry| {
            if entry.filter.as_ref() == filter_str {
                entry.subscribers.retain(|s| s.client_id != client_id);
            }
            !(entry.filter.as_ref() == filter_str && entry.subscribers.is_empty())
        });
    }

    /// Drop every subscription `client_id` holds, regardless of filter.
    /// Used on a `clean_session=true` disconnect.
    pub fn remove_client(&mut self, client_id: &str) {
        self.exact.retain(|_, entry| {
            entry.subscribers.retain(|s| s.client_id != client_id);
            !entry.subscribers.is_empty()
        });
        self.wildcard.retain_mut(|entry| {
            entry.subscribers.retain(|s| s.client_id != client_id);
            !entry.subscribers.is_empty()
        });
    }

    /// Every subscriber whose filter matches a publish to `topic`, along
    /// with the minimum of the subscriber's granted QoS and the publish's
    /// own QoS (MQTT 3.1.1 §4.3, "maximum QoS").
    #[must_use]
    pub fn matching(&self, topic: &PubTopic, publish_qos: QoS) -> Vec<(Subscriber, QoS)> {
        let mut out = Vec::new();
        if let Some(entry) = self.exact.get(topic.as_ref()) {
            out.extend(entry.subscribers.iter().cloned().map(|s| {
                let qos = s.qos.min(publish_qos);
                (s, qos)
            }));
        }
        for entry in &self.wildcard {
            if entry.filter.matches(topic.as_ref()) {
                out.extend(entry.subscribers.iter().cloned().map(|s| {
                    let qos = s.qos.min(publish_qos);
                    (s, qos)
                }));
            }
        }
        out
    }

    /// Every currently-registered filter string, used to replay retained
    /// messages on (re-)subscribe.
    #[must_use]
    pub fn filters(&self) -> Vec<String> {
        self.exact
            .keys()
            .cloned()
            .chain(self.wildcard.iter().map(|e| e.filter.as_ref().to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(s: &str) -> SubTopic {
        SubTopic::new(s).unwrap()
    }

    #[test]
    fn test_exact_match() {
        let mut router = Router::new();
        let (tx, _rx) = mpsc::channel(1);
        router.subscribe("c1", topic("a/b"), QoS::AtLeastOnce, tx);
        let pub_topic = PubTopic::new("a/b").unwrap();
        let hits = router.matching(&pub_topic, QoS::AtLeastOnce);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.client_id, "c1");
    }

    #[test]
    fn test_wildcard_match_and_qos_downgrade() {
        let mut router = Router::new();
        let (tx, _rx) = mpsc::channel(1);
        router.subscribe("c1", topic("a/+"), QoS::AtMostOnce, tx);
        let pub_topic = PubTopic::new("a/b").unwrap();
        let hits = router.matching(&pub_topic, QoS::ExactOnce);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, QoS::AtMostOnce);
    }

    #[test]
    fn test_unsubscribe_removes_entry() {
        let mut router = Router::new();
        let (tx, _rx) = mpsc::channel(1);
        router.subscribe("c1", topic("a/b"), QoS::AtMostOnce, tx);
        router.unsubscribe("c1", "a/b");
        let pub_topic = PubTopic::new("a/b").unwrap();
        assert!(router.matching(&pub_topic, QoS::AtMostOnce).is_empty());
    }

    #[test]
    fn test_remove_client_clears_all_filters() {
        let mut router = Router::new();
        let (tx, _rx) = mpsc::channel(1);
        router.subscribe("c1", topic("a/b"), QoS::AtMostOnce, tx.clone());
        router.subscribe("c1", topic("c/#"), QoS::AtMostOnce, tx);
        router.remove_client("c1");
        assert!(router.filters().is_empty());
    }

    #[test]
    fn test_mark_client_offline_keeps_entry_but_clears_sender() {
        let mut router = Router::new();
        let (tx, _rx) = mpsc::channel(1);
        router.subscribe("c1", topic("a/b"), QoS::AtLeastOnce, tx.clone());
        router.subscribe("c1", topic("c/#"), QoS::AtLeastOnce, tx);
        router.mark_client_offline("c1");

        // Subscription entries persist (so a later SUBSCRIBE-free reconnect
        // still resumes delivery)...
        assert_eq!(router.filters().len(), 2);
        // ...but the stale sender is gone, so matching() reports no live
        // channel to `try_send` into, steering the caller onto the
        // storage-queued offline path instead of silently dropping the
        // message.
        let pub_topic = PubTopic::new("a/b").unwrap();
        let hits = router.matching(&pub_topic, QoS::AtLeastOnce);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].0.sender.is_none());
    }

    #[test]
    fn test_rebind_client_restores_live_delivery() {
        let mut router = Router::new();
        let (tx, _rx) = mpsc::channel(1);
        router.subscribe("c1", topic("a/b"), QoS::AtLeastOnce, tx);
        router.mark_client_offline("c1");

        let (tx2, _rx2) = mpsc::channel(1);
        router.rebind_client("c1", &tx2);

        let pub_topic = PubTopic::new("a/b").unwrap();
        let hits = router.matching(&pub_topic, QoS::AtLeastOnce);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].0.sender.is_some());
    }
}
