// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::path::PathBuf;
use std::process::{Child, Command};
use std::thread;
use std::time::Duration;

use myqttd::{Error, ErrorKind};

/// Spawns a `myqttd` child process against a test-owned config file and
/// kills it on [`Server::terminate`]. `cargo test` runs integration tests
/// with the package directory as the working directory, so the binary is
/// looked up relative to that.
pub struct Server {
    child: Child,
}

impl Server {
    pub fn start(config_file: &str) -> Result<Self, Error> {
        let exec_file = Self::get_exec_file()?;
        let child = Command::new(exec_file)
            .args(["--config", config_file])
            .spawn()
            .map_err(|err| {
                Error::from_string(ErrorKind::IoError, format!("failed to spawn myqttd: {err}"))
            })?;
        // Give the listener tasks time to bind before tests connect.
        thread::sleep(Duration::from_millis(500));
        Ok(Self { child })
    }

    pub fn terminate(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    fn get_exec_file() -> Result<PathBuf, Error> {
        const IN_PARENT_DIR: &str = "../target/debug/myqttd";
        const IN_GRANDPARENT_DIR: &str = "../../target/debug/myqttd";
        let path = PathBuf::from(IN_PARENT_DIR);
        if path.exists() {
            return Ok(path);
        }
        let path = PathBuf::from(IN_GRANDPARENT_DIR);
        if path.exists() {
            return Ok(path);
        }
        Err(Error::new(
            ErrorKind::IoError,
            "myqttd binary not found, run `cargo build` first",
        ))
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}
