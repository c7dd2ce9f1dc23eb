// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use super::pwd::Password;
use crate::error::{Error, ErrorKind};

/// A domain's users database, loaded from a `myqtt-passwd`-format file.
///
/// Grounds the "users-db" half of domain dispatch (spec.md §4.7): a
/// username/password pair is checked against `entries` before a client is
/// admitted into the domain.
#[derive(Debug, Default, Clone)]
pub struct FileAuth {
    entries: BTreeMap<String, Password>,
}

impl FileAuth {
    /// Load a users database from `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or a line is malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let fd = File::open(path.as_ref())?;
        let reader = BufReader::new(fd);
        let mut entries = BTreeMap::new();
        for line in reader.lines() {
            let line = line?;
            if let Some((username, password)) = Password::parse(&line)? {
                entries.insert(username.to_string(), password);
            }
        }
        Ok(Self { entries })
    }

    /// Returns true if `username` is present in the database, regardless of
    /// whether the supplied password matches.
    #[must_use]
    pub fn contains(&self, username: &str) -> bool {
        self.entries.contains_key(username)
    }

    /// Check a username/password pair against the loaded database.
    #[must_use]
    pub fn check(&self, username: &str, password: &[u8]) -> bool {
        self.entries
            .get(username)
            .map(|entry| entry.is_match(password).unwrap_or(false))
            .unwrap_or(false)
    }
}

/// Re-hash every plaintext password entry in `passwd_file` in place.
///
/// Used by the `myqtt-passwd` CLI to migrate a freshly-written file of
/// `username:password` lines into the salted-hash on-disk format.
///
/// # Errors
///
/// Returns error if the file cannot be read back or rewritten.
pub fn update_file_hash<P: AsRef<Path>>(passwd_file: P) -> Result<(), Error> {
    let fd = File::open(passwd_file.as_ref())?;
    let reader = BufReader::new(fd);
    let mut result = String::new();
    for line in reader.lines() {
        let line = line?;
        match Password::parse_raw_text(&line) {
            Err(err) => {
                log::error!("err: {:?}, line: {}", err, line);
            }
            Ok(None) => {
                // continue
            }
            Ok(Some((username, password))) => {
                let hashed_line = password.dump(username);
                result.push_str(&hashed_line);
                result.push('\n');
            }
        }
    }

    let mut fd = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(passwd_file.as_ref())?;
    fd.write_all(result.as_bytes()).map_err(Into::into)
}

/// Add and/or delete users in `passwd_file`, rewriting it in sorted order.
///
/// # Errors
///
/// Returns error if the file cannot be read or rewritten, or if a name
/// passed to `delete_users` is not a bare username.
pub fn add_delete_users<P: AsRef<Path>>(
    passwd_file: P,
    add_users: &[&str],
    delete_users: &[&str],
) -> Result<(), Error> {
    let fd = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(passwd_file.as_ref())?;
    let reader = BufReader::new(fd);
    let mut users = BTreeMap::new();
    for line in reader.lines() {
        let line = line?;
        match Password::parse(&line) {
            Err(err) => {
                log::error!("Failed to parse line {:?}, got err: {:?}", line, err);
                return Err(err);
            }
            Ok(None) => {
                // continue
            }
            Ok(Some((username, password))) => {
                users.insert(username.to_string(), password);
            }
        }
    }

    // Add/update users
    for item in add_users {
        match Password::parse_raw_text(item) {
            Err(err) => {
                log::error!("Failed to parse pair {:?}, got err: {:?}", item, err);
                return Err(err);
            }
            Ok(None) => {
                log::info!("Ignore empty line: {}", item);
                // continue
            }
            Ok(Some((username, password))) => {
                users.insert(username.to_string(), password);
            }
        }
    }

    // Delete users
    for username in delete_users {
        if username.contains(':') {
            return Err(Error::from_string(
                ErrorKind::ParameterError,
                format!("Invalid username to delete: {:?}", username),
            ));
        }

        users.remove(*username);
    }

    let mut fd = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(passwd_file.as_ref())?;
    for (username, password) in users {
        let line = password.dump(&username);
        log::info!("line: {}", line);
        fd.write_all(line.as_bytes())?;
        fd.write_all(b"\n")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_file_auth_check() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let password = Password::generate(b"secret").unwrap();
        writeln!(file, "{}", password.dump("alice")).unwrap();
        let auth = FileAuth::load(file.path()).unwrap();
        assert!(auth.contains("alice"));
        assert!(auth.check("alice", b"secret"));
        assert!(!auth.check("alice", b"wrong"));
        assert!(!auth.check("bob", b"secret"));
    }
}
