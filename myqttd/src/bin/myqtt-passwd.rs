// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::io::BufRead;
use std::path::PathBuf;

use clap::Parser;
use myqttd::auth::pwd;
use myqttd::Error;

/// Manage a `myqttd` domain's password file.
#[derive(Debug, Parser)]
#[command(name = "myqtt-passwd", version, about = "Manage password files for myqttd")]
struct Cli {
    /// Run in batch mode, reading `password` from the command line instead
    /// of standard input.
    #[arg(short, long)]
    batch: bool,

    /// Delete `username` from the password file instead of adding it.
    #[arg(short, long)]
    delete: bool,

    /// Re-hash every plaintext `username:password` entry already present in
    /// `passwordfile`, in place.
    #[arg(short = 'U', long)]
    update: bool,

    /// Password file to operate on; created if it does not yet exist.
    passwordfile: PathBuf,

    /// Username to add/update/delete.
    username: Option<String>,

    /// Plaintext password; only read in `--batch` mode. Read from standard
    /// input otherwise.
    password: Option<String>,
}

fn read_password_from_stdin() -> Result<String, Error> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

fn main() -> Result<(), Error> {
    std::env::set_var("RUST_LOG", "info");
    env_logger::init();

    let cli = Cli::parse();

    if cli.update {
        pwd::update_file_hash(&cli.passwordfile)?;
        println!("rehashed {}", cli.passwordfile.display());
        return Ok(());
    }

    let Some(username) = cli.username.as_deref() else {
        return Err(Error::new(
            myqttd::ErrorKind::ParameterError,
            "username is required unless --update is given",
        ));
    };

    if cli.delete {
        pwd::add_delete_users(&cli.passwordfile, &[], &[username])?;
        println!("deleted {username} from {}", cli.passwordfile.display());
        return Ok(());
    }

    let password = if cli.batch {
        cli.password.clone().ok_or_else(|| {
            Error::new(
                myqttd::ErrorKind::ParameterError,
                "password is required in --batch mode unless --delete is given",
            )
        })?
    } else {
        read_password_from_stdin()?
    };

    let entry = format!("{username}:{password}");
    pwd::add_delete_users(&cli.passwordfile, &[&entry], &[])?;
    println!("set password for {username} in {}", cli.passwordfile.display());
    Ok(())
}
