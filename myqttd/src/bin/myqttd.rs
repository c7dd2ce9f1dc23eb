// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use myqttd::log as broker_log;
use myqttd::{Config, Context, Error};

/// MyQtt broker daemon.
#[derive(Debug, Parser)]
#[command(name = "myqttd", version, about = "A lightweight MQTT v3.1.1 broker")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "/etc/myqtt/myqttd.toml")]
    config: PathBuf,

    /// Parse and validate the configuration, then exit without binding
    /// listener sockets.
    #[arg(long)]
    check_config: bool,
}

fn load_config(path: &PathBuf) -> Result<Config, Error> {
    let content = fs::read_to_string(path).map_err(|err| {
        Error::from_string(
            myqttd::ErrorKind::ConfigError,
            format!("failed to read config file {}: {err}", path.display()),
        )
    })?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    config.validate(!cli.check_config)?;

    if cli.check_config {
        println!("configuration at {} is valid", cli.config.display());
        return Ok(());
    }

    broker_log::init(config.log())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.general().worker_threads())
        .enable_all()
        .build()
        .map_err(|err| {
            Error::from_string(
                myqttd::ErrorKind::IoError,
                format!("failed to start tokio runtime: {err}"),
            )
        })?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<(), Error> {
    let context = Arc::new(Context::build(&config)?);
    myqttd::sys::spawn(Arc::clone(&context));

    let mut tasks = Vec::new();
    for listener in config.listeners() {
        let listener = listener.clone();
        let context = Arc::clone(&context);
        tasks.push(tokio::spawn(async move {
            if let Err(err) = myqttd::listener::serve(listener, context).await {
                log::error!("listener task failed: {err}");
            }
        }));
    }

    shutdown_signal().await;
    log::info!("shutdown signal received, stopping listeners");
    context.shutdown();

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
