// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

//! Logging setup for the `myqttd` binary: `env_logger` to stderr when no
//! `[log].log_file` is configured, `log4rs` with gzip'd size-rolled files
//! otherwise. Kept from `RustRobotics-hebo/hebo/src/log.rs` near-verbatim;
//! only the `config::Log` field access (`Option<String>` vs. the teacher's
//! `PathBuf`) changed.

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::policy::compound::{
    roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
};
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::config::{Log, LogLevel};
use crate::error::{Error, ErrorKind};

const LOG_FILE_SIZE: u64 = 16 * 1024 * 1024;
const ROLLER_PATTERN: &str = ".{}.gz";
const ROLLER_COUNT: u32 = 10;
const STDOUT_NAME: &str = "stdout";
const ROLLER_NAME: &str = "roller";

const fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Off => LevelFilter::Off,
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

/// Initialize process-wide logging from `[log]`.
///
/// With no `log_file` configured, falls back to `env_logger` writing to
/// stderr at `log_level`. With one configured, builds a `log4rs` pipeline
/// that writes to both stderr and a size-rolled, gzip'd file.
///
/// # Errors
///
/// Returns an error if `log4rs` rejects the roller pattern or appender
/// configuration.
pub fn init(log_conf: &Log) -> Result<(), Error> {
    let level = level_filter(log_conf.log_level());

    let Some(log_file) = log_conf.log_file() else {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(level);
        if !log_conf.console_log() {
            builder.target(env_logger::Target::Pipe(Box::new(std::io::sink())));
        }
        builder.init();
        return Ok(());
    };

    let stdout = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{d} {h({l})} - {m}{n}")))
        .build();

    let roller_pattern = format!("{log_file}{ROLLER_PATTERN}");
    let roller = FixedWindowRoller::builder()
        .build(&roller_pattern, ROLLER_COUNT)
        .map_err(|err| {
            Error::from_string(ErrorKind::ConfigError, format!("failed to build roller: {err}"))
        })?;
    let rolling_policy = Box::new(CompoundPolicy::new(
        Box::new(SizeTrigger::new(LOG_FILE_SIZE)),
        Box::new(roller),
    ));
    let requests = RollingFileAppender::builder()
        .build(log_file, rolling_policy)
        .map_err(|err| {
            Error::from_string(ErrorKind::ConfigError, format!("failed to build roller appender: {err}"))
        })?;

    let mut appenders = vec![Appender::builder().build(ROLLER_NAME, Box::new(requests))];
    let mut root_appenders = vec![ROLLER_NAME];
    if log_conf.console_log() {
        appenders.push(Appender::builder().build(STDOUT_NAME, Box::new(stdout)));
        root_appenders.push(STDOUT_NAME);
    }

    let config = LogConfig::builder()
        .appenders(appenders)
        .build(Root::builder().appenders(root_appenders).build(level))
        .map_err(|err| {
            Error::from_string(ErrorKind::ConfigError, format!("failed to build log4rs config: {err}"))
        })?;

    log4rs::init_config(config).map_err(|err| {
        Error::from_string(ErrorKind::ConfigError, format!("failed to init log4rs: {err}"))
    })?;
    Ok(())
}
