//! Logging configuration for the Monday node
//!
//! Uses log4rs with appenders:
//! 1. ConsoleAppender - stdout output
//! 2. RollingFileAppender - log files with rotation
//!
//! The embedded node library keeps its own log inside the node storage
//! directory; this logger covers the service around it.

use anyhow::Context;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

const CONSOLE_PATTERN: &str = "{d(%H:%M:%S)} [{l}] {t} - {m}{n}";
const FILE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} [{l}] {t} - {m}{n}";

/// 20 MB per file
const MAX_LOG_SIZE: u64 = 20 * 1024 * 1024;
const MAX_LOG_FILES: u32 = 10;

/// Path of the active log file
pub fn log_file(log_dir: &Path) -> PathBuf {
    log_dir.join("monday.1.log")
}

fn build_config(log_dir: &Path, level: LevelFilter) -> anyhow::Result<Config> {
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
        .build();

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log dir {}", log_dir.display()))?;

    let log_pattern = log_dir.join("monday.{}.log");
    let log_pattern = log_pattern
        .to_str()
        .context("Log directory path is not valid UTF-8")?;

    // Rolling file appender (20MB per file, 10 files max)
    let roller = FixedWindowRoller::builder()
        .base(1)
        .build(log_pattern, MAX_LOG_FILES)?;
    let trigger = SizeTrigger::new(MAX_LOG_SIZE);
    let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

    let logfile = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
        .build(log_file(log_dir), Box::new(policy))?;

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .build(
            Root::builder()
                .appender("console")
                .appender("logfile")
                .build(level),
        )?;

    Ok(config)
}

/// Initialize log4rs with console and rolling file appenders
///
/// # Arguments
/// * `log_dir` - Directory for log files
/// * `level` - Root level filter
///
/// # Log File Configuration
/// - File: `{log_dir}/monday.1.log`
/// - Max size: 20 MB per file
/// - Max count: 10 files (rotation)
/// - Pattern: `{timestamp} [{level}] {target} - {message}`
pub fn init_logger(log_dir: &Path, level: LevelFilter) -> anyhow::Result<log4rs::Handle> {
    let config = build_config(log_dir, level)?;
    Ok(log4rs::init_config(config)?)
}
