use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Local;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use super::config::ServerConfig;

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} - {l} - {m}{n}";

/// Unknown level names fall back to `info`.
pub fn parse_level(level: &str) -> LevelFilter {
    LevelFilter::from_str(level.trim()).unwrap_or(LevelFilter::Info)
}

fn log_file_path(log_dir: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y-%m-%d-%H_%M").to_string();
    log_dir.join(format!("ycnode-{timestamp}.log"))
}

/// Console plus a timestamped file under `log_dir`. Returns the file path.
pub fn setup_logging(config: &ServerConfig) -> Result<PathBuf, String> {
    std::fs::create_dir_all(&config.log_dir)
        .map_err(|e| format!("Failed to create log directory {}: {e}", config.log_dir.display()))?;
    let log_path = log_file_path(&config.log_dir);

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build(&log_path)
        .map_err(|e| format!("Failed to open log file {}: {e}", log_path.display()))?;
    let console_appender = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    let log_config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(file_appender)))
        .appender(Appender::builder().build("console", Box::new(console_appender)))
        .build(
            Root::builder()
                .appender("file")
                .appender("console")
                .build(parse_level(&config.log_level)),
        )
        .map_err(|e| format!("Invalid logging configuration: {e}"))?;

    log4rs::init_config(log_config).map_err(|e| format!("Failed to install logger: {e}"))?;
    Ok(log_path)
}
