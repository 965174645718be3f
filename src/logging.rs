// Logging backend for asyncnotify
// Every record carries the name and id of the thread that emitted it, since
// notifications hop between producer threads and their dispatch thread.
//
// Supports text or JSON output to the console, a file, or both, with
// independent console and file levels.
//
// Example usage:
// ```
// let config = LogConfig {
//     console_level: LevelFilter::Info,
//     file_level: Some(LevelFilter::Trace),
//     format: LogFormat::Json,
//     destination: LogDestination::Both(PathBuf::from("asyncnotify.log")),
// };
// init_logger(config)?;
// log::info!("Dispatching notifications");
// ```

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::{Level, LevelFilter};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}. Valid options: text, json", s)),
        }
    }
}

/// Log destination options
#[derive(Debug, Clone, PartialEq)]
pub enum LogDestination {
    Console,
    File(PathBuf),
    Both(PathBuf),
}

impl LogDestination {
    fn file_path(&self) -> Option<&Path> {
        match self {
            LogDestination::Console => None,
            LogDestination::File(path) | LogDestination::Both(path) => Some(path.as_path()),
        }
    }

    fn includes_console(&self) -> bool {
        !matches!(self, LogDestination::File(_))
    }
}

/// JSON log entry structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonLogEntry {
    pub timestamp: String,
    pub level: String,
    pub thread: String,
    pub target: String,
    pub message: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub console_level: LevelFilter,
    pub file_level: Option<LevelFilter>,
    pub format: LogFormat,
    pub destination: LogDestination,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_level: LevelFilter::Info,
            file_level: None,
            format: LogFormat::Text,
            destination: LogDestination::Console,
        }
    }
}

impl LogConfig {
    /// Most verbose level any destination accepts
    pub fn max_level(&self) -> LevelFilter {
        match self.file_level {
            Some(file_level) => file_level.max(self.console_level),
            None => self.console_level,
        }
    }
}

/// Label for the calling thread: its name when it has one, then its id
fn thread_label() -> String {
    let current = thread::current();
    match current.name() {
        Some(name) => format!("{}/{:?}", name, current.id()),
        None => format!("{:?}", current.id()),
    }
}

/// `log` backend used by the asyncnotify binary
pub struct NotifyLogger {
    config: LogConfig,
    file: Option<Mutex<File>>,
}

impl NotifyLogger {
    /// Create the logger, opening the log file up front when one is configured
    pub fn new(config: LogConfig) -> Result<Self> {
        let file = match config.destination.file_path() {
            Some(path) => Some(Mutex::new(Self::open_log_file(path)?)),
            None => None,
        };
        Ok(Self { config, file })
    }

    fn open_log_file(path: &Path) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))
    }

    fn format_timestamp() -> String {
        let now: DateTime<Local> = Local::now();
        now.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    }

    fn format_text_message(&self, level: Level, thread: &str, message: &str) -> String {
        format!(
            "{} [{}] ({}) {}",
            Self::format_timestamp(),
            level.to_string().to_uppercase(),
            thread,
            message
        )
    }

    fn format_json_message(&self, level: Level, thread: &str, target: &str, message: &str) -> Result<String> {
        let entry = JsonLogEntry {
            timestamp: Self::format_timestamp(),
            level: level.to_string().to_uppercase(),
            thread: thread.to_string(),
            target: target.to_string(),
            message: message.to_string(),
        };

        serde_json::to_string(&entry).context("Failed to serialize log entry to JSON")
    }

    fn should_log_to_console(&self, level: Level) -> bool {
        self.config.destination.includes_console() && level <= self.config.console_level
    }

    fn should_log_to_file(&self, level: Level) -> bool {
        self.file.is_some() && self.config.file_level.is_some_and(|file_level| level <= file_level)
    }

    fn write_to_console(&self, formatted_message: &str) -> Result<()> {
        writeln!(io::stderr(), "{}", formatted_message).context("Failed to write to console")
    }

    fn write_to_file(&self, formatted_message: &str) -> Result<()> {
        if let Some(file) = &self.file {
            // One lock per record keeps lines from different threads whole
            writeln!(file.lock(), "{}", formatted_message).context("Failed to write to log file")?;
        }
        Ok(())
    }

    fn format_record(&self, record: &log::Record) -> String {
        let message = record.args().to_string();
        let level = record.level();
        let thread = thread_label();

        match self.config.format {
            LogFormat::Text => self.format_text_message(level, &thread, &message),
            LogFormat::Json => match self.format_json_message(level, &thread, record.target(), &message) {
                Ok(json) => json,
                Err(e) => {
                    eprintln!("JSON formatting error: {}. Falling back to text format.", e);
                    self.format_text_message(level, &thread, &message)
                }
            },
        }
    }
}

impl log::Log for NotifyLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.should_log_to_console(metadata.level()) || self.should_log_to_file(metadata.level())
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let level = record.level();
        let formatted_message = self.format_record(record);

        if self.should_log_to_console(level) {
            if let Err(e) = self.write_to_console(&formatted_message) {
                eprintln!("Console logging error: {}", e);
            }
        }
        if self.should_log_to_file(level) {
            if let Err(e) = self.write_to_file(&formatted_message) {
                eprintln!("File logging error: {}", e);
            }
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
        if let Some(file) = &self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Initialize the logging system with the given configuration
pub fn init_logger(config: LogConfig) -> Result<()> {
    let max_level = config.max_level();
    let logger = NotifyLogger::new(config)?;

    log::set_boxed_logger(Box::new(logger)).context("Failed to set global logger")?;
    log::set_max_level(max_level);

    Ok(())
}

/// Convert string to LevelFilter
pub fn parse_log_level(level_str: &str) -> Result<LevelFilter> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(LevelFilter::Error),
        "warn" => Ok(LevelFilter::Warn),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        "off" => Ok(LevelFilter::Off),
        _ => Err(anyhow::anyhow!(
            "Invalid log level: {}. Valid levels: error, warn, info, debug, trace, off",
            level_str
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;
    use tempfile::tempdir;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(parse_log_level("error").unwrap(), LevelFilter::Error);
        assert_eq!(parse_log_level("Warn").unwrap(), LevelFilter::Warn);
        assert_eq!(parse_log_level("trace").unwrap(), LevelFilter::Trace);
        assert_eq!(parse_log_level("off").unwrap(), LevelFilter::Off);
        assert!(parse_log_level("verbose").is_err());
    }

    #[test]
    fn test_max_level_takes_most_verbose_destination() {
        let config = LogConfig {
            console_level: LevelFilter::Warn,
            file_level: Some(LevelFilter::Trace),
            ..LogConfig::default()
        };
        assert_eq!(config.max_level(), LevelFilter::Trace);
        assert_eq!(LogConfig::default().max_level(), LevelFilter::Info);
    }

    #[test]
    fn test_text_message_names_thread() {
        let logger = NotifyLogger::new(LogConfig::default()).unwrap();

        let label = thread::Builder::new()
            .name("dispatch-7".to_string())
            .spawn(thread_label)
            .unwrap()
            .join()
            .unwrap();
        assert!(label.starts_with("dispatch-7/ThreadId("));

        let formatted = logger.format_text_message(Level::Debug, &label, "Dispatch loop started");
        assert!(formatted.contains("[DEBUG]"));
        assert!(formatted.contains("(dispatch-7/ThreadId("));
        assert!(formatted.ends_with("Dispatch loop started"));
    }

    #[test]
    fn test_json_message_has_thread_and_target() {
        let logger = NotifyLogger::new(LogConfig::default()).unwrap();
        let formatted = logger
            .format_json_message(Level::Info, "main/ThreadId(1)", "asyncnotify::demo", "done")
            .unwrap();

        let entry: JsonLogEntry = serde_json::from_str(&formatted).unwrap();
        assert_eq!(entry.level, "INFO");
        assert_eq!(entry.thread, "main/ThreadId(1)");
        assert_eq!(entry.target, "asyncnotify::demo");
        assert_eq!(entry.message, "done");
    }

    #[test]
    fn test_file_destination_respects_file_level() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notify.log");
        let logger = NotifyLogger::new(LogConfig {
            console_level: LevelFilter::Off,
            file_level: Some(LevelFilter::Debug),
            format: LogFormat::Text,
            destination: LogDestination::File(path.clone()),
        })
        .unwrap();

        logger.log(
            &log::Record::builder()
                .level(Level::Debug)
                .args(format_args!("bound notifier"))
                .build(),
        );
        logger.log(
            &log::Record::builder()
                .level(Level::Trace)
                .args(format_args!("queued event"))
                .build(),
        );
        logger.flush();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("bound notifier"));
        assert!(!written.contains("queued event"));
    }

    #[test]
    fn test_console_only_destination_never_logs_to_file() {
        let logger = NotifyLogger::new(LogConfig {
            file_level: Some(LevelFilter::Trace),
            ..LogConfig::default()
        })
        .unwrap();
        assert!(!logger.should_log_to_file(Level::Error));
        assert!(logger.should_log_to_console(Level::Info));
        assert!(!logger.should_log_to_console(Level::Debug));
    }
}
