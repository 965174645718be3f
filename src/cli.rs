use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::Parser;
use log::{debug, LevelFilter};

use crate::config::ConfigManager;
use crate::demo::DemoConfig;
use crate::logging::{self, LogConfig, LogDestination, LogFormat};

/// Thread-affine asynchronous notification demo
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "asyncnotify")]
#[command(about = "Raises events from producer threads and delivers them on the thread that owns the notifier")]
#[command(version)]
pub struct Args {
    /// Verbose output (debug level logging)
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet output (error level logging only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug output (trace level logging)
    #[arg(long)]
    pub debug: bool,

    /// Log format: text or json
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log file path for file output
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log level for file output (independent of console level)
    #[arg(long, value_name = "LEVEL")]
    pub log_file_level: Option<String>,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Configuration section name
    #[arg(long, value_name = "SECTION")]
    pub config_name: Option<String>,

    /// Number of producer threads
    #[arg(short, long, value_name = "N")]
    pub producers: Option<usize>,

    /// Events sent by each producer
    #[arg(short, long, value_name = "N")]
    pub events: Option<usize>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: false,
            quiet: false,
            debug: false,
            log_format: "text".to_string(),
            log_file: None,
            log_file_level: None,
            config_file: None,
            config_name: None,
            producers: None,
            events: None,
        }
    }
}

/// Parse command line arguments
pub fn parse_args() -> Args {
    Args::parse()
}

/// Validate CLI argument combinations
pub fn validate_args(args: &Args) -> Result<()> {
    let log_flags_count = [args.verbose, args.quiet, args.debug]
        .iter()
        .filter(|&&flag| flag)
        .count();

    if log_flags_count > 1 {
        anyhow::bail!("Conflicting log level flags: only one of --verbose, --quiet, or --debug may be specified");
    }

    LogFormat::from_str(&args.log_format).map_err(|e| anyhow::anyhow!(e))?;

    if let Some(level) = &args.log_file_level {
        logging::parse_log_level(level)?;
        if args.log_file.is_none() {
            anyhow::bail!("--log-file-level requires --log-file to be specified");
        }
    }

    if args.producers == Some(0) {
        anyhow::bail!("--producers must be at least 1");
    }

    Ok(())
}

/// Load configuration from `--config-file` or by discovery, then apply
/// `--config-name`
pub fn load_configuration(args: &Args) -> Result<ConfigManager> {
    let mut manager = match &args.config_file {
        Some(config_file) => ConfigManager::load_from_file(config_file.clone())?,
        None => ConfigManager::load()?,
    };

    if let Some(section_name) = &args.config_name {
        manager.select_section(section_name.clone());
    }

    Ok(manager)
}

/// Build the logging configuration. Flags take precedence over the
/// configuration file.
pub fn configure_logging(args: &Args, config: &ConfigManager) -> Result<LogConfig> {
    let console_level = if args.debug {
        LevelFilter::Trace
    } else if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Error
    } else {
        config.get_log_level("base", "console-level")?.unwrap_or(LevelFilter::Info)
    };

    let format = if args.log_format.eq_ignore_ascii_case("text") {
        match config.get_value("base", "log-format") {
            Some(format) => LogFormat::from_str(format).map_err(|e| anyhow::anyhow!(e))?,
            None => LogFormat::Text,
        }
    } else {
        LogFormat::from_str(&args.log_format).map_err(|e| anyhow::anyhow!(e))?
    };

    let log_file = args.log_file.clone().or_else(|| config.get_path("base", "log-file"));
    let file_level = match &args.log_file_level {
        Some(level) => Some(logging::parse_log_level(level)?),
        None => config.get_log_level("base", "file-log-level")?,
    };

    let (destination, file_level) = match log_file {
        Some(path) => (LogDestination::Both(path), Some(file_level.unwrap_or(console_level))),
        None => (LogDestination::Console, None),
    };

    Ok(LogConfig {
        console_level,
        file_level,
        format,
        destination,
    })
}

/// Demonstration settings: configuration file values overridden by flags
pub fn demo_config(args: &Args, config: &ConfigManager) -> Result<DemoConfig> {
    let mut demo = config.get_demo_config()?;
    if let Some(producers) = args.producers {
        demo.producers = producers;
    }
    if let Some(events) = args.events {
        demo.events = events;
    }
    demo.validate()?;

    debug!("Demo configuration: {:?}", demo);
    Ok(demo)
}
