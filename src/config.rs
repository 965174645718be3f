use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use toml::Value;

use crate::demo::DemoConfig;
use crate::notifications::DispatchConfig;

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "ASYNCNOTIFY_CONFIG";

/// Configuration storage - section_name -> key -> value
pub type Configuration = HashMap<String, HashMap<String, String>>;

/// Configuration manager
#[derive(Debug, Default)]
pub struct ConfigManager {
    config: Configuration,
    config_file_path: Option<PathBuf>,
    selected_section: Option<String>,
}

impl ConfigManager {
    /// Create a new ConfigManager from a Configuration (primarily for testing)
    pub fn from_config(config: Configuration) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Load configuration using discovery hierarchy
    pub fn load() -> Result<Self> {
        debug!("Starting configuration discovery");

        for path in discover_config_files() {
            debug!("Attempting to load config from: {}", path.display());
            if path.exists() {
                return Self::load_from_file(path);
            }
        }

        info!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from explicit file path
    pub fn load_from_file(path: PathBuf) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = parse_toml_config(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!("Loaded configuration from: {}", path.display());
        Ok(Self {
            config,
            config_file_path: Some(path),
            selected_section: None,
        })
    }

    /// File the configuration was loaded from, if any
    pub fn config_file_path(&self) -> Option<&PathBuf> {
        self.config_file_path.as_ref()
    }

    /// Get value from configuration with section fallback
    pub fn get_value(&self, section: &str, key: &str) -> Option<&String> {
        // Priority: selected_section -> specified section -> base
        if let Some(selected) = &self.selected_section {
            if let Some(value) = self.config.get(selected).and_then(|s| s.get(key)) {
                return Some(value);
            }
        }

        if let Some(value) = self.config.get(section).and_then(|s| s.get(key)) {
            return Some(value);
        }

        self.config.get("base").and_then(|s| s.get(key))
    }

    /// Select configuration section for --config-name
    pub fn select_section(&mut self, section: String) {
        debug!("Selecting configuration section: {}", section);
        self.selected_section = Some(section);
    }

    /// Get boolean value with type conversion
    pub fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>> {
        match self.get_value(section, key) {
            Some(value) => match value.to_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(anyhow::anyhow!("Invalid boolean value for {}.{}: {}", section, key, value)),
            },
            None => Ok(None),
        }
    }

    /// Get unsigned integer value with type conversion
    pub fn get_u64(&self, section: &str, key: &str) -> Result<Option<u64>> {
        match self.get_value(section, key) {
            Some(value) => value
                .parse::<u64>()
                .map(Some)
                .with_context(|| format!("Invalid unsigned value for {}.{}: {}", section, key, value)),
            None => Ok(None),
        }
    }

    /// Get log level value with type conversion
    pub fn get_log_level(&self, section: &str, key: &str) -> Result<Option<log::LevelFilter>> {
        match self.get_value(section, key) {
            Some(value) => Ok(Some(crate::logging::parse_log_level(value)?)),
            None => Ok(None),
        }
    }

    /// Get path value with type conversion
    pub fn get_path(&self, section: &str, key: &str) -> Option<PathBuf> {
        self.get_value(section, key).map(PathBuf::from)
    }

    /// Dispatch settings from the `[dispatch]` section.
    ///
    /// `wait-timeout-ms = 0` is rejected; omit the key to wait without a timeout.
    pub fn get_dispatch_config(&self) -> Result<DispatchConfig> {
        let mut config = DispatchConfig::default();

        if let Some(millis) = self.get_u64("dispatch", "wait-timeout-ms")? {
            if millis == 0 {
                anyhow::bail!("dispatch.wait-timeout-ms must be greater than zero");
            }
            config.wait_timeout = Some(Duration::from_millis(millis));
        }

        Ok(config)
    }

    /// Demonstration settings from the `[demo]` section
    pub fn get_demo_config(&self) -> Result<DemoConfig> {
        let mut config = DemoConfig::default();

        if let Some(producers) = self.get_u64("demo", "producers")? {
            config.producers = usize::try_from(producers)
                .with_context(|| format!("demo.producers out of range: {}", producers))?;
        }
        if let Some(events) = self.get_u64("demo", "events")? {
            config.events = usize::try_from(events)
                .with_context(|| format!("demo.events out of range: {}", events))?;
        }

        config.validate().context("Demo configuration validation failed")?;
        Ok(config)
    }
}

/// Discover configuration files in order of precedence
fn discover_config_files() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. Environment variable $ASYNCNOTIFY_CONFIG
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        paths.push(PathBuf::from(env_path));
    }

    // 2. XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("asyncnotify").join("config.toml"));
    }

    // 3. Home directory
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".asyncnotify.toml"));
    }

    // 4. Project local
    paths.push(PathBuf::from("./.asyncnotify.toml"));

    debug!("Config discovery paths: {:?}", paths);
    paths
}

/// Parse TOML content to string-based configuration
fn parse_toml_config(content: &str) -> Result<Configuration> {
    let table: toml::Table = content.parse().context("Failed to parse TOML content")?;

    let mut config = Configuration::new();
    flatten_toml_table(&table, "", &mut config);

    debug!("Parsed configuration: {:?}", config);
    Ok(config)
}

/// Flatten nested TOML tables into dotted section names.
///
/// Top-level keys outside any table land in the `base` section.
fn flatten_toml_table(table: &toml::Table, prefix: &str, config: &mut Configuration) {
    for (key, value) in table {
        match value {
            Value::Table(subtable) => {
                let section_name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_toml_table(subtable, &section_name, config);
            }
            _ => {
                let section_name = if prefix.is_empty() { "base" } else { prefix };
                config
                    .entry(section_name.to_string())
                    .or_default()
                    .insert(key.clone(), toml_value_to_string(value));
            }
        }
    }
}

/// Convert TOML Value to string representation
fn toml_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Boolean(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn manager_from(toml_content: &str) -> ConfigManager {
        ConfigManager::from_config(parse_toml_config(toml_content).unwrap())
    }

    #[test]
    fn test_toml_value_to_string_conversion() {
        assert_eq!(toml_value_to_string(&Value::String("json".to_string())), "json");
        assert_eq!(toml_value_to_string(&Value::Integer(250)), "250");
        assert_eq!(toml_value_to_string(&Value::Boolean(false)), "false");
    }

    #[test]
    fn test_parse_toml_config_sections() {
        let config = parse_toml_config(
            r#"
quiet = true

[base]
log-format = "json"

[dispatch]
wait-timeout-ms = 250

[profile.stress]
producers = 16
"#,
        )
        .unwrap();

        assert_eq!(config["base"]["quiet"], "true");
        assert_eq!(config["base"]["log-format"], "json");
        assert_eq!(config["dispatch"]["wait-timeout-ms"], "250");
        assert_eq!(config["profile.stress"]["producers"], "16");
    }

    #[test]
    fn test_value_fallback_and_section_selection() {
        let mut manager = manager_from(
            r#"
[base]
log-format = "text"
events = "5"

[demo]
events = "10"

[stress]
events = "1000"
"#,
        );

        assert_eq!(manager.get_value("demo", "events").unwrap(), "10");
        assert_eq!(manager.get_value("demo", "log-format").unwrap(), "text");
        assert!(manager.get_value("demo", "missing").is_none());

        manager.select_section("stress".to_string());
        assert_eq!(manager.get_value("demo", "events").unwrap(), "1000");
    }

    #[test]
    fn test_type_conversion() {
        let manager = manager_from(
            r#"
[base]
debug = true
invalid-bool = "maybe"
log-level = "debug"
log-file = "/tmp/asyncnotify.log"
count = 12
negative = -3
"#,
        );

        assert_eq!(manager.get_bool("base", "debug").unwrap(), Some(true));
        assert!(manager.get_bool("base", "invalid-bool").is_err());
        assert!(manager.get_bool("base", "missing").unwrap().is_none());

        assert_eq!(manager.get_log_level("base", "log-level").unwrap(), Some(log::LevelFilter::Debug));
        assert_eq!(manager.get_path("base", "log-file").unwrap(), PathBuf::from("/tmp/asyncnotify.log"));

        assert_eq!(manager.get_u64("base", "count").unwrap(), Some(12));
        assert!(manager.get_u64("base", "negative").is_err());
        assert!(manager.get_u64("base", "missing").unwrap().is_none());
    }

    #[test]
    fn test_dispatch_config() {
        let default = ConfigManager::default().get_dispatch_config().unwrap();
        assert_eq!(default, DispatchConfig::default());
        assert!(default.wait_timeout.is_none());

        let manager = manager_from("[dispatch]\nwait-timeout-ms = 250\n");
        let config = manager.get_dispatch_config().unwrap();
        assert_eq!(config.wait_timeout, Some(Duration::from_millis(250)));

        let zero = manager_from("[dispatch]\nwait-timeout-ms = 0\n");
        assert!(zero.get_dispatch_config().is_err());
    }

    #[test]
    fn test_demo_config() {
        let default = ConfigManager::default().get_demo_config().unwrap();
        assert_eq!(default, DemoConfig::default());

        let manager = manager_from("[demo]\nproducers = 8\nevents = 50\n");
        let config = manager.get_demo_config().unwrap();
        assert_eq!(config.producers, 8);
        assert_eq!(config.events, 50);

        let invalid = manager_from("[demo]\nproducers = 0\n");
        assert!(invalid.get_demo_config().is_err());
    }

    #[test]
    fn test_config_file_loading() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(&temp_file, "[demo]\nevents = 7\n").unwrap();

        let manager = ConfigManager::load_from_file(temp_file.path().to_path_buf()).unwrap();
        assert_eq!(manager.get_value("demo", "events").unwrap(), "7");
        assert_eq!(manager.config_file_path().unwrap(), temp_file.path());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(&temp_file, "[demo\nevents = ").unwrap();
        assert!(ConfigManager::load_from_file(temp_file.path().to_path_buf()).is_err());
    }
}
