//! # Config Loader
//!
//! Race configuration loading and parsing.
//!
//! Responsibilities:
//! - Parse YAML/TOML/JSON configuration files
//! - Validate everything the race engine takes for granted
//! - Produce a `RaceConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("race.yaml")).unwrap();
//! println!("Laps: {}", config.race.laps);
//! ```

mod parser;
mod validator;

pub use contracts::RaceConfig;
pub use parser::ConfigFormat;
pub use validator::{MAX_DUAL_DELAY_MS, MAX_SKATERS};

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Detects format from file extension (.yaml / .yml / .toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<RaceConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<RaceConfig, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate an already-built configuration (e.g. after CLI overrides)
    pub fn validate(config: &RaceConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    /// Serialize RaceConfig to YAML string
    pub fn to_yaml(config: &RaceConfig) -> Result<String, ContractError> {
        serde_yaml_ng::to_string(config)
            .map_err(|e| ContractError::config_parse(format!("YAML serialize error: {e}")))
    }

    /// Serialize RaceConfig to TOML string
    pub fn to_toml(config: &RaceConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize RaceConfig to JSON string
    pub fn to_json(config: &RaceConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn parse_and_validate(content: &str, format: ConfigFormat) -> Result<RaceConfig, ContractError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_YAML: &str = r#"
race:
  laps: 4.5
  tcp:
    host: localhost
    port: 2002
  dual_transponder:
    enabled: true
    delay_milliseconds: 50
skaters:
  - lane: 1
    average_split_time: 10.0
  - lane: 2
    times: [8.0, 7.5, 7.9]
"#;

    #[test]
    fn test_load_from_str_yaml() {
        let result = ConfigLoader::load_from_str(MINIMAL_YAML, ConfigFormat::Yaml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.race.laps, 4.5);
        assert_eq!(config.skaters.len(), 2);
    }

    #[test]
    fn test_round_trip_toml() {
        let config = ConfigLoader::load_from_str(MINIMAL_YAML, ConfigFormat::Yaml).unwrap();
        let serialized = ConfigLoader::to_toml(&config).unwrap();
        let config2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(config.race.laps, config2.race.laps);
        assert_eq!(config.skaters.len(), config2.skaters.len());
        assert_eq!(config.skaters[1].times, config2.skaters[1].times);
    }

    #[test]
    fn test_round_trip_json() {
        let config = ConfigLoader::load_from_str(MINIMAL_YAML, ConfigFormat::Yaml).unwrap();
        let json = ConfigLoader::to_json(&config).unwrap();
        let config2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(config.race.tcp.address(), config2.race.tcp.address());
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
race:
  laps: 4.5
skaters:
  - lane: 3
    average_split_time: 10.0
  - lane: 3
    average_split_time: 11.0
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Yaml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(MINIMAL_YAML.as_bytes()).unwrap();

        let config = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(config.skaters[0].lane, 1);
    }

    #[test]
    fn test_load_from_path_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn test_load_from_missing_path() {
        let err = ConfigLoader::load_from_path(Path::new("/nonexistent/race.yaml")).unwrap_err();
        assert!(matches!(err, ContractError::Io(_)));
    }
}
