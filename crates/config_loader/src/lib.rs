//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Produce a `PublisherConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("publisher.toml")).unwrap();
//! println!("Hosts: {:?}", config.output.hosts);
//! ```

mod parser;
mod validator;

pub use contracts::PublisherConfig;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<PublisherConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<PublisherConfig, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate a configuration built in code (e.g. after CLI overrides)
    pub fn validate(config: &PublisherConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    /// Serialize PublisherConfig to TOML string
    pub fn to_toml(config: &PublisherConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize PublisherConfig to JSON string
    pub fn to_json(config: &PublisherConfig) -> Result<String, ContractError> {
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

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<PublisherConfig, ContractError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_TOML: &str = r#"
[output]
hosts = ["http://localhost:8082"]
key = "%{[trace.id]:none}"

[routing]
suppress_kinds = ["metric"]
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.output.hosts, vec!["http://localhost:8082"]);
    }

    #[test]
    fn test_round_trip_toml() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&config).unwrap();
        let config2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(config.output.hosts, config2.output.hosts);
        assert_eq!(config.output.key, config2.output.key);
        assert_eq!(config.routing.route_field, config2.routing.route_field);
    }

    #[test]
    fn test_round_trip_json() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&config).unwrap();
        let config2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(config.output.index, config2.output.index);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[output]
hosts = ["http://a:8082", "http://a:8082"]
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_demo_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/publisher.toml");
        let config = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(config.sender.sender_type, contracts::SenderType::Rest);
        assert_eq!(config.routing.destination_prefix, "trace-");
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("publisher.toml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(MINIMAL_TOML.as_bytes())
            .unwrap();

        let config = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(config.output.hosts.len(), 1);

        let yaml = dir.path().join("publisher.yaml");
        std::fs::write(&yaml, "output: {}").unwrap();
        assert!(matches!(
            ConfigLoader::load_from_path(&yaml),
            Err(ContractError::ConfigParse { .. })
        ));
    }
}
