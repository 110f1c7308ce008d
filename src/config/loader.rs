//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::RelayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Document formats understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
    Toml,
}

impl Format {
    /// Guess the format from a file extension; YAML is the default.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Format::Json,
            Some("toml") => Format::Toml,
            _ => Format::Yaml,
        }
    }
}

/// Load, expand and validate configuration from a file.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content, Format::from_path(path))
}

/// Expand environment variables in `content`, parse it and validate the result.
pub fn parse_config(content: &str, format: Format) -> Result<RelayConfig, ConfigError> {
    let expanded = expand_env(content, |name| std::env::var(name).ok());

    let mut config: RelayConfig = match format {
        Format::Yaml => serde_yaml::from_str(&expanded).map_err(|e| ConfigError::Parse(e.to_string()))?,
        Format::Json => serde_json::from_str(&expanded).map_err(|e| ConfigError::Parse(e.to_string()))?,
        Format::Toml => toml::from_str(&expanded).map_err(|e| ConfigError::Parse(e.to_string()))?,
    };

    validate_config(&mut config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Replace `$NAME` and `${NAME}` with values from `lookup`.
///
/// Unknown variables expand to the empty string.
pub fn expand_env<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    shellexpand::env_with_context_no_errors(input, |name| Some(lookup(name).unwrap_or_default()))
        .into_owned()
}
