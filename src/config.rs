use serde::Deserialize;
use std::{fs, io, path::Path};
use thiserror::Error;

/// Settings for binding a function definition.
///
/// ```toml
/// definition = "upper|lower>host1:7000"
/// accept = "text/plain"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FunctionProperties {
    /// Chain definition to expose, e.g. `upper|lower>host1:7000`.
    pub definition: Option<String>,
    /// Content type for the exposed function's output. Derived from the
    /// function's output type when unset.
    pub accept: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("parsing function properties: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no function definition configured")]
    MissingDefinition,
}

impl FunctionProperties {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn definition(&self) -> Result<&str, ConfigError> {
        self.definition
            .as_deref()
            .map(str::trim)
            .filter(|definition| !definition.is_empty())
            .ok_or(ConfigError::MissingDefinition)
    }

    /// The configured content type, ignoring blank values.
    pub fn accept(&self) -> Option<&str> {
        self.accept
            .as_deref()
            .map(str::trim)
            .filter(|accept| !accept.is_empty())
    }
}
