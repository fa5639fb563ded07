//! Loader configuration.
//!
//! Values come from built-in defaults, an optional TOML file and a small set
//! of environment overrides, applied in that order.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default values.
pub mod defaults {
    /// Appended to a module's identity to name its optional initializer.
    pub const INIT_SUFFIX: &str = ".init";

    /// File suffixes stripped from a requested name when it is displayed.
    pub const ARTIFACT_SUFFIXES: &[&str] = &[".so", ".dylib", ".dll"];
}

/// Environment variable names.
pub mod env_vars {
    pub const CANONICALIZE: &str = "DYNHOST_CANONICALIZE";
    pub const INIT_SUFFIX: &str = "DYNHOST_INIT_SUFFIX";
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Resolve requested names to absolute paths before using them as identities.
    pub canonicalize_paths: bool,
    pub init_suffix: String,
    pub artifact_suffixes: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            canonicalize_paths: true,
            init_suffix: defaults::INIT_SUFFIX.to_string(),
            artifact_suffixes: defaults::ARTIFACT_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl LoaderConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `DYNHOST_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(env_vars::CANONICALIZE) {
            self.canonicalize_paths = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(ConfigError::Invalid {
                        key: env_vars::CANONICALIZE.to_string(),
                        message: format!("expected a boolean, got {other:?}"),
                    })
                }
            };
        }
        if let Some(value) = lookup(env_vars::INIT_SUFFIX) {
            self.init_suffix = value;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.init_suffix.is_empty() {
            return Err(ConfigError::Invalid {
                key: "init_suffix".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.init_suffix.contains('\0') {
            return Err(ConfigError::Invalid {
                key: "init_suffix".to_string(),
                message: "must not contain NUL".to_string(),
            });
        }
        Ok(())
    }

    /// Strip a known artifact suffix from `name` for display.
    pub fn display_name<'a>(&self, name: &'a str) -> &'a str {
        self.artifact_suffixes
            .iter()
            .find_map(|suffix| {
                name.strip_suffix(suffix.as_str())
                    .filter(|stem| !stem.is_empty())
            })
            .unwrap_or(name)
    }

    /// Export name of the initializer for `module_path`.
    pub fn init_symbol(&self, module_path: &str) -> String {
        format!("{}{}", module_path, self.init_suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert!(config.canonicalize_paths);
        assert_eq!(config.init_suffix, ".init");
        assert_eq!(config.init_symbol("sample"), "sample.init");
    }

    #[test]
    fn test_display_name_strips_suffix() {
        let config = LoaderConfig::default();
        assert_eq!(config.display_name("plugins/sample.so"), "plugins/sample");
        assert_eq!(config.display_name("sample.dll"), "sample");
        assert_eq!(config.display_name("sample"), "sample");
        // A bare suffix is not a name.
        assert_eq!(config.display_name(".so"), ".so");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LoaderConfig::from_toml_str("canonicalize_paths = false\n").unwrap();
        assert!(!config.canonicalize_paths);
        assert_eq!(config.init_suffix, ".init");
        assert_eq!(config.artifact_suffixes.len(), 3);
    }

    #[test]
    fn test_empty_init_suffix_rejected() {
        let err = LoaderConfig::from_toml_str("init_suffix = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (env_vars::CANONICALIZE, "off"),
            (env_vars::INIT_SUFFIX, "._init"),
        ]
        .into_iter()
        .collect();

        let config = LoaderConfig::default()
            .with_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert!(!config.canonicalize_paths);
        assert_eq!(config.init_symbol("m"), "m._init");
    }

    #[test]
    fn test_bad_boolean_override() {
        let err = LoaderConfig::default()
            .with_overrides(|key| (key == env_vars::CANONICALIZE).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(env_vars::CANONICALIZE));
    }
}
