//! Generator configuration.
//!
//! Loaded from a YAML file; every field has a default so an empty file (or
//! no file at all) is a valid configuration.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::naming::{ResourceNaming, DEFAULT_SELECTOR_KEY, MAX_DNS_LABEL_LENGTH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorConfig {
    /// Root directory for `kubernetes/` and `docker/` output.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Label key stamped on pods and matched by Services.
    #[serde(default = "default_selector_key")]
    pub selector_key: String,

    /// Namespace applied to every generated object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Generate independent scopes on worker tasks.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("target")
}

fn default_selector_key() -> String {
    DEFAULT_SELECTOR_KEY.to_string()
}

fn default_parallel() -> bool {
    true
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            selector_key: default_selector_key(),
            namespace: None,
            parallel: default_parallel(),
        }
    }
}

fn label_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*/)?[A-Za-z0-9]([-A-Za-z0-9_.]{0,61}[A-Za-z0-9])?$")
            .expect("valid label key pattern")
    })
}

fn dns_label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid DNS label pattern")
    })
}

impl GeneratorConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed YAML or invalid values.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unusable selector key or namespace.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !label_key_pattern().is_match(&self.selector_key) {
            return Err(ConfigError::Invalid(format!(
                "selectorKey '{}' is not a valid label key",
                self.selector_key
            )));
        }
        if let Some(namespace) = &self.namespace {
            if namespace.len() > MAX_DNS_LABEL_LENGTH || !dns_label_pattern().is_match(namespace) {
                return Err(ConfigError::Invalid(format!(
                    "namespace '{namespace}' is not a valid DNS label"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn naming(&self) -> ResourceNaming {
        ResourceNaming::new(self.selector_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = GeneratorConfig::from_yaml("").unwrap();
        assert_eq!(config, GeneratorConfig::default());
        assert_eq!(config.output_dir, PathBuf::from("target"));
        assert_eq!(config.naming().selector_key(), "app");
        assert!(config.parallel);
    }

    #[test]
    fn parses_overrides() {
        let config = GeneratorConfig::from_yaml(
            "outputDir: out\nselectorKey: app.kubernetes.io/name\nnamespace: apps\nparallel: false\n",
        )
        .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.selector_key, "app.kubernetes.io/name");
        assert_eq!(config.namespace.as_deref(), Some("apps"));
        assert!(!config.parallel);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            GeneratorConfig::from_yaml("selectorKey: 'bad key'"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GeneratorConfig::from_yaml("namespace: Apps_Prod"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GeneratorConfig::from_yaml("parallel: [1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c2c.yaml");
        std::fs::write(&path, "namespace: demo\n").unwrap();
        let config = GeneratorConfig::from_file(&path).unwrap();
        assert_eq!(config.namespace.as_deref(), Some("demo"));

        let missing = GeneratorConfig::from_file(&dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
