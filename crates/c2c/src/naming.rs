//! Canonical resource naming and selector derivation.
//!
//! Every handler that stamps or matches a selector, or refers to a sibling
//! resource, goes through [`ResourceNaming`]. Consistency between artifacts is
//! a property of this module, not something checked after the fact.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::NamingError;

/// Kubernetes DNS label limit (RFC 1123), applied to every generated name.
pub const MAX_DNS_LABEL_LENGTH: usize = 63;
/// Kubernetes object name limit; longer declared names are rejected outright.
pub const MAX_OBJECT_NAME_LENGTH: usize = 253;
/// Label key used to bind Services and autoscalers to Deployment pods.
pub const DEFAULT_SELECTOR_KEY: &str = "app";

/// Artifact kinds the generator knows how to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Deployment,
    Service,
    HorizontalPodAutoscaler,
    Secret,
    ConfigMap,
    Job,
    /// Container image built from a generated Dockerfile.
    Image,
}

impl ResourceKind {
    /// Suffix appended to the sanitized workload name.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Deployment => "-deployment",
            Self::Service => "-svc",
            Self::HorizontalPodAutoscaler => "-hpa",
            Self::Secret => "-secret",
            Self::ConfigMap => "-config-map",
            Self::Job => "-job",
            Self::Image => "",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::Service => "Service",
            Self::HorizontalPodAutoscaler => "HorizontalPodAutoscaler",
            Self::Secret => "Secret",
            Self::ConfigMap => "ConfigMap",
            Self::Job => "Job",
            Self::Image => "Image",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The label pair a Deployment stamps on its pods and a Service matches on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectorLabel {
    pub key: String,
    pub value: String,
}

impl SelectorLabel {
    /// The selector as a single-entry label map.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(self.key.clone(), self.value.clone())])
    }
}

/// Name and selector deriver, parameterized by the selector label key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNaming {
    selector_key: String,
}

impl Default for ResourceNaming {
    fn default() -> Self {
        Self::new(DEFAULT_SELECTOR_KEY)
    }
}

impl ResourceNaming {
    #[must_use]
    pub fn new(selector_key: impl Into<String>) -> Self {
        Self {
            selector_key: selector_key.into(),
        }
    }

    #[must_use]
    pub fn selector_key(&self) -> &str {
        &self.selector_key
    }

    /// Canonical name for `kind`: sanitized, truncated to fit the DNS label
    /// limit together with the suffix, then suffixed.
    ///
    /// # Errors
    ///
    /// Returns [`NamingError`] when `workload` cannot be sanitized.
    pub fn name(&self, workload: &str, kind: ResourceKind) -> Result<String, NamingError> {
        let base = sanitize(workload)?;
        let suffix = kind.suffix();
        let budget = MAX_DNS_LABEL_LENGTH - suffix.len();

        let mut truncated: String = base.chars().take(budget).collect();
        while truncated.ends_with('-') {
            truncated.pop();
        }

        Ok(format!("{truncated}{suffix}"))
    }

    /// Selector label for `workload`.
    ///
    /// # Errors
    ///
    /// Returns [`NamingError`] when `workload` cannot be sanitized.
    pub fn selector(&self, workload: &str) -> Result<SelectorLabel, NamingError> {
        let mut value = sanitize(workload)?;
        value.truncate(MAX_DNS_LABEL_LENGTH);
        while value.ends_with('-') {
            value.pop();
        }

        Ok(SelectorLabel {
            key: self.selector_key.clone(),
            value,
        })
    }
}

/// Lower-case `name` and replace every character that is not valid in a DNS
/// label with `-`. Leading and trailing dashes are removed.
///
/// # Errors
///
/// Returns [`NamingError`] for empty names, names with no valid characters,
/// or names longer than [`MAX_OBJECT_NAME_LENGTH`] after sanitization.
pub fn sanitize(name: &str) -> Result<String, NamingError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(NamingError::Empty);
    }

    let replaced: String = trimmed
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    let sanitized = replaced.trim_matches('-').to_string();
    if sanitized.is_empty() {
        return Err(NamingError::NoValidCharacters(name.to_string()));
    }
    if sanitized.len() > MAX_OBJECT_NAME_LENGTH {
        return Err(NamingError::TooLong {
            len: sanitized.len(),
            name: name.to_string(),
            max: MAX_OBJECT_NAME_LENGTH,
        });
    }

    Ok(sanitized)
}

/// Canonical name for `workload` using the default selector key.
///
/// # Errors
///
/// See [`ResourceNaming::name`].
pub fn derive_name(workload: &str, kind: ResourceKind) -> Result<String, NamingError> {
    ResourceNaming::default().name(workload, kind)
}

/// Selector label for `workload` using [`DEFAULT_SELECTOR_KEY`].
///
/// # Errors
///
/// See [`ResourceNaming::selector`].
pub fn derive_selector_label(workload: &str) -> Result<SelectorLabel, NamingError> {
    ResourceNaming::default().selector(workload)
}
