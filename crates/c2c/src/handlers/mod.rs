//! Resource handlers, one per artifact kind.
//!
//! Handlers form a closed set ([`Handler`]). Primary handlers (Deployment,
//! Job) write the [`NameLedger`]; dependent handlers only read it.

pub mod configmap;
pub mod deployment;
pub mod dockerfile;
pub mod hpa;
pub mod job;
pub mod secret;
pub mod service;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, EnvVar, ResourceRequirements, Secret, Service};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use regex::Regex;

use crate::error::{GenerationError, Result};
use crate::ledger::NameLedger;
use crate::model::{
    ConfigMapModel, ImageModel, JobModel, ModelRegistry, ResourceSpec, ScalingModel, SecretModel,
    ServiceModel, WorkloadModel,
};
use crate::naming::{ResourceKind, ResourceNaming};

/// A built resource object.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Deployment(Box<Deployment>),
    Service(Box<Service>),
    HorizontalPodAutoscaler(Box<HorizontalPodAutoscaler>),
    Secret(Box<Secret>),
    ConfigMap(Box<ConfigMap>),
    Job(Box<Job>),
    /// Rendered Dockerfile contents.
    Dockerfile(String),
}

impl Resource {
    /// Encode the object as a single YAML document. Dockerfiles are returned
    /// as-is.
    ///
    /// # Errors
    ///
    /// Returns the encoder error if the object cannot be serialized.
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        match self {
            Self::Deployment(r) => serde_yaml::to_string(r.as_ref()),
            Self::Service(r) => serde_yaml::to_string(r.as_ref()),
            Self::HorizontalPodAutoscaler(r) => serde_yaml::to_string(r.as_ref()),
            Self::Secret(r) => serde_yaml::to_string(r.as_ref()),
            Self::ConfigMap(r) => serde_yaml::to_string(r.as_ref()),
            Self::Job(r) => serde_yaml::to_string(r.as_ref()),
            Self::Dockerfile(contents) => Ok(contents.clone()),
        }
    }
}

/// A materialized artifact with its placement.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedArtifact {
    pub kind: ResourceKind,
    /// Canonical resource name.
    pub name: String,
    /// Output group (sanitized owning workload name).
    pub group: String,
    pub resource: Resource,
}

impl GeneratedArtifact {
    /// File the artifact is written to inside its group directory.
    #[must_use]
    pub fn file_name(&self) -> String {
        match self.resource {
            Resource::Dockerfile(_) => "Dockerfile".to_string(),
            _ => format!("{}.yaml", self.group),
        }
    }
}

/// Read-only inputs shared by every handler in a run.
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    pub registry: &'a ModelRegistry,
    pub naming: &'a ResourceNaming,
    pub namespace: Option<&'a str>,
}

impl HandlerContext<'_> {
    /// Object metadata with the run's namespace applied.
    pub(crate) fn metadata(&self, name: &str, labels: BTreeMap<String, String>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: self.namespace.map(str::to_string),
            labels: if labels.is_empty() { None } else { Some(labels) },
            ..Default::default()
        }
    }
}

/// Whether a handler populates the ledger or consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Primary,
    Dependent,
}

/// One pending unit of generation, keyed by the model that requested it.
#[derive(Debug, Clone, Copy)]
pub enum Handler<'a> {
    Deployment(&'a WorkloadModel),
    Job(&'a JobModel),
    Secret(&'a SecretModel),
    ConfigMap(&'a ConfigMapModel),
    Service(&'a ServiceModel),
    Scaling(&'a ScalingModel),
    Dockerfile(&'a ImageModel),
}

impl<'a> Handler<'a> {
    /// Every handler requested by the models present in `registry`, primary
    /// handlers first.
    #[must_use]
    pub fn collect(registry: &'a ModelRegistry) -> Vec<Self> {
        let mut handlers: Vec<Self> = registry
            .workloads()
            .map(Self::Deployment)
            .chain(registry.jobs().map(Self::Job))
            .chain(registry.secrets().map(Self::Secret))
            .chain(registry.config_maps().map(Self::ConfigMap))
            .chain(registry.services().map(Self::Service))
            .chain(registry.scaling().map(Self::Scaling))
            .chain(registry.images().map(Self::Dockerfile))
            .collect();
        handlers.sort_by_key(Handler::stage);
        handlers
    }

    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Deployment(_) => ResourceKind::Deployment,
            Self::Job(_) => ResourceKind::Job,
            Self::Secret(_) => ResourceKind::Secret,
            Self::ConfigMap(_) => ResourceKind::ConfigMap,
            Self::Service(_) => ResourceKind::Service,
            Self::Scaling(_) => ResourceKind::HorizontalPodAutoscaler,
            Self::Dockerfile(_) => ResourceKind::Image,
        }
    }

    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Deployment(_) | Self::Job(_) => Stage::Primary,
            _ => Stage::Dependent,
        }
    }

    /// Declared name of the model behind this handler.
    #[must_use]
    pub fn entity_name(&self) -> &'a str {
        match *self {
            Self::Deployment(m) => &m.name,
            Self::Job(m) => &m.name,
            Self::Secret(m) => &m.name,
            Self::ConfigMap(m) => &m.name,
            Self::Service(m) => m.entity_name(),
            Self::Scaling(m) => m.entity_name(),
            Self::Dockerfile(m) => &m.workload,
        }
    }

    /// Build the artifact. Only primary handlers write to `ledger`.
    ///
    /// # Errors
    ///
    /// Returns the handler's [`GenerationError`].
    pub fn run(
        &self,
        ctx: &HandlerContext<'_>,
        ledger: &mut NameLedger,
    ) -> Result<GeneratedArtifact> {
        match self {
            Self::Deployment(model) => deployment::generate(ctx, model, ledger),
            Self::Job(model) => job::generate(ctx, model, ledger),
            Self::Secret(model) => secret::generate(ctx, model, ledger),
            Self::ConfigMap(model) => configmap::generate(ctx, model, ledger),
            Self::Service(model) => service::generate(ctx, model, ledger),
            Self::Scaling(model) => hpa::generate(ctx, model, ledger),
            Self::Dockerfile(model) => dockerfile::generate(ctx, model, ledger),
        }
    }
}

/// Resource quantities copied verbatim; `None` when nothing was declared.
pub(crate) fn resource_requirements(spec: &ResourceSpec) -> Option<ResourceRequirements> {
    if spec.is_empty() {
        return None;
    }

    let quantities = |map: &BTreeMap<String, String>| -> Option<BTreeMap<String, Quantity>> {
        if map.is_empty() {
            None
        } else {
            Some(
                map.iter()
                    .map(|(name, value)| (name.clone(), Quantity(value.clone())))
                    .collect(),
            )
        }
    };

    Some(ResourceRequirements {
        requests: quantities(&spec.requests),
        limits: quantities(&spec.limits),
        ..Default::default()
    })
}

pub(crate) fn env_vars(env: &BTreeMap<String, String>) -> Option<Vec<EnvVar>> {
    if env.is_empty() {
        return None;
    }
    Some(
        env.iter()
            .map(|(name, value)| EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            })
            .collect(),
    )
}

fn data_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[-._a-zA-Z0-9]+$").expect("valid data key pattern"))
}

/// Secret and ConfigMap data must be non-empty with keys Kubernetes accepts.
pub(crate) fn validate_data(
    kind: ResourceKind,
    name: &str,
    data: &BTreeMap<String, String>,
) -> Result<()> {
    if data.is_empty() {
        return Err(GenerationError::validation(kind, name, "no data entries declared"));
    }
    if let Some(key) = data.keys().find(|key| !data_key_pattern().is_match(key)) {
        return Err(GenerationError::validation(
            kind,
            name,
            format!("data key '{key}' must consist of alphanumerics, '-', '_' or '.'"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_mount_path(kind: ResourceKind, name: &str, path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(GenerationError::validation(
            kind,
            name,
            format!("mountPath '{path}' must be an absolute path"),
        ));
    }
    Ok(())
}

/// Checks a Secret or ConfigMap must pass both to be emitted and to be mounted.
pub(crate) fn validate_volume_source(
    kind: ResourceKind,
    name: &str,
    mount_path: &str,
    data: &BTreeMap<String, String>,
) -> Result<()> {
    validate_data(kind, name, data)?;
    validate_mount_path(kind, name, mount_path)
}
