//! Intermediate workload models.
//!
//! These are produced by an external front end (or loaded from a model file)
//! and are read-only for the duration of a generation run.

pub mod registry;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use registry::{ModelFile, ModelRegistry};

/// Transport protocol of a container or service port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowest and highest valid port numbers.
pub const PORT_RANGE: std::ops::RangeInclusive<i32> = 1..=65535;

/// A port exposed by a workload container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortSpec {
    pub container_port: i32,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PortSpec {
    #[must_use]
    pub fn tcp(container_port: i32) -> Self {
        Self {
            container_port,
            protocol: Protocol::Tcp,
            name: None,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        PORT_RANGE.contains(&self.container_port)
    }
}

/// Resource requests and limits, keyed by resource name (`cpu`, `memory`, ...).
/// Quantities are passed through to the manifest verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

impl ResourceSpec {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.limits.is_empty()
    }
}

fn default_probe_initial_delay() -> i32 {
    10
}

fn default_probe_period() -> i32 {
    5
}

/// TCP socket probe against one of the container ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSpec {
    pub port: i32,
    #[serde(default = "default_probe_initial_delay")]
    pub initial_delay_seconds: i32,
    #[serde(default = "default_probe_period")]
    pub period_seconds: i32,
}

impl ProbeSpec {
    #[must_use]
    pub fn on_port(port: i32) -> Self {
        Self {
            port,
            initial_delay_seconds: default_probe_initial_delay(),
            period_seconds: default_probe_period(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Probes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ProbeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness: Option<ProbeSpec>,
}

/// A long-running unit of compute, compiled into a Deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadModel {
    /// User-declared name, unescaped.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<ImagePullPolicy>,
    #[serde(default)]
    pub image_pull_secrets: Vec<String>,
    #[serde(default)]
    pub probes: Probes,
    #[serde(default)]
    pub pod_annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    /// Names of [`SecretModel`]s to mount.
    #[serde(default)]
    pub secrets: Vec<String>,
    /// Names of [`ConfigMapModel`]s to mount.
    #[serde(default)]
    pub config_maps: Vec<String>,
}

impl WorkloadModel {
    #[must_use]
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: Some(image.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: PortSpec) -> Self {
        self.ports.push(port);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImagePullPolicy {
    Always,
    IfNotPresent,
    Never,
}

impl ImagePullPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "Always",
            Self::IfNotPresent => "IfNotPresent",
            Self::Never => "Never",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    NodePort,
    LoadBalancer,
}

impl ServiceType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClusterIP => "ClusterIP",
            Self::NodePort => "NodePort",
            Self::LoadBalancer => "LoadBalancer",
        }
    }

    /// Whether a `nodePort` may be set for this service type.
    #[must_use]
    pub const fn allows_node_port(self) -> bool {
        matches!(self, Self::NodePort | Self::LoadBalancer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionAffinity {
    None,
    ClientIP,
}

impl SessionAffinity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::ClientIP => "ClientIP",
        }
    }
}

/// One port forwarded by a Service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePortSpec {
    pub port: i32,
    /// Defaults to `port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<i32>,
    /// Defaults to the protocol of the matching container port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port: Option<i32>,
}

/// Network endpoint for a workload, compiled into a Service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceModel {
    /// Service name; defaults to the selected workload's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Name of the workload whose pods this service selects.
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_affinity: Option<SessionAffinity>,
    /// When empty, every workload port is forwarded unchanged.
    #[serde(default)]
    pub ports: Vec<ServicePortSpec>,
}

impl ServiceModel {
    #[must_use]
    pub fn for_workload(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            ..Self::default()
        }
    }

    /// Declared name, falling back to the selector.
    #[must_use]
    pub fn entity_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.selector)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricTargetType {
    Utilization,
    AverageValue,
    Value,
}

impl MetricTargetType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Utilization => "Utilization",
            Self::AverageValue => "AverageValue",
            Self::Value => "Value",
        }
    }
}

/// Target of a resource metric: a percentage for `Utilization`, a quantity
/// (or bare number) otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricTargetValue {
    Number(i64),
    Quantity(String),
}

impl fmt::Display for MetricTargetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Quantity(q) => f.write_str(q),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricModel {
    pub resource_name: String,
    pub target_type: MetricTargetType,
    pub target_value: MetricTargetValue,
}

impl MetricModel {
    #[must_use]
    pub fn utilization(resource_name: impl Into<String>, percent: i64) -> Self {
        Self {
            resource_name: resource_name.into(),
            target_type: MetricTargetType::Utilization,
            target_value: MetricTargetValue::Number(percent),
        }
    }
}

fn default_scale_target_kind() -> String {
    "Deployment".to_string()
}

/// Horizontal scaling policy, compiled into a HorizontalPodAutoscaler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingModel {
    /// Policy name; defaults to the target workload's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub min_replicas: i32,
    pub max_replicas: i32,
    #[serde(default)]
    pub metrics: Vec<MetricModel>,
    /// Canonical name of the Deployment to scale.
    pub scale_target_name: String,
    #[serde(default = "default_scale_target_kind")]
    pub scale_target_kind: String,
}

impl ScalingModel {
    #[must_use]
    pub fn entity_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.scale_target_name)
    }
}

fn default_read_only() -> bool {
    true
}

/// Files mounted into a workload from a Secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretModel {
    pub name: String,
    pub mount_path: String,
    #[serde(default = "default_read_only")]
    pub read_only: bool,
    /// File name to file contents.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// Files mounted into a workload from a ConfigMap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapModel {
    pub name: String,
    pub mount_path: String,
    #[serde(default = "default_read_only")]
    pub read_only: bool,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    #[default]
    Never,
    OnFailure,
}

impl RestartPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Never => "Never",
            Self::OnFailure => "OnFailure",
        }
    }
}

/// A run-to-completion workload, compiled into a Job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobModel {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_limit: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<i64>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<ImagePullPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyFile {
    pub source: String,
    pub target: String,
}

fn default_tag() -> String {
    "latest".to_string()
}

/// Container image specification for a workload or job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageModel {
    /// Workload or job the image is built for.
    pub workload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    /// Image repository name.
    pub repository: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    pub base_image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub copy_files: Vec<CopyFile>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub entrypoint: Vec<String>,
    #[serde(default)]
    pub cmd: Vec<String>,
}

impl ImageModel {
    /// Fully qualified image reference, `[registry/]repository:tag`.
    #[must_use]
    pub fn reference(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{registry}/{}:{}", self.repository, self.tag),
            None => format!("{}:{}", self.repository, self.tag),
        }
    }
}
