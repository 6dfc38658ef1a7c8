//! Code-to-cloud artifact generation.
//!
//! Turns typed workload models into Kubernetes manifests (Deployment,
//! Service, HorizontalPodAutoscaler, Secret, ConfigMap, Job) and a
//! Dockerfile per container image. Every cross-resource reference, such as a
//! Service selector or an autoscaler target, is derived from one
//! [`ResourceNaming`] so generated artifacts always agree with each other.
//!
//! # Usage
//!
//! ```no_run
//! use c2c::{
//!     GenerationOrchestrator, ModelRegistry, PortSpec, ResourceNaming, ServiceModel, WorkloadModel,
//! };
//! use c2c::sink::FileSystemSink;
//!
//! let mut registry = ModelRegistry::new();
//! let hello = WorkloadModel::new("hello", "acme/hello:1.0").with_port(PortSpec::tcp(9090));
//! registry.add_workload(hello)?;
//! registry.add_service(ServiceModel::for_workload("hello"))?;
//!
//! let naming = ResourceNaming::default();
//! let mut sink = FileSystemSink::new("target");
//! let report = GenerationOrchestrator::new(&registry, &naming).run(&mut sink);
//! assert!(!report.is_failed());
//! # Ok::<(), c2c::error::RegistryError>(())
//! ```
//!
//! # Architecture
//!
//! - [`model`] holds the input models and the write-once [`ModelRegistry`]
//! - [`naming`] derives canonical names and selector labels
//! - [`handlers`] build one artifact kind each
//! - [`ledger`] records primary resources for dependent handlers to resolve
//! - [`orchestrator`] runs a scope through validation and emission
//! - [`sink`] writes the output layout
//! - [`runner`] splits a registry into scopes and generates them concurrently

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod model;
pub mod naming;
pub mod orchestrator;
pub mod runner;
pub mod sink;

pub use config::GeneratorConfig;
pub use error::{GenerationError, NamingError, RegistryError, SinkError};
pub use handlers::{GeneratedArtifact, Resource};
pub use ledger::{LedgerEntry, NameLedger};
pub use model::{
    ConfigMapModel, ImageModel, JobModel, MetricModel, ModelFile, ModelRegistry, PortSpec,
    ScalingModel, SecretModel, ServiceModel, WorkloadModel,
};
pub use naming::{derive_name, derive_selector_label, ResourceKind, ResourceNaming, SelectorLabel};
pub use orchestrator::{
    ArtifactReport, ArtifactStatus, GenerationOrchestrator, GenerationReport, GenerationState,
    ImageBuildRequest,
};
pub use sink::{ArtifactSink, FileSystemSink, MemorySink};
