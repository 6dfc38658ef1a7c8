//! Deployment handler.
//!
//! Stamps the selector label on the pod template. The ledger entry it records
//! is what Service, HPA, Secret, ConfigMap and Dockerfile handlers resolve.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, LocalObjectReference, PodSpec,
    PodTemplateSpec, Probe, SecretVolumeSource, TCPSocketAction, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::{debug, info};

use super::{
    env_vars, resource_requirements, validate_volume_source, GeneratedArtifact, HandlerContext,
    Resource,
};
use crate::error::{GenerationError, Result};
use crate::ledger::{LedgerEntry, NameLedger};
use crate::model::{PortSpec, ProbeSpec, WorkloadModel, PORT_RANGE};
use crate::naming::ResourceKind;

const KIND: ResourceKind = ResourceKind::Deployment;

/// Build the Deployment for `model` and record it in `ledger`.
///
/// # Errors
///
/// - [`GenerationError::Naming`] if the workload name cannot be sanitized
/// - [`GenerationError::MissingImage`] if no image is declared
/// - [`GenerationError::DanglingReference`] for unknown or invalid secret/config map mounts
/// - [`GenerationError::Validation`] for invalid ports, probes, replicas or mounts
pub fn generate(
    ctx: &HandlerContext<'_>,
    model: &WorkloadModel,
    ledger: &mut NameLedger,
) -> Result<GeneratedArtifact> {
    let name = ctx.naming.name(&model.name, KIND)?;
    let selector = ctx.naming.selector(&model.name)?;

    let image = model
        .image
        .as_deref()
        .map(str::trim)
        .filter(|image| !image.is_empty())
        .ok_or_else(|| GenerationError::MissingImage {
            kind: KIND,
            name: model.name.clone(),
        })?;

    validate_ports(&model.ports, &model.name)?;

    let replicas = model.replicas.unwrap_or(1);
    if replicas < 0 {
        return Err(GenerationError::validation(
            KIND,
            &model.name,
            format!("replicas must not be negative, got {replicas}"),
        ));
    }

    let readiness_probe = model
        .probes
        .readiness
        .as_ref()
        .map(|probe| tcp_probe(probe, &model.name))
        .transpose()?;
    let liveness_probe = model
        .probes
        .liveness
        .as_ref()
        .map(|probe| tcp_probe(probe, &model.name))
        .transpose()?;

    let mounts = Mounts::resolve(ctx, model)?;

    let mut labels = model.labels.clone();
    labels.extend(selector.to_map());

    let container = Container {
        name: selector.value.clone(),
        image: Some(image.to_string()),
        image_pull_policy: model.image_pull_policy.map(|p| p.as_str().to_string()),
        ports: container_ports(&model.ports),
        resources: resource_requirements(&model.resources),
        env: env_vars(&model.env),
        readiness_probe,
        liveness_probe,
        volume_mounts: non_empty(mounts.volume_mounts),
        ..Default::default()
    };

    let image_pull_secrets = model
        .image_pull_secrets
        .iter()
        .map(|secret| LocalObjectReference {
            name: secret.clone(),
        })
        .collect();

    let deployment = Deployment {
        metadata: ctx.metadata(&name, labels.clone()),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(selector.to_map()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: if model.pod_annotations.is_empty() {
                        None
                    } else {
                        Some(model.pod_annotations.clone())
                    },
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: non_empty(mounts.volumes),
                    image_pull_secrets: non_empty(image_pull_secrets),
                    service_account_name: model.service_account_name.clone(),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    };

    ledger.record(LedgerEntry {
        workload: model.name.clone(),
        kind: KIND,
        resource_name: name.clone(),
        selector: selector.clone(),
        image: image.to_string(),
        ports: model.ports.clone(),
        mounts: mounts.references,
    });

    info!(workload = %model.name, deployment = %name, replicas, "Generated deployment");

    Ok(GeneratedArtifact {
        kind: KIND,
        name,
        group: selector.value,
        resource: Resource::Deployment(Box::new(deployment)),
    })
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Ports must be in range and unique per protocol.
fn validate_ports(ports: &[PortSpec], workload: &str) -> Result<()> {
    let mut seen = BTreeSet::new();
    for port in ports {
        if !port.is_valid() {
            return Err(GenerationError::validation(
                KIND,
                workload,
                format!("container port {} is outside 1-65535", port.container_port),
            ));
        }
        if !seen.insert((port.container_port, port.protocol.as_str())) {
            return Err(GenerationError::validation(
                KIND,
                workload,
                format!(
                    "container port {}/{} is declared twice",
                    port.container_port, port.protocol
                ),
            ));
        }
    }
    Ok(())
}

fn container_ports(ports: &[PortSpec]) -> Option<Vec<ContainerPort>> {
    non_empty(
        ports
            .iter()
            .map(|port| ContainerPort {
                container_port: port.container_port,
                protocol: Some(port.protocol.as_str().to_string()),
                name: port.name.clone(),
                ..Default::default()
            })
            .collect(),
    )
}

fn tcp_probe(probe: &ProbeSpec, workload: &str) -> Result<Probe> {
    if !PORT_RANGE.contains(&probe.port) {
        return Err(GenerationError::validation(
            KIND,
            workload,
            format!("probe port {} is outside 1-65535", probe.port),
        ));
    }
    if probe.initial_delay_seconds < 0 || probe.period_seconds < 1 {
        return Err(GenerationError::validation(
            KIND,
            workload,
            "probe initialDelaySeconds must be >= 0 and periodSeconds >= 1",
        ));
    }

    Ok(Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::Int(probe.port),
            host: None,
        }),
        initial_delay_seconds: Some(probe.initial_delay_seconds),
        period_seconds: Some(probe.period_seconds),
        ..Default::default()
    })
}

/// Secret and ConfigMap volumes for the pod template, named with the same
/// deriver call the Secret and ConfigMap handlers use.
#[derive(Default)]
struct Mounts {
    volumes: Vec<Volume>,
    volume_mounts: Vec<VolumeMount>,
    references: Vec<(ResourceKind, String)>,
    paths: BTreeSet<String>,
}

impl Mounts {
    fn resolve(ctx: &HandlerContext<'_>, model: &WorkloadModel) -> Result<Self> {
        let mut mounts = Self::default();

        for secret_name in &model.secrets {
            let secret = ctx
                .registry
                .secret(secret_name)
                .filter(|s| mountable(ResourceKind::Secret, &s.name, &s.mount_path, &s.data))
                .ok_or_else(|| {
                    GenerationError::dangling(KIND, &model.name, ResourceKind::Secret, secret_name)
                })?;
            let resource_name = ctx.naming.name(&secret.name, ResourceKind::Secret)?;

            mounts.volumes.push(Volume {
                name: resource_name.clone(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(resource_name.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            });
            mounts.push_mount(
                resource_name,
                &secret.mount_path,
                secret.read_only,
                (ResourceKind::Secret, secret.name.as_str()),
                &model.name,
            )?;
        }

        for config_map_name in &model.config_maps {
            let config_map = ctx
                .registry
                .config_map(config_map_name)
                .filter(|c| mountable(ResourceKind::ConfigMap, &c.name, &c.mount_path, &c.data))
                .ok_or_else(|| {
                    GenerationError::dangling(
                        KIND,
                        &model.name,
                        ResourceKind::ConfigMap,
                        config_map_name,
                    )
                })?;
            let resource_name = ctx.naming.name(&config_map.name, ResourceKind::ConfigMap)?;

            mounts.volumes.push(Volume {
                name: resource_name.clone(),
                config_map: Some(ConfigMapVolumeSource {
                    name: resource_name.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            });
            mounts.push_mount(
                resource_name,
                &config_map.mount_path,
                config_map.read_only,
                (ResourceKind::ConfigMap, config_map.name.as_str()),
                &model.name,
            )?;
        }

        debug!(workload = %model.name, volumes = mounts.volumes.len(), "Resolved volume mounts");
        Ok(mounts)
    }

    fn push_mount(
        &mut self,
        volume: String,
        mount_path: &str,
        read_only: bool,
        (kind, declared_name): (ResourceKind, &str),
        workload: &str,
    ) -> Result<()> {
        if !self.paths.insert(mount_path.trim_end_matches('/').to_string()) {
            return Err(GenerationError::validation(
                KIND,
                workload,
                format!("mount path '{mount_path}' is used by more than one volume"),
            ));
        }
        self.volume_mounts.push(VolumeMount {
            name: volume,
            mount_path: mount_path.to_string(),
            read_only: Some(read_only),
            ..Default::default()
        });
        self.references.push((kind, declared_name.to_string()));
        Ok(())
    }
}

/// A Secret or ConfigMap its own handler would skip is never mounted, so the
/// pod template only references volumes that are emitted.
fn mountable(
    kind: ResourceKind,
    name: &str,
    mount_path: &str,
    data: &BTreeMap<String, String>,
) -> bool {
    match validate_volume_source(kind, name, mount_path, data) {
        Ok(()) => true,
        Err(err) => {
            debug!(%err, "Mount target is invalid");
            false
        }
    }
}
