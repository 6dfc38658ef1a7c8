//! Scope partitioning and concurrent generation.
//!
//! A registry is split into independent scopes, one per workload or job
//! keyed by its sanitized name. Services, autoscalers and images follow the
//! workload they reference; secrets and config maps are copied into every
//! scope that mounts them. Models that reference nothing known form their
//! own orphan scope, where they surface as dangling references.
//!
//! Each scope owns its registry and ledger, so scopes can run on separate
//! blocking workers without sharing state. Generation finishes for every
//! scope before anything is written; a naming failure in any scope discards
//! the whole run.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::GeneratorConfig;
use crate::error::{RegistryError, RunError};
use crate::model::ModelRegistry;
use crate::naming::{ResourceKind, ResourceNaming};
use crate::orchestrator::{Generation, GenerationOrchestrator, GenerationReport};
use crate::sink::FileSystemSink;

fn scope_key(naming: &ResourceNaming, name: &str) -> String {
    naming
        .selector(name)
        .map_or_else(|_| name.to_string(), |label| label.value)
}

/// Split `registry` into independent scopes, sorted by scope name.
///
/// # Errors
///
/// Returns [`RegistryError::Duplicate`] if a model would be registered twice
/// within one scope.
pub fn partition(
    registry: &ModelRegistry,
    naming: &ResourceNaming,
) -> Result<Vec<(String, ModelRegistry)>, RegistryError> {
    let mut scopes: BTreeMap<String, ModelRegistry> = BTreeMap::new();
    let mut by_deployment: HashMap<String, String> = HashMap::new();

    for workload in registry.workloads() {
        let key = scope_key(naming, &workload.name);
        if let Ok(name) = naming.name(&workload.name, ResourceKind::Deployment) {
            by_deployment.insert(name, key.clone());
        }

        let scope = scopes.entry(key).or_default();
        scope.add_workload(workload.clone())?;
        for secret in workload.secrets.iter().filter_map(|s| registry.secret(s)) {
            if scope.secret(&secret.name).is_none() {
                scope.add_secret(secret.clone())?;
            }
        }
        for config_map in workload.config_maps.iter().filter_map(|c| registry.config_map(c)) {
            if scope.config_map(&config_map.name).is_none() {
                scope.add_config_map(config_map.clone())?;
            }
        }
    }

    for job in registry.jobs() {
        scopes
            .entry(scope_key(naming, &job.name))
            .or_default()
            .add_job(job.clone())?;
    }

    for service in registry.services() {
        scopes
            .entry(scope_key(naming, &service.selector))
            .or_default()
            .add_service(service.clone())?;
    }

    for scaling in registry.scaling() {
        let key = by_deployment
            .get(&scaling.scale_target_name)
            .cloned()
            .unwrap_or_else(|| scope_key(naming, &scaling.scale_target_name));
        scopes.entry(key).or_default().add_scaling(scaling.clone())?;
    }

    for image in registry.images() {
        scopes
            .entry(scope_key(naming, &image.workload))
            .or_default()
            .add_image(image.clone())?;
    }

    let mounted = |kind: ResourceKind, name: &str| {
        registry.workloads().any(|w| match kind {
            ResourceKind::Secret => w.secrets.iter().any(|s| s == name),
            _ => w.config_maps.iter().any(|c| c == name),
        })
    };

    for secret in registry.secrets() {
        if !mounted(ResourceKind::Secret, &secret.name) {
            let scope = scopes.entry(scope_key(naming, &secret.name)).or_default();
            if scope.secret(&secret.name).is_none() {
                scope.add_secret(secret.clone())?;
            }
        }
    }
    for config_map in registry.config_maps() {
        if !mounted(ResourceKind::ConfigMap, &config_map.name) {
            let scope = scopes.entry(scope_key(naming, &config_map.name)).or_default();
            if scope.config_map(&config_map.name).is_none() {
                scope.add_config_map(config_map.clone())?;
            }
        }
    }

    debug!(scopes = scopes.len(), "Partitioned model registry");
    Ok(scopes.into_iter().collect())
}

fn generate_scope(
    scope: &str,
    registry: &ModelRegistry,
    naming: &ResourceNaming,
    namespace: Option<&str>,
) -> Generation {
    GenerationOrchestrator::new(registry, naming)
        .with_scope(scope)
        .with_namespace(namespace)
        .generate()
}

async fn run_scopes(
    registry: &ModelRegistry,
    config: &GeneratorConfig,
    output: Option<PathBuf>,
) -> Result<Vec<GenerationReport>, RunError> {
    let naming = config.naming();
    let scopes = partition(registry, &naming)?;
    info!(
        scopes = scopes.len(),
        parallel = config.parallel,
        "Starting generation"
    );

    let mut generations = Vec::with_capacity(scopes.len());
    if config.parallel {
        let mut set = JoinSet::new();
        for (scope, scope_registry) in scopes {
            let naming = naming.clone();
            let namespace = config.namespace.clone();
            set.spawn_blocking(move || {
                generate_scope(&scope, &scope_registry, &naming, namespace.as_deref())
            });
        }
        while let Some(joined) = set.join_next().await {
            generations.push(joined?);
        }
    } else {
        for (scope, scope_registry) in scopes {
            generations.push(generate_scope(
                &scope,
                &scope_registry,
                &naming,
                config.namespace.as_deref(),
            ));
        }
    }

    // A naming failure anywhere aborts the run: nothing is written.
    if let Some(failed) = generations.iter().find(|g| g.has_naming_failure()) {
        error!(scope = %failed.report.scope, "Naming failure, discarding every scope");
        for generation in &mut generations {
            generation.discard();
        }
    }

    let mut reports: Vec<GenerationReport> = match output {
        None => generations.into_iter().map(Generation::finish).collect(),
        Some(root) if config.parallel => {
            let mut set = JoinSet::new();
            for generation in generations {
                let root = root.clone();
                set.spawn_blocking(move || generation.emit(&mut FileSystemSink::new(root)));
            }
            let mut reports = Vec::with_capacity(set.len());
            while let Some(joined) = set.join_next().await {
                reports.push(joined?);
            }
            reports
        }
        Some(root) => {
            let mut sink = FileSystemSink::new(root);
            generations
                .into_iter()
                .map(|generation| generation.emit(&mut sink))
                .collect()
        }
    };

    reports.sort_by(|a, b| a.scope.cmp(&b.scope));
    Ok(reports)
}

/// Generate and write every scope below `config.output_dir`.
///
/// # Errors
///
/// Returns [`RunError`] if the registry cannot be partitioned or a worker
/// panics. Per-artifact failures are reported, not returned.
pub async fn generate_all(
    registry: &ModelRegistry,
    config: &GeneratorConfig,
) -> Result<Vec<GenerationReport>, RunError> {
    run_scopes(registry, config, Some(config.output_dir.clone())).await
}

/// Generate every scope without writing anything.
///
/// # Errors
///
/// See [`generate_all`].
pub async fn validate_all(
    registry: &ModelRegistry,
    config: &GeneratorConfig,
) -> Result<Vec<GenerationReport>, RunError> {
    run_scopes(registry, config, None).await
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{
        MetricModel, PortSpec, ScalingModel, SecretModel, ServiceModel, WorkloadModel,
    };
    use crate::orchestrator::GenerationState;

    fn secret(name: &str) -> SecretModel {
        SecretModel {
            name: name.into(),
            mount_path: format!("/etc/{name}"),
            read_only: true,
            data: BTreeMap::from([("token".into(), "t".into())]),
        }
    }

    #[test]
    fn partitions_by_workload() {
        let mut registry = ModelRegistry::new();
        registry
            .add_workload(WorkloadModel {
                secrets: vec!["shared".into()],
                ..WorkloadModel::new("Hello World", "hello:1").with_port(PortSpec::tcp(9090))
            })
            .unwrap();
        registry
            .add_workload(WorkloadModel {
                secrets: vec!["shared".into()],
                ..WorkloadModel::new("billing", "billing:1")
            })
            .unwrap();
        registry.add_secret(secret("shared")).unwrap();
        registry.add_secret(secret("lonely")).unwrap();
        registry.add_service(ServiceModel::for_workload("Hello World")).unwrap();
        registry.add_service(ServiceModel::for_workload("ghost")).unwrap();
        registry
            .add_scaling(ScalingModel {
                name: None,
                min_replicas: 1,
                max_replicas: 2,
                metrics: vec![MetricModel::utilization("cpu", 80)],
                scale_target_name: "hello-world-deployment".into(),
                scale_target_kind: "Deployment".into(),
            })
            .unwrap();

        let scopes = partition(&registry, &ResourceNaming::default()).unwrap();
        let names: Vec<_> = scopes.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["billing", "ghost", "hello-world", "lonely"]);

        let hello = &scopes[2].1;
        assert_eq!(hello.workloads().count(), 1);
        assert_eq!(hello.services().count(), 1);
        assert_eq!(hello.scaling().count(), 1);
        assert!(hello.secret("shared").is_some());
        assert!(scopes[0].1.secret("shared").is_some());
        assert_eq!(scopes[3].1.secrets().count(), 1);
    }

    #[tokio::test]
    async fn parallel_and_sequential_runs_agree() {
        let mut registry = ModelRegistry::new();
        for name in ["alpha", "beta", "gamma"] {
            registry
                .add_workload(
                    WorkloadModel::new(name, format!("{name}:1")).with_port(PortSpec::tcp(8080)),
                )
                .unwrap();
            registry.add_service(ServiceModel::for_workload(name)).unwrap();
        }

        let parallel = validate_all(&registry, &GeneratorConfig::default()).await.unwrap();
        let sequential = validate_all(
            &registry,
            &GeneratorConfig {
                parallel: false,
                ..GeneratorConfig::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(parallel, sequential);
        let scopes: Vec<_> = parallel.iter().map(|r| r.scope.as_str()).collect();
        assert_eq!(scopes, vec!["alpha", "beta", "gamma"]);
        assert!(parallel.iter().all(|r| r.state == GenerationState::Done));
    }
}
