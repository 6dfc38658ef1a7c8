//! End-to-end generation tests: model file in, files on disk out.

use std::fs;
use std::path::Path;

use c2c::orchestrator::{ArtifactStatus, GenerationState};
use c2c::{
    runner, FileSystemSink, GenerationError, GenerationOrchestrator, GeneratorConfig, ModelFile,
    ModelRegistry, ResourceKind, ResourceNaming,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Deserialize;

const SCALING_MODELS: &str = r"
workloads:
  - name: scaling
    image: anuruddhal/math:sample3
    ports:
      - containerPort: 9090
    resources:
      limits:
        memory: 256Mi
        cpu: 500m
      requests:
        cpu: 200m
        memory: 100Mi
services:
  - selector: scaling
scaling:
  - minReplicas: 2
    maxReplicas: 5
    scaleTargetName: scaling-deployment
    metrics:
      - resourceName: cpu
        targetType: Utilization
        targetValue: 50
      - resourceName: memory
        targetType: Utilization
        targetValue: 60
";

fn registry_from(yaml: &str) -> ModelRegistry {
    let file: ModelFile = serde_yaml::from_str(yaml).unwrap();
    ModelRegistry::from_models(file).unwrap()
}

/// Split a manifest into its documents, keyed by `kind`.
fn documents(manifest: &str) -> Vec<(String, serde_yaml::Value)> {
    serde_yaml::Deserializer::from_str(manifest)
        .map(|doc| {
            let value = serde_yaml::Value::deserialize(doc).unwrap();
            let kind = value["kind"].as_str().unwrap().to_string();
            (kind, value)
        })
        .collect()
}

fn typed<T: serde::de::DeserializeOwned>(docs: &[(String, serde_yaml::Value)], kind: &str) -> T {
    let (_, value) = docs.iter().find(|(k, _)| k == kind).unwrap();
    serde_yaml::from_value(value.clone()).unwrap()
}

fn generate_into(registry: &ModelRegistry, root: &Path) -> c2c::GenerationReport {
    let naming = ResourceNaming::default();
    GenerationOrchestrator::new(registry, &naming).run(&mut FileSystemSink::new(root))
}

#[test]
fn scaling_sample_matches_expected_resources() {
    let dir = tempfile::tempdir().unwrap();
    let report = generate_into(&registry_from(SCALING_MODELS), dir.path());
    assert_eq!(report.state, GenerationState::Done);

    let manifest = fs::read_to_string(dir.path().join("kubernetes/scaling/scaling.yaml")).unwrap();
    let docs = documents(&manifest);
    let kinds: Vec<_> = docs.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(kinds, vec!["Deployment", "Service", "HorizontalPodAutoscaler"]);

    let deployment: Deployment = typed(&docs, "Deployment");
    assert_eq!(deployment.metadata.name.as_deref(), Some("scaling-deployment"));
    let pod = deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
    let container = &pod.containers[0];
    assert_eq!(container.image.as_deref(), Some("anuruddhal/math:sample3"));
    let resources = container.resources.as_ref().unwrap();
    assert_eq!(resources.limits.as_ref().unwrap()["memory"].0, "256Mi");
    assert_eq!(resources.requests.as_ref().unwrap()["cpu"].0, "200m");

    let service: Service = typed(&docs, "Service");
    assert_eq!(service.metadata.name.as_deref(), Some("scaling-svc"));
    assert_eq!(service.metadata.labels.as_ref().unwrap().len(), 1);
    let spec = service.spec.unwrap();
    assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
    assert_eq!(spec.selector.unwrap()["app"], "scaling");
    let port = &spec.ports.unwrap()[0];
    assert_eq!(port.port, 9090);
    assert_eq!(port.target_port, Some(IntOrString::Int(9090)));
    assert_eq!(port.protocol.as_deref(), Some("TCP"));

    let hpa: HorizontalPodAutoscaler = typed(&docs, "HorizontalPodAutoscaler");
    assert_eq!(hpa.metadata.name.as_deref(), Some("scaling-hpa"));
    let spec = hpa.spec.unwrap();
    assert_eq!((spec.min_replicas, spec.max_replicas), (Some(2), 5));
    assert_eq!(spec.scale_target_ref.kind, "Deployment");
    assert_eq!(spec.scale_target_ref.name, "scaling-deployment");
    let metrics: Vec<_> = spec
        .metrics
        .unwrap()
        .into_iter()
        .map(|m| {
            let resource = m.resource.unwrap();
            (resource.name, resource.target.average_utilization)
        })
        .collect();
    assert_eq!(
        metrics,
        vec![("cpu".to_string(), Some(50)), ("memory".to_string(), Some(60))]
    );
}

#[test]
fn service_selector_matches_pod_labels_for_unsanitized_names() {
    let registry = registry_from(
        r"
workloads:
  - name: My_App
    image: acme/my-app:1
    ports:
      - containerPort: 8080
services:
  - selector: My_App
",
    );
    let dir = tempfile::tempdir().unwrap();
    generate_into(&registry, dir.path());

    let manifest = fs::read_to_string(dir.path().join("kubernetes/my-app/my-app.yaml")).unwrap();
    let docs = documents(&manifest);
    let deployment: Deployment = typed(&docs, "Deployment");
    let service: Service = typed(&docs, "Service");

    let pod_labels = deployment
        .spec
        .unwrap()
        .template
        .metadata
        .unwrap()
        .labels
        .unwrap();
    for (key, value) in service.spec.unwrap().selector.unwrap() {
        assert_eq!(pod_labels.get(&key), Some(&value));
    }
    assert_eq!(pod_labels["app"], "my-app");
}

#[test]
fn dangling_autoscaler_is_the_only_error() {
    let registry = registry_from(
        r"
workloads:
  - name: hello
    image: acme/hello:1
    ports:
      - containerPort: 9090
services:
  - selector: hello
scaling:
  - minReplicas: 1
    maxReplicas: 3
    scaleTargetName: nothing-deployment
",
    );
    let dir = tempfile::tempdir().unwrap();
    let report = generate_into(&registry, dir.path());

    let errors: Vec<_> = report.errors().collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        GenerationError::DanglingReference {
            kind: ResourceKind::HorizontalPodAutoscaler,
            ..
        }
    ));
    assert_eq!(report.count("emitted"), 2);
}

#[test]
fn inverted_replica_bounds_skip_only_the_autoscaler() {
    let models = SCALING_MODELS.replace("minReplicas: 2", "minReplicas: 6");
    let dir = tempfile::tempdir().unwrap();
    let report = generate_into(&registry_from(&models), dir.path());

    assert_eq!(report.state, GenerationState::Done);
    let hpa = report
        .find(ResourceKind::HorizontalPodAutoscaler, "scaling-deployment")
        .unwrap();
    assert!(matches!(hpa.status, ArtifactStatus::Skipped { .. }));

    let manifest = fs::read_to_string(dir.path().join("kubernetes/scaling/scaling.yaml")).unwrap();
    let kinds: Vec<_> = documents(&manifest).into_iter().map(|(k, _)| k).collect();
    assert_eq!(kinds, vec!["Deployment".to_string(), "Service".to_string()]);
}

#[test]
fn output_is_byte_identical_across_runs() {
    let registry = registry_from(SCALING_MODELS);
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    generate_into(&registry, first.path());
    generate_into(&registry, second.path());

    let path = "kubernetes/scaling/scaling.yaml";
    assert_eq!(
        fs::read(first.path().join(path)).unwrap(),
        fs::read(second.path().join(path)).unwrap()
    );
}

#[test]
fn failed_scope_writes_nothing() {
    let registry = registry_from(
        r"
workloads:
  - name: hello
    ports:
      - containerPort: 9090
services:
  - selector: hello
",
    );
    let dir = tempfile::tempdir().unwrap();
    let report = generate_into(&registry, dir.path());

    assert!(report.is_failed());
    assert!(report.errors().any(|e| matches!(e, GenerationError::MissingImage { .. })));
    assert!(!dir.path().join("kubernetes").exists());
}

#[test]
fn secrets_and_config_maps_share_the_workload_manifest() {
    let registry = registry_from(
        r"
workloads:
  - name: hello
    image: acme/hello:1
    ports:
      - containerPort: 9090
    secrets: [db]
    configMaps: [conf]
secrets:
  - name: db
    mountPath: /etc/db
    data:
      password: hunter2
configMaps:
  - name: conf
    mountPath: /home/app/conf
    data:
      Config.toml: |
        port = 9090
",
    );
    let dir = tempfile::tempdir().unwrap();
    let report = generate_into(&registry, dir.path());
    assert_eq!(report.count("emitted"), 3);

    let manifest = fs::read_to_string(dir.path().join("kubernetes/hello/hello.yaml")).unwrap();
    let kinds: Vec<_> = documents(&manifest).into_iter().map(|(k, _)| k).collect();
    assert_eq!(kinds, vec!["Secret", "ConfigMap", "Deployment"]);
    assert!(manifest.contains("name: db-secret"));
    assert!(manifest.contains("name: conf-config-map"));
}

#[test]
fn empty_secret_is_never_mounted() {
    let registry = registry_from(
        r"
workloads:
  - name: hello
    image: acme/hello:1
    ports:
      - containerPort: 9090
    secrets: [db]
services:
  - selector: hello
secrets:
  - name: db
    mountPath: /etc/db
    data: {}
",
    );
    let dir = tempfile::tempdir().unwrap();
    let report = generate_into(&registry, dir.path());

    assert_eq!(report.state, GenerationState::Done);
    let deployment = report.find(ResourceKind::Deployment, "hello").unwrap();
    assert!(matches!(
        deployment.status,
        ArtifactStatus::Skipped {
            error: GenerationError::DanglingReference {
                target_kind: ResourceKind::Secret,
                ..
            }
        }
    ));
    let secret = report.find(ResourceKind::Secret, "db").unwrap();
    assert!(matches!(
        secret.status,
        ArtifactStatus::Skipped {
            error: GenerationError::Validation { .. }
        }
    ));
    assert_eq!(report.count("emitted"), 0);
    assert!(!dir.path().join("kubernetes").exists());
}

#[test]
fn relative_secret_mount_path_is_reported_on_the_secret() {
    let registry = registry_from(
        r"
workloads:
  - name: hello
    image: acme/hello:1
    ports:
      - containerPort: 9090
    secrets: [db]
  - name: other
    image: acme/other:1
secrets:
  - name: db
    mountPath: etc/db
    data:
      password: hunter2
  - name: lonely
    mountPath: relative
    data:
      token: t
",
    );
    let dir = tempfile::tempdir().unwrap();
    let report = generate_into(&registry, dir.path());

    for name in ["db", "lonely"] {
        let secret = report.find(ResourceKind::Secret, name).unwrap();
        assert!(
            matches!(
                &secret.status,
                ArtifactStatus::Skipped {
                    error: GenerationError::Validation {
                        kind: ResourceKind::Secret,
                        ..
                    }
                }
            ),
            "{name}: {:?}",
            secret.status
        );
    }
    let deployment = report.find(ResourceKind::Deployment, "hello").unwrap();
    assert!(matches!(
        deployment.status,
        ArtifactStatus::Skipped {
            error: GenerationError::DanglingReference { .. }
        }
    ));

    let manifest = fs::read_to_string(dir.path().join("kubernetes/other/other.yaml")).unwrap();
    assert!(!manifest.contains("db-secret"));
    assert!(!dir.path().join("kubernetes/db").exists());
    assert!(!dir.path().join("kubernetes/lonely").exists());
}

#[test]
fn dockerfile_is_written_next_to_manifests() {
    let registry = registry_from(
        r"
workloads:
  - name: hello
    image: ghcr.io/acme/hello:1.0
    ports:
      - containerPort: 9090
images:
  - workload: hello
    registry: ghcr.io/acme
    repository: hello
    tag: '1.0'
    baseImage: eclipse-temurin:21-jre
    workDir: /home/app
    copyFiles:
      - source: hello.jar
        target: /home/app/
    cmd: [java, -jar, hello.jar]
",
    );
    let dir = tempfile::tempdir().unwrap();
    let report = generate_into(&registry, dir.path());

    let dockerfile = fs::read_to_string(dir.path().join("docker/hello/Dockerfile")).unwrap();
    assert!(dockerfile.contains("FROM eclipse-temurin:21-jre"));
    assert!(dockerfile.contains("EXPOSE 9090"));
    assert!(dockerfile.contains(r#"CMD ["java","-jar","hello.jar"]"#));
    assert_eq!(report.image_builds.len(), 1);
    assert_eq!(report.image_builds[0].image, "ghcr.io/acme/hello:1.0");
    assert_eq!(report.image_builds[0].context_dir, dir.path().join("docker/hello"));
}

#[tokio::test]
async fn runner_writes_every_scope() {
    let registry = registry_from(
        r"
workloads:
  - name: alpha
    image: alpha:1
    ports:
      - containerPort: 8080
  - name: beta
    image: beta:1
    ports:
      - containerPort: 8081
jobs:
  - name: migrate
    image: migrate:1
services:
  - selector: alpha
  - selector: beta
",
    );
    let dir = tempfile::tempdir().unwrap();
    let config = GeneratorConfig {
        output_dir: dir.path().to_path_buf(),
        ..GeneratorConfig::default()
    };

    let reports = runner::generate_all(&registry, &config).await.unwrap();

    let scopes: Vec<_> = reports.iter().map(|r| r.scope.as_str()).collect();
    assert_eq!(scopes, vec!["alpha", "beta", "migrate"]);
    assert!(reports.iter().all(|r| r.state == GenerationState::Done));
    for group in ["alpha", "beta", "migrate"] {
        assert!(dir
            .path()
            .join(format!("kubernetes/{group}/{group}.yaml"))
            .exists());
    }
}

#[tokio::test]
async fn naming_failure_aborts_the_whole_run() {
    let registry = registry_from(
        r"
workloads:
  - name: hello
    image: hello:1
    ports:
      - containerPort: 8080
  - name: '!!!'
    image: broken:1
",
    );
    let dir = tempfile::tempdir().unwrap();
    let config = GeneratorConfig {
        output_dir: dir.path().to_path_buf(),
        ..GeneratorConfig::default()
    };

    let reports = runner::generate_all(&registry, &config).await.unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.is_failed()));
    assert!(reports.iter().any(|r| r
        .errors()
        .any(|e| matches!(e, GenerationError::Naming(_)))));
    let hello = reports.iter().find(|r| r.scope == "hello").unwrap();
    assert_eq!(hello.count("discarded"), 1);
    assert!(!dir.path().join("kubernetes").exists());
}
