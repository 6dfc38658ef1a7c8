//! Write-once store for the models of one generation run.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    ConfigMapModel, ImageModel, JobModel, ScalingModel, SecretModel, ServiceModel, WorkloadModel,
};
use crate::error::RegistryError;

/// On-disk representation of a registry, as written by a front end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFile {
    #[serde(default)]
    pub workloads: Vec<WorkloadModel>,
    #[serde(default)]
    pub services: Vec<ServiceModel>,
    #[serde(default)]
    pub scaling: Vec<ScalingModel>,
    #[serde(default)]
    pub secrets: Vec<SecretModel>,
    #[serde(default)]
    pub config_maps: Vec<ConfigMapModel>,
    #[serde(default)]
    pub jobs: Vec<JobModel>,
    #[serde(default)]
    pub images: Vec<ImageModel>,
}

/// Typed models keyed by entity name. Each entity may be registered once per
/// model kind; iteration order is the key order, which keeps generation
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelRegistry {
    workloads: BTreeMap<String, WorkloadModel>,
    services: BTreeMap<String, ServiceModel>,
    scaling: BTreeMap<String, ScalingModel>,
    secrets: BTreeMap<String, SecretModel>,
    config_maps: BTreeMap<String, ConfigMapModel>,
    jobs: BTreeMap<String, JobModel>,
    images: BTreeMap<String, ImageModel>,
}

fn insert_once<T>(
    map: &mut BTreeMap<String, T>,
    kind: &'static str,
    name: String,
    model: T,
) -> Result<(), RegistryError> {
    if map.contains_key(&name) {
        return Err(RegistryError::Duplicate { kind, name });
    }
    debug!(kind, name = %name, "Registered model");
    map.insert(name, model);
    Ok(())
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a parsed model file.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the file declares the same
    /// entity twice.
    pub fn from_models(file: ModelFile) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for workload in file.workloads {
            registry.add_workload(workload)?;
        }
        for service in file.services {
            registry.add_service(service)?;
        }
        for scaling in file.scaling {
            registry.add_scaling(scaling)?;
        }
        for secret in file.secrets {
            registry.add_secret(secret)?;
        }
        for config_map in file.config_maps {
            registry.add_config_map(config_map)?;
        }
        for job in file.jobs {
            registry.add_job(job)?;
        }
        for image in file.images {
            registry.add_image(image)?;
        }
        Ok(registry)
    }

    /// Load a model file. `.json` files are parsed as JSON, everything else
    /// as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the file cannot be read, parsed, or
    /// declares duplicate entities.
    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let contents = std::fs::read_to_string(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let file: ModelFile = if is_json {
            serde_json::from_str(&contents).map_err(|e| RegistryError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        } else {
            serde_yaml::from_str(&contents).map_err(|e| RegistryError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };

        Self::from_models(file)
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the workload is already registered.
    pub fn add_workload(&mut self, model: WorkloadModel) -> Result<(), RegistryError> {
        insert_once(&mut self.workloads, "workload", model.name.clone(), model)
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if a service with the same name is
    /// already registered.
    pub fn add_service(&mut self, model: ServiceModel) -> Result<(), RegistryError> {
        insert_once(&mut self.services, "service", model.entity_name().to_string(), model)
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if a scaling policy with the same
    /// name is already registered.
    pub fn add_scaling(&mut self, model: ScalingModel) -> Result<(), RegistryError> {
        insert_once(&mut self.scaling, "scaling", model.entity_name().to_string(), model)
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the secret is already registered.
    pub fn add_secret(&mut self, model: SecretModel) -> Result<(), RegistryError> {
        insert_once(&mut self.secrets, "secret", model.name.clone(), model)
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the config map is already registered.
    pub fn add_config_map(&mut self, model: ConfigMapModel) -> Result<(), RegistryError> {
        insert_once(&mut self.config_maps, "config map", model.name.clone(), model)
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the job is already registered.
    pub fn add_job(&mut self, model: JobModel) -> Result<(), RegistryError> {
        insert_once(&mut self.jobs, "job", model.name.clone(), model)
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if an image is already registered
    /// for the same workload.
    pub fn add_image(&mut self, model: ImageModel) -> Result<(), RegistryError> {
        insert_once(&mut self.images, "image", model.workload.clone(), model)
    }

    pub fn workloads(&self) -> impl Iterator<Item = &WorkloadModel> {
        self.workloads.values()
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceModel> {
        self.services.values()
    }

    pub fn scaling(&self) -> impl Iterator<Item = &ScalingModel> {
        self.scaling.values()
    }

    pub fn secrets(&self) -> impl Iterator<Item = &SecretModel> {
        self.secrets.values()
    }

    pub fn config_maps(&self) -> impl Iterator<Item = &ConfigMapModel> {
        self.config_maps.values()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobModel> {
        self.jobs.values()
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageModel> {
        self.images.values()
    }

    #[must_use]
    pub fn secret(&self, name: &str) -> Option<&SecretModel> {
        self.secrets.get(name)
    }

    #[must_use]
    pub fn config_map(&self, name: &str) -> Option<&ConfigMapModel> {
        self.config_maps.get(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.model_count() == 0
    }

    #[must_use]
    pub fn model_count(&self) -> usize {
        self.workloads.len()
            + self.services.len()
            + self.scaling.len()
            + self.secrets.len()
            + self.config_maps.len()
            + self.jobs.len()
            + self.images.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PortSpec;

    #[test]
    fn rejects_duplicate_workloads() {
        let mut registry = ModelRegistry::new();
        registry
            .add_workload(WorkloadModel::new("hello", "hello:1.0"))
            .unwrap();
        let err = registry
            .add_workload(WorkloadModel::new("hello", "hello:2.0"))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Duplicate { kind: "workload", ref name } if name == "hello"
        ));
        assert_eq!(registry.model_count(), 1);
    }

    #[test]
    fn service_key_falls_back_to_selector() {
        let mut registry = ModelRegistry::new();
        registry.add_service(ServiceModel::for_workload("hello")).unwrap();
        assert!(registry.add_service(ServiceModel::for_workload("hello")).is_err());

        let named = ServiceModel {
            name: Some("hello-admin".into()),
            ..ServiceModel::for_workload("hello")
        };
        registry.add_service(named).unwrap();
        assert_eq!(registry.services().count(), 2);
    }

    #[test]
    fn loads_yaml_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.yaml");
        std::fs::write(
            &path,
            r"
workloads:
  - name: hello
    image: hello:1.0
    ports:
      - containerPort: 9090
services:
  - selector: hello
",
        )
        .unwrap();

        let registry = ModelRegistry::from_file(&path).unwrap();
        let workload = registry.workloads().next().unwrap();
        assert_eq!(workload.ports, vec![PortSpec::tcp(9090)]);
        assert_eq!(registry.services().count(), 1);
    }

    #[test]
    fn loads_json_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        std::fs::write(
            &path,
            r#"{"jobs": [{"name": "migrate", "image": "migrate:1"}]}"#,
        )
        .unwrap();

        let registry = ModelRegistry::from_file(&path).unwrap();
        assert_eq!(registry.jobs().count(), 1);
    }

    #[test]
    fn reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "workloads: [ {name: ").unwrap();

        let err = ModelRegistry::from_file(&path).unwrap_err();
        assert!(matches!(err, RegistryError::Parse { .. }));
        assert!(err.to_string().contains("broken.yaml"));
    }
}
