//! Job handler.

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::info;

use super::{env_vars, resource_requirements, GeneratedArtifact, HandlerContext, Resource};
use crate::error::{GenerationError, Result};
use crate::ledger::{LedgerEntry, NameLedger};
use crate::model::JobModel;
use crate::naming::ResourceKind;

const KIND: ResourceKind = ResourceKind::Job;
const DEFAULT_BACKOFF_LIMIT: i32 = 3;

/// Build the Job for `model` and record it so an image model can target it.
///
/// # Errors
///
/// - [`GenerationError::Naming`] if the job name cannot be sanitized
/// - [`GenerationError::MissingImage`] if no image is declared
/// - [`GenerationError::Validation`] for a negative backoff limit or non-positive deadline
pub fn generate(
    ctx: &HandlerContext<'_>,
    model: &JobModel,
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

    let backoff_limit = model.backoff_limit.unwrap_or(DEFAULT_BACKOFF_LIMIT);
    if backoff_limit < 0 {
        return Err(GenerationError::validation(
            KIND,
            &model.name,
            format!("backoffLimit must not be negative, got {backoff_limit}"),
        ));
    }
    if let Some(deadline) = model.active_deadline_seconds.filter(|d| *d <= 0) {
        return Err(GenerationError::validation(
            KIND,
            &model.name,
            format!("activeDeadlineSeconds must be positive, got {deadline}"),
        ));
    }

    let labels = selector.to_map();
    let container = Container {
        name: selector.value.clone(),
        image: Some(image.to_string()),
        image_pull_policy: model.image_pull_policy.map(|p| p.as_str().to_string()),
        env: env_vars(&model.env),
        resources: resource_requirements(&model.resources),
        ..Default::default()
    };

    let job = Job {
        metadata: ctx.metadata(&name, labels.clone()),
        spec: Some(JobSpec {
            backoff_limit: Some(backoff_limit),
            active_deadline_seconds: model.active_deadline_seconds,
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    restart_policy: Some(model.restart_policy.as_str().to_string()),
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
        ports: Vec::new(),
        mounts: Vec::new(),
    });

    info!(job = %name, image = %image, backoff_limit, "Generated job");

    Ok(GeneratedArtifact {
        kind: KIND,
        name,
        group: selector.value,
        resource: Resource::Job(Box::new(job)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::context;
    use crate::model::{ModelRegistry, RestartPolicy};
    use crate::naming::ResourceNaming;

    fn migrate() -> JobModel {
        JobModel {
            name: "Migrate DB".into(),
            image: Some("acme/migrate:2".into()),
            ..JobModel::default()
        }
    }

    fn build(model: &JobModel, ledger: &mut NameLedger) -> Result<GeneratedArtifact> {
        let registry = ModelRegistry::new();
        let naming = ResourceNaming::default();
        generate(&context(&registry, &naming), model, ledger)
    }

    #[test]
    fn builds_job_with_defaults_and_records_it() {
        let mut ledger = NameLedger::new();
        let artifact = build(&migrate(), &mut ledger).unwrap();

        assert_eq!(artifact.name, "migrate-db-job");
        assert_eq!(artifact.group, "migrate-db");

        let Resource::Job(job) = &artifact.resource else {
            panic!("expected job");
        };
        let spec = job.spec.as_ref().unwrap();
        assert_eq!(spec.backoff_limit, Some(3));
        let pod = spec.template.spec.as_ref().unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod.containers[0].name, "migrate-db");

        let entry = ledger.resolve(ResourceKind::Job, "migrate-db").unwrap();
        assert_eq!(entry.image, "acme/migrate:2");
        assert!(ledger.resolve(ResourceKind::Deployment, "migrate-db").is_none());
    }

    #[test]
    fn honours_restart_policy_and_deadline() {
        let model = JobModel {
            restart_policy: RestartPolicy::OnFailure,
            active_deadline_seconds: Some(600),
            backoff_limit: Some(0),
            ..migrate()
        };
        let artifact = build(&model, &mut NameLedger::new()).unwrap();
        let Resource::Job(job) = &artifact.resource else {
            panic!("expected job");
        };
        let spec = job.spec.as_ref().unwrap();
        assert_eq!(spec.active_deadline_seconds, Some(600));
        assert_eq!(spec.backoff_limit, Some(0));
        assert_eq!(
            spec.template.spec.as_ref().unwrap().restart_policy.as_deref(),
            Some("OnFailure")
        );
    }

    #[test]
    fn missing_image_is_fatal() {
        let model = JobModel {
            image: Some("   ".into()),
            ..migrate()
        };
        let mut ledger = NameLedger::new();
        let err = build(&model, &mut ledger).unwrap_err();
        assert!(matches!(err, GenerationError::MissingImage { kind: ResourceKind::Job, .. }));
        assert!(err.is_fatal());
        assert!(ledger.is_empty());
    }

    #[test]
    fn rejects_bad_limits() {
        let negative = JobModel {
            backoff_limit: Some(-1),
            ..migrate()
        };
        assert!(matches!(
            build(&negative, &mut NameLedger::new()),
            Err(GenerationError::Validation { .. })
        ));

        let zero_deadline = JobModel {
            active_deadline_seconds: Some(0),
            ..migrate()
        };
        assert!(matches!(
            build(&zero_deadline, &mut NameLedger::new()),
            Err(GenerationError::Validation { .. })
        ));
    }
}
