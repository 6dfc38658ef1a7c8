//! HorizontalPodAutoscaler handler.
//!
//! A malformed metric invalidates the whole autoscaler; the artifact is
//! skipped rather than emitted without the bad entry.

use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec, MetricSpec,
    MetricTarget, ResourceMetricSource,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::info;

use super::{GeneratedArtifact, HandlerContext, Resource};
use crate::error::{GenerationError, Result};
use crate::ledger::NameLedger;
use crate::model::{MetricModel, MetricTargetType, MetricTargetValue, ScalingModel};
use crate::naming::ResourceKind;

const KIND: ResourceKind = ResourceKind::HorizontalPodAutoscaler;
const DEPLOYMENT_API_VERSION: &str = "apps/v1";

/// Build the autoscaler for `model`, targeting the Deployment named by
/// `scale_target_name`.
///
/// # Errors
///
/// - [`GenerationError::DanglingReference`] if the target Deployment was not generated
/// - [`GenerationError::Validation`] for bad replica bounds, target kind or metrics
pub fn generate(
    ctx: &HandlerContext<'_>,
    model: &ScalingModel,
    ledger: &NameLedger,
) -> Result<GeneratedArtifact> {
    let declared = model.entity_name();

    if model.scale_target_kind != ResourceKind::Deployment.as_str() {
        return Err(GenerationError::validation(
            KIND,
            declared,
            format!(
                "scaleTargetKind must be Deployment, got '{}'",
                model.scale_target_kind
            ),
        ));
    }

    let entry = ledger
        .resolve_resource(ResourceKind::Deployment, &model.scale_target_name)
        .ok_or_else(|| {
            GenerationError::dangling(
                KIND,
                declared,
                ResourceKind::Deployment,
                &model.scale_target_name,
            )
        })?;

    let name = ctx
        .naming
        .name(model.name.as_deref().unwrap_or(&entry.workload), KIND)?;

    if model.min_replicas < 1 {
        return Err(GenerationError::validation(
            KIND,
            declared,
            format!("minReplicas must be at least 1, got {}", model.min_replicas),
        ));
    }
    if model.max_replicas < model.min_replicas {
        return Err(GenerationError::validation(
            KIND,
            declared,
            format!(
                "maxReplicas ({}) must not be less than minReplicas ({})",
                model.max_replicas, model.min_replicas
            ),
        ));
    }

    let metrics = model
        .metrics
        .iter()
        .map(|metric| metric_spec(metric, declared))
        .collect::<Result<Vec<_>>>()?;

    let hpa = HorizontalPodAutoscaler {
        metadata: ctx.metadata(&name, entry.selector.to_map()),
        spec: Some(HorizontalPodAutoscalerSpec {
            min_replicas: Some(model.min_replicas),
            max_replicas: model.max_replicas,
            metrics: if metrics.is_empty() { None } else { Some(metrics) },
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some(DEPLOYMENT_API_VERSION.to_string()),
                kind: ResourceKind::Deployment.as_str().to_string(),
                name: entry.resource_name.clone(),
            },
            ..Default::default()
        }),
        status: None,
    };

    info!(
        hpa = %name,
        target = %entry.resource_name,
        min = model.min_replicas,
        max = model.max_replicas,
        "Generated horizontal pod autoscaler"
    );

    Ok(GeneratedArtifact {
        kind: KIND,
        name,
        group: entry.group().to_string(),
        resource: Resource::HorizontalPodAutoscaler(Box::new(hpa)),
    })
}

fn metric_spec(metric: &MetricModel, declared: &str) -> Result<MetricSpec> {
    let invalid = |message: String| GenerationError::validation(KIND, declared, message);

    let resource_name = metric.resource_name.trim();
    if resource_name.is_empty() {
        return Err(invalid("metric resourceName must not be empty".to_string()));
    }

    let mut target = MetricTarget {
        type_: metric.target_type.as_str().to_string(),
        ..Default::default()
    };

    match (metric.target_type, &metric.target_value) {
        (MetricTargetType::Utilization, MetricTargetValue::Number(percent)) => {
            let percent = i32::try_from(*percent)
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| {
                    invalid(format!(
                        "{resource_name} utilization target must be a positive percentage, got {percent}"
                    ))
                })?;
            target.average_utilization = Some(percent);
        }
        (MetricTargetType::Utilization, MetricTargetValue::Quantity(value)) => {
            return Err(invalid(format!(
                "{resource_name} utilization target must be a number, got '{value}'"
            )));
        }
        (kind, value) => {
            let quantity = match value {
                MetricTargetValue::Number(n) if *n > 0 => n.to_string(),
                MetricTargetValue::Quantity(q) if !q.trim().is_empty() => q.trim().to_string(),
                _ => {
                    return Err(invalid(format!(
                        "{resource_name} {} target must be a positive quantity, got '{value}'",
                        kind.as_str()
                    )))
                }
            };
            if kind == MetricTargetType::AverageValue {
                target.average_value = Some(Quantity(quantity));
            } else {
                target.value = Some(Quantity(quantity));
            }
        }
    }

    Ok(MetricSpec {
        type_: "Resource".to_string(),
        resource: Some(ResourceMetricSource {
            name: resource_name.to_string(),
            target,
        }),
        ..Default::default()
    })
}
