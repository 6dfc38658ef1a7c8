//! ConfigMap handler.

use k8s_openapi::api::core::v1::ConfigMap;
use tracing::info;

use super::{validate_volume_source, GeneratedArtifact, HandlerContext, Resource};
use crate::error::Result;
use crate::ledger::NameLedger;
use crate::model::ConfigMapModel;
use crate::naming::ResourceKind;

const KIND: ResourceKind = ResourceKind::ConfigMap;

/// Build a ConfigMap, grouped with the Deployment that mounts it if any.
///
/// # Errors
///
/// Returns [`GenerationError::Validation`](crate::error::GenerationError::Validation)
/// for empty data, invalid data keys or a relative mount path.
pub fn generate(
    ctx: &HandlerContext<'_>,
    model: &ConfigMapModel,
    ledger: &NameLedger,
) -> Result<GeneratedArtifact> {
    let name = ctx.naming.name(&model.name, KIND)?;
    validate_volume_source(KIND, &model.name, &model.mount_path, &model.data)?;

    let (labels, group) = match ledger.owner_of(KIND, &model.name) {
        Some(owner) => (owner.selector.to_map(), owner.group().to_string()),
        None => (Default::default(), ctx.naming.selector(&model.name)?.value),
    };

    let config_map = ConfigMap {
        metadata: ctx.metadata(&name, labels),
        data: Some(model.data.clone()),
        ..Default::default()
    };

    info!(config_map = %name, keys = model.data.len(), "Generated config map");

    Ok(GeneratedArtifact {
        kind: KIND,
        name,
        group,
        resource: Resource::ConfigMap(Box::new(config_map)),
    })
}
