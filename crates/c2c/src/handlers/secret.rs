//! Secret handler.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use tracing::info;

use super::{validate_volume_source, GeneratedArtifact, HandlerContext, Resource};
use crate::error::Result;
use crate::ledger::NameLedger;
use crate::model::SecretModel;
use crate::naming::ResourceKind;

const KIND: ResourceKind = ResourceKind::Secret;

/// Build an `Opaque` Secret. When a Deployment mounts it, the Secret is
/// labelled and grouped with that Deployment.
///
/// # Errors
///
/// Returns [`GenerationError::Validation`](crate::error::GenerationError::Validation)
/// for empty data, invalid data keys or a relative mount path.
pub fn generate(
    ctx: &HandlerContext<'_>,
    model: &SecretModel,
    ledger: &NameLedger,
) -> Result<GeneratedArtifact> {
    let name = ctx.naming.name(&model.name, KIND)?;
    validate_volume_source(KIND, &model.name, &model.mount_path, &model.data)?;

    let (labels, group) = match ledger.owner_of(KIND, &model.name) {
        Some(owner) => (owner.selector.to_map(), owner.group().to_string()),
        None => (Default::default(), ctx.naming.selector(&model.name)?.value),
    };

    let secret = Secret {
        metadata: ctx.metadata(&name, labels),
        type_: Some("Opaque".to_string()),
        data: Some(
            model
                .data
                .iter()
                .map(|(key, value)| (key.clone(), ByteString(value.clone().into_bytes())))
                .collect(),
        ),
        ..Default::default()
    };

    info!(secret = %name, keys = model.data.len(), "Generated secret");

    Ok(GeneratedArtifact {
        kind: KIND,
        name,
        group,
        resource: Resource::Secret(Box::new(secret)),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::error::GenerationError;
    use crate::handlers::deployment;
    use crate::handlers::test_support::{context, hello_workload};
    use crate::model::{ModelRegistry, WorkloadModel};
    use crate::naming::ResourceNaming;

    fn db_secret() -> SecretModel {
        SecretModel {
            name: "db".into(),
            mount_path: "/etc/db".into(),
            read_only: true,
            data: BTreeMap::from([("password".into(), "hunter2".into())]),
        }
    }

    #[test]
    fn mounted_secret_joins_owner_group() {
        let mut registry = ModelRegistry::new();
        registry.add_secret(db_secret()).unwrap();
        let naming = ResourceNaming::default();
        let ctx = context(&registry, &naming);
        let mut ledger = NameLedger::new();
        let workload = WorkloadModel {
            secrets: vec!["db".into()],
            ..hello_workload()
        };
        deployment::generate(&ctx, &workload, &mut ledger).unwrap();

        let artifact = generate(&ctx, &db_secret(), &ledger).unwrap();
        assert_eq!(artifact.name, "db-secret");
        assert_eq!(artifact.group, "hello");

        let Resource::Secret(secret) = &artifact.resource else {
            panic!("expected secret");
        };
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
        assert_eq!(secret.metadata.labels.as_ref().unwrap()["app"], "hello");
        assert_eq!(
            secret.data.as_ref().unwrap()["password"],
            ByteString(b"hunter2".to_vec())
        );
    }

    #[test]
    fn standalone_secret_uses_own_group() {
        let registry = ModelRegistry::new();
        let naming = ResourceNaming::default();
        let artifact =
            generate(&context(&registry, &naming), &db_secret(), &NameLedger::new()).unwrap();
        assert_eq!(artifact.group, "db");
        let Resource::Secret(secret) = &artifact.resource else {
            panic!("expected secret");
        };
        assert!(secret.metadata.labels.is_none());
    }

    #[test]
    fn empty_secret_is_invalid() {
        let registry = ModelRegistry::new();
        let naming = ResourceNaming::default();
        let model = SecretModel {
            data: BTreeMap::new(),
            ..db_secret()
        };
        let err = generate(&context(&registry, &naming), &model, &NameLedger::new()).unwrap_err();
        assert!(matches!(err, GenerationError::Validation { kind: ResourceKind::Secret, .. }));
    }

    #[test]
    fn relative_mount_path_is_invalid() {
        let registry = ModelRegistry::new();
        let naming = ResourceNaming::default();
        let model = SecretModel {
            mount_path: "etc/db".into(),
            ..db_secret()
        };
        let err = generate(&context(&registry, &naming), &model, &NameLedger::new()).unwrap_err();
        assert!(matches!(err, GenerationError::Validation { kind: ResourceKind::Secret, .. }));
        assert!(err.to_string().contains("etc/db"));
    }
}
