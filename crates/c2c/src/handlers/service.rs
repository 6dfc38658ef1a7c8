//! Service handler.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::info;

use super::{GeneratedArtifact, HandlerContext, Resource};
use crate::error::{GenerationError, Result};
use crate::ledger::{LedgerEntry, NameLedger};
use crate::model::{ServiceModel, ServiceType, PORT_RANGE};
use crate::naming::ResourceKind;

const KIND: ResourceKind = ResourceKind::Service;

/// Build the Service for `model`, selecting the pods of the Deployment the
/// ledger recorded for `model.selector`.
///
/// # Errors
///
/// - [`GenerationError::DanglingReference`] if no Deployment was generated for the selector
/// - [`GenerationError::Validation`] for ports the Deployment does not expose
pub fn generate(
    ctx: &HandlerContext<'_>,
    model: &ServiceModel,
    ledger: &NameLedger,
) -> Result<GeneratedArtifact> {
    let name = ctx.naming.name(model.entity_name(), KIND)?;
    let workload_key = ctx.naming.selector(&model.selector)?.value;

    let entry = ledger
        .resolve(ResourceKind::Deployment, &workload_key)
        .ok_or_else(|| {
            GenerationError::dangling(
                KIND,
                model.entity_name(),
                ResourceKind::Deployment,
                &model.selector,
            )
        })?;

    let service_type = model.service_type.unwrap_or_default();
    let ports = service_ports(model, entry, service_type)?;

    let service = Service {
        metadata: ctx.metadata(&name, entry.selector.to_map()),
        spec: Some(ServiceSpec {
            type_: Some(service_type.as_str().to_string()),
            selector: Some(entry.selector.to_map()),
            session_affinity: model.session_affinity.map(|a| a.as_str().to_string()),
            ports: Some(ports),
            ..Default::default()
        }),
        status: None,
    };

    info!(
        service = %name,
        deployment = %entry.resource_name,
        service_type = service_type.as_str(),
        "Generated service"
    );

    Ok(GeneratedArtifact {
        kind: KIND,
        name,
        group: entry.group().to_string(),
        resource: Resource::Service(Box::new(service)),
    })
}

fn service_ports(
    model: &ServiceModel,
    entry: &LedgerEntry,
    service_type: ServiceType,
) -> Result<Vec<ServicePort>> {
    let invalid = |message: String| GenerationError::validation(KIND, model.entity_name(), message);

    // (port, target, protocol, name, node port)
    let declared: Vec<_> = if model.ports.is_empty() {
        entry
            .ports
            .iter()
            .map(|p| (p.container_port, p.container_port, p.protocol, p.name.clone(), None))
            .collect()
    } else {
        let mut declared = Vec::with_capacity(model.ports.len());
        for port in &model.ports {
            let target = port.target_port.unwrap_or(port.port);
            let exposed = entry.exposes(target, port.protocol).ok_or_else(|| {
                let target = port
                    .protocol
                    .map_or_else(|| target.to_string(), |proto| format!("{target}/{proto}"));
                invalid(format!(
                    "targetPort {target} is not exposed by deployment '{}'",
                    entry.resource_name
                ))
            })?;
            declared.push((
                port.port,
                target,
                port.protocol.unwrap_or(exposed.protocol),
                port.name.clone(),
                port.node_port,
            ));
        }
        declared
    };

    if declared.is_empty() {
        return Err(invalid(format!(
            "deployment '{}' exposes no ports to forward",
            entry.resource_name
        )));
    }

    let needs_names = declared.len() > 1;
    let mut seen = BTreeSet::new();
    let mut ports = Vec::with_capacity(declared.len());

    for (port, target, protocol, name, node_port) in declared {
        if !PORT_RANGE.contains(&port) {
            return Err(invalid(format!("service port {port} is outside 1-65535")));
        }
        if !seen.insert((port, protocol.as_str())) {
            return Err(invalid(format!("service port {port}/{protocol} is declared twice")));
        }
        if node_port.is_some() && !service_type.allows_node_port() {
            return Err(invalid(format!(
                "nodePort requires NodePort or LoadBalancer, service type is {}",
                service_type.as_str()
            )));
        }

        // Multi-port services require every port to be named.
        let name = name.or_else(|| {
            needs_names.then(|| format!("{}-{port}", protocol.as_str().to_lowercase()))
        });

        ports.push(ServicePort {
            port,
            target_port: Some(IntOrString::Int(target)),
            protocol: Some(protocol.as_str().to_string()),
            name,
            node_port,
            ..Default::default()
        });
    }

    Ok(ports)
}
