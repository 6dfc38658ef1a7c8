//! Dockerfile handler.
//!
//! Renders a build recipe for the image a Deployment or Job runs. Output is
//! deterministic: environment entries are sorted, copy instructions keep
//! their declaration order.

use std::fmt::Write as _;

use tracing::info;

use super::{GeneratedArtifact, HandlerContext, Resource};
use crate::error::{GenerationError, Result};
use crate::ledger::NameLedger;
use crate::model::{ImageModel, Protocol};
use crate::naming::ResourceKind;

const KIND: ResourceKind = ResourceKind::Image;
const HEADER: &str = "# Auto-generated by c2c. Do not edit.";

/// Render the Dockerfile for `model`.
///
/// # Errors
///
/// - [`GenerationError::DanglingReference`] if no Deployment or Job was built for the workload
/// - [`GenerationError::Validation`] if the image reference disagrees with the container image
pub fn generate(
    ctx: &HandlerContext<'_>,
    model: &ImageModel,
    ledger: &NameLedger,
) -> Result<GeneratedArtifact> {
    let workload_key = ctx.naming.selector(&model.workload)?.value;
    let entry = ledger
        .resolve(ResourceKind::Deployment, &workload_key)
        .or_else(|| ledger.resolve(ResourceKind::Job, &workload_key))
        .ok_or_else(|| {
            GenerationError::dangling(
                KIND,
                &model.workload,
                ResourceKind::Deployment,
                &model.workload,
            )
        })?;

    let reference = model.reference();
    if reference != entry.image {
        return Err(GenerationError::validation(
            KIND,
            &model.workload,
            format!(
                "image '{reference}' does not match container image '{}' of {} '{}'",
                entry.image, entry.kind, entry.resource_name
            ),
        ));
    }
    if model.base_image.trim().is_empty() {
        return Err(GenerationError::validation(
            KIND,
            &model.workload,
            "baseImage must not be empty",
        ));
    }

    let exposed: Vec<String> = entry
        .ports
        .iter()
        .map(|port| match port.protocol {
            Protocol::Tcp => port.container_port.to_string(),
            Protocol::Udp => format!("{}/udp", port.container_port),
        })
        .collect();

    let contents = render(model, &exposed)?;

    info!(
        image = %reference,
        workload = %entry.workload,
        exposed = exposed.len(),
        "Generated dockerfile"
    );

    Ok(GeneratedArtifact {
        kind: KIND,
        name: reference,
        group: entry.group().to_string(),
        resource: Resource::Dockerfile(contents),
    })
}

fn render(model: &ImageModel, exposed: &[String]) -> Result<String> {
    let exec_form = |args: &[String]| {
        serde_json::to_string(args).map_err(|e| {
            GenerationError::validation(
                KIND,
                &model.workload,
                format!("cannot encode exec form: {e}"),
            )
        })
    };

    // Writing into a String cannot fail.
    let mut out = String::new();
    let _ = writeln!(out, "{HEADER}");
    let _ = writeln!(out);
    let _ = writeln!(out, "FROM {}", model.base_image.trim());

    if let Some(work_dir) = &model.work_dir {
        let _ = writeln!(out, "WORKDIR {work_dir}");
    }
    for (key, value) in &model.env {
        if value.contains(['\n', '\r']) {
            return Err(GenerationError::validation(
                KIND,
                &model.workload,
                format!("ENV value for '{key}' must be a single line"),
            ));
        }
        let _ = writeln!(out, "ENV {key}=\"{}\"", escape_env_value(value));
    }
    for copy in &model.copy_files {
        let _ = writeln!(out, "COPY {} {}", copy.source, copy.target);
    }
    if !exposed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "EXPOSE {}", exposed.join(" "));
    }
    if let Some(user) = &model.user {
        let _ = writeln!(out);
        let _ = writeln!(out, "USER {user}");
    }
    if !model.entrypoint.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "ENTRYPOINT {}", exec_form(&model.entrypoint)?);
    }
    if !model.cmd.is_empty() {
        let _ = writeln!(out, "CMD {}", exec_form(&model.cmd)?);
    }

    Ok(out)
}

/// Escape a value for a double-quoted `ENV` instruction. `$` is escaped so the
/// value is taken literally instead of being expanded by the builder.
fn escape_env_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
