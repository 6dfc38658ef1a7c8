//! Generation orchestrator.
//!
//! Drives one workload scope through
//! `Collecting -> Validating -> Emitting -> Done | Failed`:
//!
//! 1. **Collecting** - one [`Handler`] per model in the registry.
//! 2. **Validating** - primary handlers (Deployment, Job) run first and fill
//!    the [`NameLedger`]; dependent handlers resolve against it. Non-fatal
//!    errors skip the affected artifact. A fatal error fails the scope and
//!    every artifact already built is discarded.
//! 3. **Emitting** - one manifest per group and one Dockerfile per image are
//!    handed to the [`ArtifactSink`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{GenerationError, NamingError};
use crate::handlers::{GeneratedArtifact, Handler, HandlerContext, Resource};
use crate::ledger::NameLedger;
use crate::model::ModelRegistry;
use crate::naming::{ResourceKind, ResourceNaming};
use crate::sink::{render_manifest, ArtifactSink, OutputLayout};

/// Scope name used when the whole registry is generated at once.
pub const DEFAULT_SCOPE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GenerationState {
    Collecting,
    Validating,
    Emitting,
    Done,
    Failed,
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Collecting => "Collecting",
            Self::Validating => "Validating",
            Self::Emitting => "Emitting",
            Self::Done => "Done",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Outcome for a single artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactStatus {
    /// Built and waiting to be emitted.
    Generated,
    Emitted { path: PathBuf },
    /// Not built because of a non-fatal error.
    Skipped { error: GenerationError },
    /// Not built because of a fatal error; the scope failed.
    Failed { error: GenerationError },
    /// Built, then dropped because another artifact of the scope failed.
    Discarded,
    WriteFailed { message: String },
}

impl ArtifactStatus {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Emitted { .. } => "emitted",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
            Self::Discarded => "discarded",
            Self::WriteFailed { .. } => "write-failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactReport {
    pub kind: ResourceKind,
    /// Canonical name when built, declared name otherwise.
    pub name: String,
    pub status: ArtifactStatus,
}

/// An image the external builder should produce from a generated Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBuildRequest {
    pub image: String,
    pub context_dir: PathBuf,
    pub dockerfile: PathBuf,
}

/// Per-scope result of a generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub scope: String,
    pub state: GenerationState,
    pub artifacts: Vec<ArtifactReport>,
    pub image_builds: Vec<ImageBuildRequest>,
}

impl GenerationReport {
    fn new(scope: &str) -> Self {
        Self {
            scope: scope.to_string(),
            state: GenerationState::Collecting,
            artifacts: Vec::new(),
            image_builds: Vec::new(),
        }
    }

    fn transition(&mut self, to: GenerationState) {
        debug!(scope = %self.scope, from = %self.state, to = %to, "Generation state transition");
        self.state = to;
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state == GenerationState::Failed
    }

    /// Artifacts whose status label matches `label`.
    #[must_use]
    pub fn count(&self, label: &str) -> usize {
        self.artifacts
            .iter()
            .filter(|a| a.status.label() == label)
            .count()
    }

    /// Every generation error recorded for the scope.
    pub fn errors(&self) -> impl Iterator<Item = &GenerationError> {
        self.artifacts.iter().filter_map(|a| match &a.status {
            ArtifactStatus::Skipped { error } | ArtifactStatus::Failed { error } => Some(error),
            _ => None,
        })
    }

    #[must_use]
    pub fn has_write_failures(&self) -> bool {
        self.artifacts
            .iter()
            .any(|a| matches!(a.status, ArtifactStatus::WriteFailed { .. }))
    }

    /// Look up the report entry for an artifact.
    #[must_use]
    pub fn find(&self, kind: ResourceKind, name: &str) -> Option<&ArtifactReport> {
        self.artifacts
            .iter()
            .find(|a| a.kind == kind && a.name == name)
    }

    fn set_status(&mut self, kind: ResourceKind, name: &str, status: ArtifactStatus) {
        if let Some(entry) = self
            .artifacts
            .iter_mut()
            .find(|a| a.kind == kind && a.name == name)
        {
            entry.status = status;
        }
    }
}

/// Built artifacts and their report, between validation and emission.
#[derive(Debug, Clone)]
pub struct Generation {
    pub artifacts: Vec<GeneratedArtifact>,
    pub report: GenerationReport,
}

impl Generation {
    /// Drop every built artifact and fail the scope.
    pub fn discard(&mut self) {
        for entry in &mut self.report.artifacts {
            if entry.status == ArtifactStatus::Generated {
                entry.status = ArtifactStatus::Discarded;
            }
        }
        self.artifacts.clear();
        if !self.report.is_failed() {
            self.report.transition(GenerationState::Failed);
        }
    }

    /// Whether a naming error failed the scope. Naming errors abort the
    /// whole run, not only their own scope.
    #[must_use]
    pub fn has_naming_failure(&self) -> bool {
        self.report.artifacts.iter().any(|a| {
            matches!(
                a.status,
                ArtifactStatus::Failed {
                    error: GenerationError::Naming(_)
                }
            )
        })
    }

    /// Write the artifacts of a successful generation to `sink`. A failed
    /// generation is returned untouched.
    pub fn emit(self, sink: &mut dyn ArtifactSink) -> GenerationReport {
        let Self {
            artifacts,
            mut report,
        } = self;
        if report.is_failed() {
            return report;
        }

        report.transition(GenerationState::Emitting);

        let mut manifests: BTreeMap<&str, Vec<&GeneratedArtifact>> = BTreeMap::new();
        let mut dockerfiles = Vec::new();
        for artifact in &artifacts {
            match &artifact.resource {
                Resource::Dockerfile(contents) => dockerfiles.push((artifact, contents)),
                _ => manifests
                    .entry(artifact.group.as_str())
                    .or_default()
                    .push(artifact),
            }
        }

        for (group, members) in manifests {
            let written = render_manifest(members.iter().copied())
                .and_then(|manifest| sink.write_file(&OutputLayout::manifest(group), &manifest));
            mark_written(&mut report, &members, written);
        }

        for (artifact, contents) in dockerfiles {
            let written = sink.write_file(&OutputLayout::dockerfile(&artifact.group), contents);
            if let Ok(path) = &written {
                report.image_builds.push(ImageBuildRequest {
                    image: artifact.name.clone(),
                    context_dir: path.parent().map_or_else(PathBuf::new, Path::to_path_buf),
                    dockerfile: path.clone(),
                });
            }
            mark_written(&mut report, &[artifact], written);
        }

        report.transition(GenerationState::Done);
        info!(
            scope = %report.scope,
            emitted = report.count("emitted"),
            skipped = report.count("skipped"),
            write_failed = report.count("write-failed"),
            "Generation complete"
        );
        report
    }

    /// Close a dry run: a generation that did not fail ends in `Done`
    /// without writing anything.
    #[must_use]
    pub fn finish(self) -> GenerationReport {
        let mut report = self.report;
        if !report.is_failed() {
            report.transition(GenerationState::Done);
        }
        report
    }
}

/// Runs every handler for one registry scope.
#[derive(Debug, Clone)]
pub struct GenerationOrchestrator<'a> {
    registry: &'a ModelRegistry,
    naming: &'a ResourceNaming,
    namespace: Option<&'a str>,
    scope: String,
}

impl<'a> GenerationOrchestrator<'a> {
    #[must_use]
    pub fn new(registry: &'a ModelRegistry, naming: &'a ResourceNaming) -> Self {
        Self {
            registry,
            naming,
            namespace: None,
            scope: DEFAULT_SCOPE.to_string(),
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: Option<&'a str>) -> Self {
        self.namespace = namespace;
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Build every artifact of the scope without writing anything.
    #[must_use]
    pub fn generate(&self) -> Generation {
        let mut report = GenerationReport::new(&self.scope);

        let handlers = Handler::collect(self.registry);
        debug!(scope = %self.scope, handlers = handlers.len(), "Collected handlers");

        report.transition(GenerationState::Validating);
        let ctx = HandlerContext {
            registry: self.registry,
            naming: self.naming,
            namespace: self.namespace,
        };
        let mut ledger = NameLedger::new();
        let mut artifacts = Vec::new();
        let mut claimed: HashMap<(ResourceKind, String), &str> = HashMap::new();
        let mut fatal = false;

        for handler in &handlers {
            let declared = handler.entity_name();
            let outcome = handler.run(&ctx, &mut ledger).and_then(|artifact| {
                match claimed.get(&(artifact.kind, artifact.name.clone())) {
                    Some(first) if *first != declared => {
                        Err(GenerationError::Naming(NamingError::Collision {
                            kind: artifact.kind,
                            name: artifact.name.clone(),
                            first: (*first).to_string(),
                            second: declared.to_string(),
                        }))
                    }
                    _ => Ok(artifact),
                }
            });

            match outcome {
                Ok(artifact) => {
                    claimed.insert((artifact.kind, artifact.name.clone()), declared);
                    report.artifacts.push(ArtifactReport {
                        kind: artifact.kind,
                        name: artifact.name.clone(),
                        status: ArtifactStatus::Generated,
                    });
                    artifacts.push(artifact);
                }
                Err(error) if error.is_fatal() => {
                    error!(
                        scope = %self.scope,
                        kind = %handler.kind(),
                        name = declared,
                        error = %error,
                        "Fatal generation error"
                    );
                    fatal = true;
                    report.artifacts.push(ArtifactReport {
                        kind: handler.kind(),
                        name: declared.to_string(),
                        status: ArtifactStatus::Failed { error },
                    });
                }
                Err(error) => {
                    warn!(
                        scope = %self.scope,
                        kind = %handler.kind(),
                        name = declared,
                        error = %error,
                        "Skipping artifact"
                    );
                    report.artifacts.push(ArtifactReport {
                        kind: handler.kind(),
                        name: declared.to_string(),
                        status: ArtifactStatus::Skipped { error },
                    });
                }
            }
        }

        let mut generation = Generation { artifacts, report };
        if fatal {
            generation.discard();
        }
        generation
    }

    /// Generate and emit in one step.
    pub fn run(&self, sink: &mut dyn ArtifactSink) -> GenerationReport {
        self.generate().emit(sink)
    }
}

fn mark_written(
    report: &mut GenerationReport,
    artifacts: &[&GeneratedArtifact],
    written: Result<PathBuf, crate::error::SinkError>,
) {
    match written {
        Ok(path) => {
            for artifact in artifacts {
                report.set_status(
                    artifact.kind,
                    &artifact.name,
                    ArtifactStatus::Emitted { path: path.clone() },
                );
            }
        }
        Err(e) => {
            error!(scope = %report.scope, error = %e, "Failed to write artifact");
            let message = e.to_string();
            for artifact in artifacts {
                report.set_status(
                    artifact.kind,
                    &artifact.name,
                    ArtifactStatus::WriteFailed {
                        message: message.clone(),
                    },
                );
            }
        }
    }
}
