//! Artifact persistence.
//!
//! Layout under the output root:
//!
//! ```text
//! kubernetes/<group>/<group>.yaml   multi-document manifest
//! docker/<group>/Dockerfile
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SinkError;
use crate::handlers::GeneratedArtifact;
use crate::naming::ResourceKind;

const KUBERNETES_DIR: &str = "kubernetes";
const DOCKER_DIR: &str = "docker";
const DOCUMENT_SEPARATOR: &str = "---\n";

/// Document order inside a group manifest.
const MANIFEST_ORDER: [ResourceKind; 6] = [
    ResourceKind::Secret,
    ResourceKind::ConfigMap,
    ResourceKind::Deployment,
    ResourceKind::Job,
    ResourceKind::Service,
    ResourceKind::HorizontalPodAutoscaler,
];

/// Relative output paths for a group.
pub struct OutputLayout;

impl OutputLayout {
    #[must_use]
    pub fn manifest(group: &str) -> PathBuf {
        Path::new(KUBERNETES_DIR).join(group).join(format!("{group}.yaml"))
    }

    #[must_use]
    pub fn dockerfile(group: &str) -> PathBuf {
        Path::new(DOCKER_DIR).join(group).join("Dockerfile")
    }
}

/// Destination for rendered artifacts.
pub trait ArtifactSink {
    /// Write `contents` to `relative` and return the final location.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the file cannot be written.
    fn write_file(&mut self, relative: &Path, contents: &str) -> Result<PathBuf, SinkError>;
}

/// Writes artifacts below a root directory. Files are written to a sibling
/// temp file and renamed into place, so readers never see partial output.
#[derive(Debug, Clone)]
pub struct FileSystemSink {
    root: PathBuf,
}

impl FileSystemSink {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactSink for FileSystemSink {
    fn write_file(&mut self, relative: &Path, contents: &str) -> Result<PathBuf, SinkError> {
        let path = self.root.join(relative);
        let io_err = |source| SinkError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = path.with_extension("tmp");
        let file = fs::File::create(&tmp).map_err(io_err)?;
        if let Err(e) = write_contents(file, contents).and_then(|()| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }

        debug!(path = %path.display(), bytes = contents.len(), "Wrote artifact");
        Ok(path)
    }
}

fn write_contents(file: fs::File, contents: &str) -> std::io::Result<()> {
    let mut writer = BufWriter::new(file);
    writer.write_all(contents.as_bytes())?;
    writer.flush()
}

/// Keeps written files in memory. Used for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    files: BTreeMap<PathBuf, String>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn files(&self) -> &BTreeMap<PathBuf, String> {
        &self.files
    }

    #[must_use]
    pub fn get(&self, relative: impl AsRef<Path>) -> Option<&str> {
        self.files.get(relative.as_ref()).map(String::as_str)
    }
}

impl ArtifactSink for MemorySink {
    fn write_file(&mut self, relative: &Path, contents: &str) -> Result<PathBuf, SinkError> {
        self.files.insert(relative.to_path_buf(), contents.to_string());
        Ok(relative.to_path_buf())
    }
}

/// Encode the Kubernetes artifacts of one group as a multi-document YAML
/// manifest. Dockerfiles in `artifacts` are ignored.
///
/// # Errors
///
/// Returns [`SinkError::Encode`] if an object cannot be serialized.
pub fn render_manifest<'a, I>(artifacts: I) -> Result<String, SinkError>
where
    I: IntoIterator<Item = &'a GeneratedArtifact>,
{
    let mut ordered: Vec<&GeneratedArtifact> = artifacts
        .into_iter()
        .filter(|a| MANIFEST_ORDER.contains(&a.kind))
        .collect();
    ordered.sort_by_key(|a| {
        (
            MANIFEST_ORDER.iter().position(|k| *k == a.kind),
            a.name.clone(),
        )
    });

    let documents = ordered
        .into_iter()
        .map(|artifact| {
            artifact.resource.to_yaml().map_err(|source| SinkError::Encode {
                name: artifact.name.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(documents.join(DOCUMENT_SEPARATOR))
}
