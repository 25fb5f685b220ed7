//! Artifact extraction and verification
//!
//! In mounted mode artifacts are already on the host via the bind mount, so
//! extraction is a verification pass. In copy mode the output directory is
//! copied out of the sandbox filesystem and verified afterwards; a failure
//! mid-copy is caught by the post-copy check, never reported as success.

use crate::error::{KilnError, KilnResult};
use crate::runtime::ContainerRuntime;
use crate::sandbox::{OutputLocation, SandboxRun};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// A produced, verified output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Host path of the artifact
    pub path: PathBuf,
    /// Size in bytes (always non-zero)
    pub size_bytes: u64,
}

/// Copies run output to the caller and verifies completeness
pub struct ArtifactExtractor<'a> {
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> ArtifactExtractor<'a> {
    /// Create an extractor over a runtime
    pub fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Extract (copy mode) or verify (mounted mode) a run's artifacts.
    ///
    /// `dest` is where copy-mode output lands; mounted-mode output is
    /// verified in place. Fails with [`KilnError::IncompleteArtifact`] when
    /// the output location holds no non-empty files.
    pub async fn extract(&self, run: &SandboxRun, dest: &Path) -> KilnResult<Vec<Artifact>> {
        match &run.output {
            OutputLocation::Host(path) => {
                debug!("Verifying in-place artifacts at {}", path.display());
                collect_artifacts(path)
            }
            OutputLocation::Container { id, path } => {
                tokio::fs::create_dir_all(dest)
                    .await
                    .map_err(|e| KilnError::io(format!("creating {}", dest.display()), e))?;

                self.runtime.copy_out(id, path, dest).await?;

                let artifacts = collect_artifacts(dest)?;
                info!(
                    "Extracted {} artifact(s) to {}",
                    artifacts.len(),
                    dest.display()
                );
                Ok(artifacts)
            }
        }
    }
}

/// Walk an output directory and report its non-empty files.
///
/// An absent directory, an empty directory, or a directory holding only
/// zero-byte files all fail verification.
pub fn collect_artifacts(dir: &Path) -> KilnResult<Vec<Artifact>> {
    if !dir.is_dir() {
        return Err(KilnError::IncompleteArtifact {
            path: dir.to_path_buf(),
            reason: "output directory missing".to_string(),
        });
    }

    let mut artifacts = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| KilnError::IncompleteArtifact {
            path: dir.to_path_buf(),
            reason: format!("unreadable output: {e}"),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry.metadata().map_err(|e| KilnError::IncompleteArtifact {
            path: entry.path().to_path_buf(),
            reason: format!("unreadable metadata: {e}"),
        })?;
        if metadata.len() > 0 {
            artifacts.push(Artifact {
                path: entry.path().to_path_buf(),
                size_bytes: metadata.len(),
            });
        }
    }

    if artifacts.is_empty() {
        return Err(KilnError::IncompleteArtifact {
            path: dir.to_path_buf(),
            reason: "no non-empty output files produced".to_string(),
        });
    }

    Ok(artifacts)
}


/// Format bytes as human-readable size (e.g., "1.5 MB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
