//! Named persistent cache volumes
//!
//! Two volume kinds exist: a per-project build-output volume
//! (`{project}_cache`) and a single dependency-registry volume
//! (`registry_cache`) shared across all projects. Volume identity never
//! embeds a source-content hash, so volumes are reused across source
//! changes; the deterministic pipeline re-reads current source each run.

use crate::config::schema::CacheConfig;
use crate::error::{KilnError, KilnResult};
use crate::runtime::{ContainerRuntime, Mount};
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Volume label keys used to track cache metadata
pub mod labels {
    /// Marks volume as a kiln cache
    pub const KILN_CACHE: &str = "io.kiln.cache";
    /// The volume kind (build-output, dependency-registry)
    pub const KIND: &str = "io.kiln.cache.kind";
    /// Owning project basename (build-output volumes only)
    pub const PROJECT: &str = "io.kiln.cache.project";
    /// Creation timestamp (RFC3339)
    pub const CREATED_AT: &str = "io.kiln.cache.created_at";
}

/// The two recognized cache volume kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeKind {
    /// Per-project compilation output cache
    BuildOutput,
    /// Global dependency registry, shared across projects
    Registry,
}

impl fmt::Display for VolumeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildOutput => write!(f, "build-output"),
            Self::Registry => write!(f, "dependency-registry"),
        }
    }
}

/// A named persistent cache volume
#[derive(Debug, Clone)]
pub struct CacheVolume {
    /// Volume name as known to the container runtime
    pub name: String,
    /// What the volume caches
    pub kind: VolumeKind,
}

impl CacheVolume {
    /// Mount specification targeting `target` inside the sandbox
    pub fn mount(&self, target: &str) -> Mount {
        Mount::Volume {
            name: self.name.clone(),
            target: target.to_string(),
        }
    }

    /// Labels applied at volume creation
    pub fn creation_labels(&self, project: Option<&str>) -> HashMap<String, String> {
        let mut out = HashMap::new();
        out.insert(labels::KILN_CACHE.to_string(), "true".to_string());
        out.insert(labels::KIND.to_string(), self.kind.to_string());
        if let Some(project) = project {
            out.insert(labels::PROJECT.to_string(), project.to_string());
        }
        out.insert(labels::CREATED_AT.to_string(), Utc::now().to_rfc3339());
        out
    }
}

/// Resolves and lazily creates cache volumes through the container runtime
pub struct VolumeStore<'a> {
    runtime: &'a dyn ContainerRuntime,
    config: &'a CacheConfig,
}

impl<'a> VolumeStore<'a> {
    /// Create a store over a runtime and cache configuration
    pub fn new(runtime: &'a dyn ContainerRuntime, config: &'a CacheConfig) -> Self {
        Self { runtime, config }
    }

    /// Deterministic volume name for (project, kind)
    pub fn volume_name(&self, project: &str, kind: VolumeKind) -> String {
        match kind {
            VolumeKind::BuildOutput => {
                format!("{}{}", project, self.config.output_volume_suffix)
            }
            VolumeKind::Registry => self.config.registry_volume.clone(),
        }
    }

    /// Resolve a volume, creating it on first reference.
    ///
    /// Creation is safe under concurrent first use: losing a create race to
    /// another invocation is success as long as the volume exists afterwards.
    /// Volumes are never deleted here.
    pub async fn resolve(&self, project: &str, kind: VolumeKind) -> KilnResult<CacheVolume> {
        let volume = CacheVolume {
            name: self.volume_name(project, kind),
            kind,
        };

        if self.runtime.volume_exists(&volume.name).await? {
            debug!("Cache volume exists: {}", volume.name);
            return Ok(volume);
        }

        let project_label = match kind {
            VolumeKind::BuildOutput => Some(project),
            VolumeKind::Registry => None,
        };

        match self
            .runtime
            .volume_create(&volume.name, &volume.creation_labels(project_label))
            .await
        {
            Ok(()) => {
                info!("Created {} cache volume: {}", kind, volume.name);
                Ok(volume)
            }
            // Lost a concurrent first-use race; the volume existing is what matters.
            Err(create_err) => {
                if self.runtime.volume_exists(&volume.name).await? {
                    debug!("Cache volume appeared concurrently: {}", volume.name);
                    Ok(volume)
                } else {
                    Err(match create_err {
                        err @ KilnError::VolumeCreate { .. } => err,
                        other => KilnError::VolumeCreate {
                            name: volume.name,
                            reason: other.to_string(),
                        },
                    })
                }
            }
        }
    }
}
