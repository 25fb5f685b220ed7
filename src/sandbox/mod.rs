//! Sandbox execution
//!
//! Runs the opaque optimizer pipeline inside an isolated container with
//! controlled mounts, serialized per cache-output volume by the build lock.
//! Two modes exist: `mounted` bind-mounts the source tree directly, `copy`
//! copies source into the container's writable layer for hosts where bind
//! mounts are forbidden (volume mounts remain permitted in both).

use crate::cache::lock::{BuildLock, BuildLockGuard};
use crate::cache::volume::CacheVolume;
use crate::cancel::CancelToken;
use crate::config::schema::{CacheConfig, SandboxConfig};
use crate::error::{KilnError, KilnResult};
use crate::provision::{Arch, EnvironmentHandle};
use crate::runtime::{ContainerRuntime, ContainerSpec, Mount};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Container label marking kiln sandbox runs
pub const RUN_LABEL: &str = "io.kiln.run";

/// Workflow mode, fixed at request construction
#[derive(Debug, Clone)]
pub enum BuildMode {
    /// Source bind-mounted read-write into the sandbox
    Mounted(MountPlan),
    /// Source copied into the sandbox's writable layer; output copied back out
    Copy(CopyPlan),
}

impl BuildMode {
    /// Mounted-mode plan from sandbox configuration
    pub fn mounted(config: &SandboxConfig) -> Self {
        Self::Mounted(MountPlan {
            workdir: config.workdir.clone(),
            output_cache_target: config.output_cache_target.clone(),
            registry_cache_target: config.registry_cache_target.clone(),
            output_dir: config.output_dir.clone(),
        })
    }

    /// Copy-mode plan from sandbox configuration and a host destination
    pub fn copy(config: &SandboxConfig, dest: PathBuf) -> Self {
        Self::Copy(CopyPlan {
            workdir: config.workdir.clone(),
            output_cache_target: config.output_cache_target.clone(),
            registry_cache_target: config.registry_cache_target.clone(),
            output_dir: config.output_dir.clone(),
            dest,
        })
    }

    /// The mode discriminant
    pub fn kind(&self) -> ModeKind {
        match self {
            Self::Mounted(_) => ModeKind::Mounted,
            Self::Copy(_) => ModeKind::Copy,
        }
    }
}

/// Mode discriminant for display and dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    /// Bind-mount workflow
    Mounted,
    /// Copy-in/copy-out workflow
    Copy,
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mounted => write!(f, "mounted"),
            Self::Copy => write!(f, "copy"),
        }
    }
}

/// Mount configuration for the bind-mount workflow
#[derive(Debug, Clone)]
pub struct MountPlan {
    /// Where the source tree is mounted inside the sandbox
    pub workdir: String,
    /// Build-output cache volume target
    pub output_cache_target: String,
    /// Dependency-registry cache volume target
    pub registry_cache_target: String,
    /// Output directory the pipeline writes, relative to workdir
    pub output_dir: String,
}

/// Copy configuration for the copy-in/copy-out workflow
#[derive(Debug, Clone)]
pub struct CopyPlan {
    /// Where the source tree is copied inside the sandbox
    pub workdir: String,
    /// Build-output cache volume target
    pub output_cache_target: String,
    /// Dependency-registry cache volume target
    pub registry_cache_target: String,
    /// Output directory the pipeline writes, relative to workdir
    pub output_dir: String,
    /// Host directory artifacts are extracted to
    pub dest: PathBuf,
}

/// One build invocation, immutable once constructed
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Canonicalized source tree root
    pub source_root: PathBuf,
    /// Project basename, used for volume naming
    pub project: String,
    /// Target architecture
    pub arch: Arch,
    /// Workflow mode
    pub mode: BuildMode,
}

impl BuildRequest {
    /// Build a request for a source tree.
    ///
    /// Canonicalizes the path and derives the project basename.
    pub fn new(source_root: &Path, arch: Arch, mode: BuildMode) -> KilnResult<Self> {
        let source_root = source_root
            .canonicalize()
            .map_err(|e| KilnError::io(format!("resolving {}", source_root.display()), e))?;

        let project = source_root
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| KilnError::PathNotFound(source_root.clone()))?;

        Ok(Self {
            source_root,
            project,
            arch,
            mode,
        })
    }
}

/// Where a run's output lives after the entrypoint completes
#[derive(Debug, Clone)]
pub enum OutputLocation {
    /// Already on the host (mounted mode, via the bind mount)
    Host(PathBuf),
    /// Still inside the sandbox filesystem (copy mode, pending extraction)
    Container { id: String, path: String },
}

/// One sandbox execution instance.
///
/// Holds the build lock until dropped; the ephemeral container (if still
/// present) must be torn down via [`SandboxRun::teardown`] before the run is
/// discarded. Named volumes always persist.
pub struct SandboxRun {
    /// Unique run id
    pub run_id: Uuid,
    /// Workflow mode discriminant
    pub mode: ModeKind,
    /// Where the pipeline's output lives
    pub output: OutputLocation,
    container_id: Option<String>,
    _lock: BuildLockGuard,
}

impl SandboxRun {
    /// Remove the run's ephemeral container state, if any.
    ///
    /// Idempotent; named cache volumes are never touched.
    pub async fn teardown(&mut self, runtime: &dyn ContainerRuntime) -> KilnResult<()> {
        if let Some(id) = self.container_id.take() {
            runtime.remove_container(&id).await?;
            debug!("Sandbox torn down: {}", &id[..12.min(id.len())]);
        }
        Ok(())
    }
}

/// Executes the opaque pipeline inside a sandbox
pub struct SandboxExecutor<'a> {
    runtime: &'a dyn ContainerRuntime,
    sandbox: &'a SandboxConfig,
    locks_dir: PathBuf,
    lock_wait: Option<Duration>,
    lock_poll: Duration,
}

impl<'a> SandboxExecutor<'a> {
    /// Create an executor over a runtime and configuration
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        sandbox: &'a SandboxConfig,
        cache: &CacheConfig,
        locks_dir: PathBuf,
    ) -> Self {
        let lock_wait = match cache.lock_wait_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            runtime,
            sandbox,
            locks_dir,
            lock_wait,
            lock_poll: Duration::from_millis(cache.lock_poll_ms.max(1)),
        }
    }

    /// Run the pipeline for a request.
    ///
    /// Acquires the execution lock scoped to the build-output volume before
    /// starting; the returned [`SandboxRun`] keeps holding it. On any
    /// failure the ephemeral container is removed and the lock released as
    /// the error propagates.
    pub async fn run(
        &self,
        request: &BuildRequest,
        env: &EnvironmentHandle,
        output_volume: &CacheVolume,
        registry_volume: &CacheVolume,
        cancel: &CancelToken,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> KilnResult<SandboxRun> {
        let tag = env.tag();
        if !self.runtime.image_exists(&tag).await? {
            return Err(KilnError::EnvironmentMissing(tag));
        }

        let lock = BuildLock::for_volume(&self.locks_dir, &output_volume.name);
        let guard = lock.acquire(self.lock_wait, self.lock_poll, cancel).await?;
        info!(
            "Build lock held on {}; executing in {} mode",
            output_volume.name,
            request.mode.kind()
        );

        let run_id = Uuid::new_v4();
        let spec = self.container_spec(request, &tag, output_volume, registry_volume, run_id);

        let container_id = self.runtime.create_container(&spec).await?;

        if let BuildMode::Copy(_) = request.mode {
            if let Err(e) = self
                .runtime
                .copy_into(&container_id, &request.source_root, &spec.workdir)
                .await
            {
                self.best_effort_remove(&container_id).await;
                return Err(e);
            }
        }

        let status = tokio::select! {
            status = self.runtime.start_container(&container_id, on_output) => status,
            _ = cancel.cancelled() => {
                warn!("Build cancelled; tearing down sandbox");
                if let Err(e) = self.runtime.kill_container(&container_id).await {
                    debug!("Kill after cancel failed: {e}");
                }
                self.best_effort_remove(&container_id).await;
                return Err(KilnError::Cancelled);
            }
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                self.best_effort_remove(&container_id).await;
                return Err(e);
            }
        };

        if !status.success() {
            self.best_effort_remove(&container_id).await;
            return Err(KilnError::Execution {
                exit_code: status.exit_code,
                diagnostics: status.output_tail,
            });
        }

        match &request.mode {
            BuildMode::Mounted(plan) => {
                // Artifacts already materialized on the host via the bind mount.
                self.runtime.remove_container(&container_id).await?;
                Ok(SandboxRun {
                    run_id,
                    mode: ModeKind::Mounted,
                    output: OutputLocation::Host(request.source_root.join(&plan.output_dir)),
                    container_id: None,
                    _lock: guard,
                })
            }
            BuildMode::Copy(plan) => Ok(SandboxRun {
                run_id,
                mode: ModeKind::Copy,
                output: OutputLocation::Container {
                    id: container_id.clone(),
                    path: format!("{}/{}", plan.workdir, plan.output_dir),
                },
                container_id: Some(container_id),
                _lock: guard,
            }),
        }
    }

    fn container_spec(
        &self,
        request: &BuildRequest,
        tag: &str,
        output_volume: &CacheVolume,
        registry_volume: &CacheVolume,
        run_id: Uuid,
    ) -> ContainerSpec {
        let mut labels = HashMap::new();
        labels.insert(RUN_LABEL.to_string(), run_id.to_string());

        let (workdir, mounts) = match &request.mode {
            BuildMode::Mounted(plan) => (
                plan.workdir.clone(),
                vec![
                    Mount::Bind {
                        source: request.source_root.clone(),
                        target: plan.workdir.clone(),
                    },
                    output_volume.mount(&plan.output_cache_target),
                    registry_volume.mount(&plan.registry_cache_target),
                ],
            ),
            BuildMode::Copy(plan) => (
                plan.workdir.clone(),
                vec![
                    output_volume.mount(&plan.output_cache_target),
                    registry_volume.mount(&plan.registry_cache_target),
                ],
            ),
        };

        ContainerSpec {
            image: tag.to_string(),
            workdir,
            mounts,
            env: self.sandbox.env.clone(),
            network: self.sandbox.network.clone(),
            labels,
            command: Vec::new(),
        }
    }

    async fn best_effort_remove(&self, container_id: &str) {
        if let Err(e) = self.runtime.remove_container(container_id).await {
            warn!("Failed to remove sandbox container {container_id}: {e}");
        }
    }
}
