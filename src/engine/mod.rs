//! Build orchestration
//!
//! Composes the cache-key deriver, provisioner, volume store, sandbox
//! executor, and artifact extractor into one sequential pipeline per
//! invocation:
//!
//! ```text
//! start -> provision -> acquire-lock -> execute -> extract -> release-lock -> done
//! ```
//!
//! `failed` is reachable from every state; when the lock is held, release
//! always happens before the failure surfaces (the lock guard lives inside
//! the run and drops as the error propagates).

use crate::artifact::{Artifact, ArtifactExtractor};
use crate::cache::key::{self, CacheKey};
use crate::cache::volume::{VolumeKind, VolumeStore};
use crate::cancel::CancelToken;
use crate::config::{Config, ConfigManager};
use crate::error::KilnResult;
use crate::provision::{EnvironmentHandle, Provisioner};
use crate::runtime::ContainerRuntime;
use crate::sandbox::{BuildMode, BuildRequest, SandboxExecutor};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Orchestrator states, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Start,
    Provision,
    AcquireLock,
    Execute,
    Extract,
    ReleaseLock,
    Done,
    Failed,
}

impl BuildPhase {
    /// Stable lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Provision => "provision",
            Self::AcquireLock => "acquire-lock",
            Self::Execute => "execute",
            Self::Extract => "extract",
            Self::ReleaseLock => "release-lock",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a successful build
#[derive(Debug)]
pub struct BuildReport {
    /// Cache key derived for this invocation
    pub cache_key: CacheKey,
    /// Environment image used
    pub image: String,
    /// Whether the environment was built (false = fast path)
    pub provisioned: bool,
    /// Verified output artifacts
    pub artifacts: Vec<Artifact>,
    /// Wall-clock build duration
    pub duration: Duration,
}

/// Composes all components into the build workflows
pub struct BuildEngine<'a> {
    runtime: &'a dyn ContainerRuntime,
    config: &'a Config,
    locks_dir: PathBuf,
}

impl<'a> BuildEngine<'a> {
    /// Engine over a runtime and configuration, locks in the state dir
    pub fn new(runtime: &'a dyn ContainerRuntime, config: &'a Config) -> Self {
        Self::with_locks_dir(runtime, config, ConfigManager::locks_dir())
    }

    /// Engine with an explicit lock directory
    pub fn with_locks_dir(
        runtime: &'a dyn ContainerRuntime,
        config: &'a Config,
        locks_dir: PathBuf,
    ) -> Self {
        Self {
            runtime,
            config,
            locks_dir,
        }
    }

    /// Ensure the optimizer environment exists (the `provision` surface)
    pub async fn provision(
        &self,
        force_rebuild: bool,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> KilnResult<(EnvironmentHandle, bool)> {
        let arch = crate::provision::Arch::detect()?;
        Provisioner::new(self.runtime, &self.config.image)
            .ensure(arch, force_rebuild, on_output)
            .await
    }

    /// Run one build invocation to completion.
    ///
    /// On success the report carries the verified artifact set; on failure
    /// the error is tagged with the originating component and any held lock
    /// has already been released.
    pub async fn build(
        &self,
        request: &BuildRequest,
        cancel: &CancelToken,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> KilnResult<BuildReport> {
        let started = Instant::now();
        match self.build_inner(request, started, cancel, on_output).await {
            Ok(report) => {
                self.transition(BuildPhase::ReleaseLock, BuildPhase::Done);
                info!(
                    "Build done in {:.1}s: {} artifact(s), cache key {}",
                    report.duration.as_secs_f64(),
                    report.artifacts.len(),
                    report.cache_key
                );
                Ok(report)
            }
            Err(err) => {
                error!(component = err.component(), "Build failed: {err}");
                self.transition(BuildPhase::Failed, BuildPhase::Failed);
                Err(err)
            }
        }
    }

    async fn build_inner(
        &self,
        request: &BuildRequest,
        started: Instant,
        cancel: &CancelToken,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> KilnResult<BuildReport> {
        self.transition(BuildPhase::Start, BuildPhase::Provision);
        let cache_key = key::derive(
            &request.source_root,
            request.arch.as_str(),
            &self.config.image.version,
        )?;
        debug!("Cache key for {}: {}", request.project, cache_key);

        let provisioner = Provisioner::new(self.runtime, &self.config.image);
        let (env, provisioned) = provisioner.ensure(request.arch, false, on_output).await?;
        if !provisioned {
            debug!("Provision skipped, environment {} exists", env.tag());
        }

        let store = VolumeStore::new(self.runtime, &self.config.cache);
        let output_volume = store.resolve(&request.project, VolumeKind::BuildOutput).await?;
        let registry_volume = store.resolve(&request.project, VolumeKind::Registry).await?;

        self.transition(BuildPhase::Provision, BuildPhase::AcquireLock);
        let executor = SandboxExecutor::new(
            self.runtime,
            &self.config.sandbox,
            &self.config.cache,
            self.locks_dir.clone(),
        );
        self.transition(BuildPhase::AcquireLock, BuildPhase::Execute);
        let mut run = executor
            .run(
                request,
                &env,
                &output_volume,
                &registry_volume,
                cancel,
                on_output,
            )
            .await?;

        self.transition(BuildPhase::Execute, BuildPhase::Extract);
        let dest = match &request.mode {
            BuildMode::Copy(plan) => plan.dest.clone(),
            BuildMode::Mounted(plan) => request.source_root.join(&plan.output_dir),
        };
        let extractor = ArtifactExtractor::new(self.runtime);
        let artifacts = match extractor.extract(&run, &dest).await {
            Ok(artifacts) => artifacts,
            Err(err) => {
                // Teardown before the lock is released by the run dropping.
                let _ = run.teardown(self.runtime).await;
                return Err(err);
            }
        };

        self.transition(BuildPhase::Extract, BuildPhase::ReleaseLock);
        run.teardown(self.runtime).await?;
        drop(run);

        Ok(BuildReport {
            cache_key,
            image: env.tag(),
            provisioned,
            artifacts,
            duration: started.elapsed(),
        })
    }

    fn transition(&self, from: BuildPhase, to: BuildPhase) {
        debug!(from = from.as_str(), to = to.as_str(), "phase");
    }
}
