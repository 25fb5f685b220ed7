//! Abstract container runtime interface

use crate::error::KilnResult;
use crate::runtime::types::ContainerSpec;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

/// Exit report from a completed container run
#[derive(Debug, Clone)]
pub struct RunStatus {
    /// Entrypoint exit code (-1 when terminated by signal)
    pub exit_code: i32,
    /// Bounded tail of combined stdout/stderr for diagnostics
    pub output_tail: String,
}

impl RunStatus {
    /// Whether the entrypoint exited cleanly
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Information about a named volume
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    /// Volume name
    pub name: String,
}

/// Abstract container runtime interface
///
/// Implemented by [`crate::runtime::CliRuntime`] for docker and podman; the
/// engine only ever talks to this trait, which keeps sandbox and volume
/// logic testable without a daemon.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check if the runtime is available on this system
    async fn is_available(&self) -> KilnResult<bool>;

    /// Whether an image with this tag exists locally
    async fn image_exists(&self, tag: &str) -> KilnResult<bool>;

    /// Build an image from a build-definition file, tagging it on success.
    /// Build output lines are streamed through `on_output`.
    async fn build_image(
        &self,
        tag: &str,
        definition: &Path,
        context: &Path,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> KilnResult<()>;

    /// Whether a named volume exists
    async fn volume_exists(&self, name: &str) -> KilnResult<bool>;

    /// Create a named volume with labels
    async fn volume_create(&self, name: &str, labels: &HashMap<String, String>) -> KilnResult<()>;

    /// List volumes carrying the given label
    async fn volume_list(&self, label: &str) -> KilnResult<Vec<VolumeInfo>>;

    /// Remove a named volume
    async fn volume_remove(&self, name: &str) -> KilnResult<()>;

    /// Create a container (not started), returning its ID
    async fn create_container(&self, spec: &ContainerSpec) -> KilnResult<String>;

    /// Start a created container attached, streaming output, and wait for exit
    async fn start_container(
        &self,
        id: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> KilnResult<RunStatus>;

    /// Kill a running container immediately
    async fn kill_container(&self, id: &str) -> KilnResult<()>;

    /// Remove a container (force; absent containers are not an error)
    async fn remove_container(&self, id: &str) -> KilnResult<()>;

    /// Copy the contents of a host directory into a container path
    async fn copy_into(&self, id: &str, source: &Path, dest: &str) -> KilnResult<()>;

    /// Copy the contents of a container path out to a host directory
    async fn copy_out(&self, id: &str, source: &str, dest: &Path) -> KilnResult<()>;

    /// Human-readable runtime name for display
    fn runtime_name(&self) -> &'static str;
}
