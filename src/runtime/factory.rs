//! Runtime factory
//!
//! Picks the container runtime binary: an explicitly configured one wins,
//! otherwise docker then podman, whichever answers `--version`.

use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use crate::runtime::cli::CliRuntime;
use crate::runtime::runtime::ContainerRuntime;
use tracing::debug;

/// Create a container runtime for this system
pub async fn create_runtime(config: &Config) -> KilnResult<Box<dyn ContainerRuntime>> {
    if let Some(ref binary) = config.runtime.binary {
        let runtime = match binary.as_str() {
            "docker" => CliRuntime::docker(),
            "podman" => CliRuntime::podman(),
            other => {
                return Err(KilnError::command_exec(
                    other.to_string(),
                    "runtime.binary must be \"docker\" or \"podman\"",
                ))
            }
        };
        if !runtime.is_available().await? {
            return Err(KilnError::RuntimeUnavailable);
        }
        debug!("Using configured runtime: {}", runtime.runtime_name());
        return Ok(Box::new(runtime));
    }

    for runtime in [CliRuntime::docker(), CliRuntime::podman()] {
        if runtime.is_available().await? {
            debug!("Detected runtime: {}", runtime.runtime_name());
            return Ok(Box::new(runtime));
        }
    }

    Err(KilnError::RuntimeUnavailable)
}
