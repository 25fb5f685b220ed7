//! Environment provisioning
//!
//! Ensures the optimizer environment image exists locally, building it from
//! the per-architecture build definition when absent. Provisioning is
//! idempotent and never deletes existing images.

use crate::config::schema::ImageConfig;
use crate::error::{KilnError, KilnResult};
use crate::runtime::ContainerRuntime;
use std::fmt;
use tracing::{debug, info};

/// Target architectures kiln can provision for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    /// 64-bit x86
    X86_64,
    /// 64-bit ARM
    Arm64,
}

impl Arch {
    /// Detect the architecture of the current host
    pub fn detect() -> KilnResult<Self> {
        match std::env::consts::ARCH {
            "x86_64" => Ok(Self::X86_64),
            "aarch64" => Ok(Self::Arm64),
            other => Err(KilnError::UnsupportedArch(other.to_string())),
        }
    }

    /// Canonical name used in image tags and definition file suffixes
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reference to a provisioned environment image
///
/// Never mutated after creation; the underlying image may be rebuilt if it
/// goes missing externally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentHandle {
    /// Image base name
    pub name: String,
    /// Image version
    pub version: String,
    /// Architecture the image targets
    pub arch: Arch,
}

impl EnvironmentHandle {
    /// Create a handle for (name, version, arch)
    pub fn new(name: impl Into<String>, version: impl Into<String>, arch: Arch) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            arch,
        }
    }

    /// Full image tag: `{name}-{arch}:{version}`
    pub fn tag(&self) -> String {
        format!("{}-{}:{}", self.name, self.arch, self.version)
    }
}

impl fmt::Display for EnvironmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Ensures the optimizer environment exists, building it when needed
pub struct Provisioner<'a> {
    runtime: &'a dyn ContainerRuntime,
    config: &'a ImageConfig,
}

impl<'a> Provisioner<'a> {
    /// Create a provisioner over a runtime and image configuration
    pub fn new(runtime: &'a dyn ContainerRuntime, config: &'a ImageConfig) -> Self {
        Self { runtime, config }
    }

    /// Ensure the environment for `arch` exists, building it if absent.
    ///
    /// Returns the handle and whether a build was performed. Calling twice
    /// with an existing match performs no rebuild the second time. Fails
    /// with [`KilnError::DefinitionMissing`] when no build definition exists
    /// for the architecture, or [`KilnError::Provision`] when the underlying
    /// build fails (tool diagnostics attached).
    pub async fn ensure(
        &self,
        arch: Arch,
        force_rebuild: bool,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> KilnResult<(EnvironmentHandle, bool)> {
        let handle = EnvironmentHandle::new(&self.config.name, &self.config.version, arch);
        let tag = handle.tag();

        if !force_rebuild && self.runtime.image_exists(&tag).await? {
            debug!("Environment exists: {}", tag);
            return Ok((handle, false));
        }

        let definition = self
            .config
            .definitions_dir
            .join(format!("Dockerfile.{arch}"));
        if !definition.is_file() {
            return Err(KilnError::DefinitionMissing {
                path: definition,
                arch: arch.to_string(),
            });
        }

        info!("Provisioning environment {}", tag);
        self.runtime
            .build_image(&tag, &definition, &self.config.definitions_dir, on_output)
            .await?;

        Ok((handle, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arch_detect_on_test_host() {
        // Test hosts are x86_64 or aarch64; either way detection succeeds.
        let arch = Arch::detect().unwrap();
        assert!(matches!(arch, Arch::X86_64 | Arch::Arm64));
    }

    #[test]
    fn handle_tag_format() {
        let handle = EnvironmentHandle::new("optimizer", "0.3.0", Arch::X86_64);
        assert_eq!(handle.tag(), "optimizer-x86_64:0.3.0");

        let handle = EnvironmentHandle::new("optimizer", "0.3.0", Arch::Arm64);
        assert_eq!(handle.tag(), "optimizer-arm64:0.3.0");
    }

    #[test]
    fn definition_suffix_matches_arch() {
        assert_eq!(Arch::X86_64.as_str(), "x86_64");
        assert_eq!(Arch::Arm64.as_str(), "arm64");
    }
}
