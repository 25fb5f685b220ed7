//! Shared container runtime types

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// A filesystem mount into a sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mount {
    /// Host directory bind-mounted read-write
    Bind { source: PathBuf, target: String },
    /// Named volume mount
    Volume { name: String, target: String },
}

impl Mount {
    /// Render as a `-v` argument
    pub fn to_arg(&self) -> String {
        match self {
            Self::Bind { source, target } => format!("{}:{}", source.display(), target),
            Self::Volume { name, target } => format!("{name}:{target}"),
        }
    }

    /// Whether this is a host bind mount
    pub fn is_bind(&self) -> bool {
        matches!(self, Self::Bind { .. })
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_arg())
    }
}

/// Container configuration for creating a sandbox instance
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Environment image tag to run
    pub image: String,
    /// Working directory inside the container
    pub workdir: String,
    /// Mounts (binds and volumes)
    pub mounts: Vec<Mount>,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Network mode
    pub network: String,
    /// Labels applied to the container
    pub labels: HashMap<String, String>,
    /// Command to run (empty = image entrypoint)
    pub command: Vec<String>,
}

impl ContainerSpec {
    /// Spec running the image's own entrypoint
    pub fn new(image: impl Into<String>, workdir: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            workdir: workdir.into(),
            mounts: Vec::new(),
            env: HashMap::new(),
            network: "none".to_string(),
            labels: HashMap::new(),
            command: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_mount_arg() {
        let mount = Mount::Bind {
            source: PathBuf::from("/home/user/proj"),
            target: "/code".to_string(),
        };
        assert_eq!(mount.to_arg(), "/home/user/proj:/code");
        assert!(mount.is_bind());
    }

    #[test]
    fn volume_mount_arg() {
        let mount = Mount::Volume {
            name: "proj_cache".to_string(),
            target: "/target".to_string(),
        };
        assert_eq!(mount.to_arg(), "proj_cache:/target");
        assert!(!mount.is_bind());
    }

    #[test]
    fn spec_defaults_to_image_entrypoint() {
        let spec = ContainerSpec::new("optimizer-x86_64:0.3.0", "/code");
        assert!(spec.command.is_empty());
        assert_eq!(spec.network, "none");
    }
}
