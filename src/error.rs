//! Error types for Kiln
//!
//! All modules use `KilnResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Kiln operations
pub type KilnResult<T> = Result<T, KilnError>;

/// All errors that can occur in Kiln
#[derive(Error, Debug)]
pub enum KilnError {
    // Runtime environment errors
    #[error("No container runtime found. Install docker or podman and ensure it is on PATH.")]
    RuntimeUnavailable,

    #[error("Unsupported architecture: {0}. Kiln supports x86_64 and arm64.")]
    UnsupportedArch(String),

    // Cache key errors
    #[error("Failed to hash source tree entry {path}: {source}")]
    Hashing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Provisioning errors
    #[error("Build definition not found for {arch}: {path}")]
    DefinitionMissing { path: PathBuf, arch: String },

    #[error("Environment build failed for {image}:\n{diagnostics}")]
    Provision { image: String, diagnostics: String },

    #[error("Environment image no longer exists: {0}")]
    EnvironmentMissing(String),

    // Lock errors
    #[error("Timed out after {waited_secs}s waiting for build lock on {volume}")]
    LockTimeout { volume: String, waited_secs: u64 },

    #[error("Failed to use lock file {path}: {reason}")]
    LockFile { path: PathBuf, reason: String },

    // Sandbox execution errors
    #[error("Optimizer pipeline exited with code {exit_code}:\n{diagnostics}")]
    Execution { exit_code: i32, diagnostics: String },

    #[error("Build cancelled")]
    Cancelled,

    // Volume errors
    #[error("Failed to create cache volume {name}: {reason}")]
    VolumeCreate { name: String, reason: String },

    #[error("Cache volume not found: {0}")]
    VolumeNotFound(String),

    // Artifact errors
    #[error("Incomplete artifact output at {path}: {reason}")]
    IncompleteArtifact { path: PathBuf, reason: String },

    // Codegen errors
    #[error("Protocol binding generation failed ({command}):\n{diagnostics}")]
    Codegen { command: String, diagnostics: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl KilnError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// The component that raised the error, attached to failure reports
    pub fn component(&self) -> &'static str {
        match self {
            Self::Hashing { .. } => "cache-key",
            Self::DefinitionMissing { .. }
            | Self::Provision { .. }
            | Self::UnsupportedArch(_) => "provisioner",
            Self::EnvironmentMissing(_) | Self::Execution { .. } | Self::Cancelled => "sandbox",
            Self::LockTimeout { .. } | Self::LockFile { .. } => "lock",
            Self::VolumeCreate { .. } | Self::VolumeNotFound(_) => "volume-store",
            Self::IncompleteArtifact { .. } => "extractor",
            Self::Codegen { .. } => "codegen",
            Self::ConfigInvalid { .. } | Self::ConfigDirCreate { .. } => "config",
            _ => "engine",
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RuntimeUnavailable => Some("Install docker (https://docs.docker.com) or podman"),
            Self::DefinitionMissing { .. } => {
                Some("Add a Dockerfile.<arch> under the configured definitions directory")
            }
            Self::LockTimeout { .. } => {
                Some("Another build holds the cache lock; wait for it or raise lock_wait_secs")
            }
            Self::VolumeNotFound(_) => Some("Run: kiln cache ls"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = KilnError::RuntimeUnavailable;
        assert!(err.to_string().contains("No container runtime"));
    }

    #[test]
    fn error_hint() {
        let err = KilnError::RuntimeUnavailable;
        assert!(err.hint().unwrap().contains("docker"));
        assert!(KilnError::Cancelled.hint().is_none());
    }

    #[test]
    fn error_component_tags() {
        let err = KilnError::Execution {
            exit_code: 1,
            diagnostics: String::new(),
        };
        assert_eq!(err.component(), "sandbox");

        let err = KilnError::IncompleteArtifact {
            path: PathBuf::from("/out"),
            reason: "empty".to_string(),
        };
        assert_eq!(err.component(), "extractor");

        let err = KilnError::LockTimeout {
            volume: "proj_cache".to_string(),
            waited_secs: 5,
        };
        assert_eq!(err.component(), "lock");
    }

    #[test]
    fn execution_error_carries_diagnostics() {
        let err = KilnError::Execution {
            exit_code: 101,
            diagnostics: "error[E0308]: mismatched types".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("101"));
        assert!(msg.contains("E0308"));
    }
}
