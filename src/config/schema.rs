//! Configuration schema for Kiln
//!
//! Configuration is stored at `~/.config/kiln/config.toml`

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Container runtime settings
    pub runtime: RuntimeConfig,

    /// Optimizer environment image settings
    pub image: ImageConfig,

    /// Sandbox mount and execution settings
    pub sandbox: SandboxConfig,

    /// Cache volume and lock settings
    pub cache: CacheConfig,

    /// Protocol binding generation settings
    pub codegen: CodegenConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Container runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runtime binary to use ("docker" or "podman"); auto-detected when unset
    pub binary: Option<String>,
}

/// Optimizer environment image configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Image base name; the full tag is `{name}-{arch}:{version}`
    pub name: String,

    /// Image version
    pub version: String,

    /// Directory holding per-architecture build definitions
    /// (`Dockerfile.x86_64`, `Dockerfile.arm64`)
    pub definitions_dir: PathBuf,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            name: "optimizer".to_string(),
            version: "0.3.0".to_string(),
            definitions_dir: PathBuf::from("docker"),
        }
    }
}

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Working directory inside the sandbox where source lives
    pub workdir: String,

    /// Output directory the pipeline writes artifacts to, relative to workdir
    pub output_dir: String,

    /// Mount target for the build-output cache volume
    pub output_cache_target: String,

    /// Mount target for the dependency-registry cache volume
    pub registry_cache_target: String,

    /// Network mode for the sandbox
    pub network: String,

    /// Environment variables passed to the pipeline
    pub env: HashMap<String, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            workdir: "/code".to_string(),
            output_dir: "artifacts".to_string(),
            output_cache_target: "/target".to_string(),
            registry_cache_target: "/usr/local/cargo/registry".to_string(),
            network: "none".to_string(),
            env: HashMap::new(),
        }
    }
}

/// Cache volume and lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name of the global dependency-registry volume, shared across projects
    pub registry_volume: String,

    /// Suffix appended to the project basename for the build-output volume
    pub output_volume_suffix: String,

    /// Seconds to wait for the build lock (0 = wait indefinitely)
    pub lock_wait_secs: u64,

    /// Lock acquisition poll interval in milliseconds
    pub lock_poll_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            registry_volume: "registry_cache".to_string(),
            output_volume_suffix: "_cache".to_string(),
            lock_wait_secs: 0,
            lock_poll_ms: 250,
        }
    }
}

/// Protocol binding generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenConfig {
    /// Generator command to invoke
    pub command: String,

    /// Arguments passed to the generator
    pub args: Vec<String>,

    /// Directory the generator writes into, relative to the spec directory
    pub out_dir: PathBuf,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            command: "buf".to_string(),
            args: vec!["generate".to_string()],
            out_dir: PathBuf::from("src/gen"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[sandbox]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.image.name, "optimizer");
        assert_eq!(config.cache.registry_volume, "registry_cache");
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [image]
            name = "shrinker"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.image.name, "shrinker");
        assert_eq!(config.sandbox.workdir, "/code"); // default preserved
    }

    #[test]
    fn lock_wait_zero_means_indefinite() {
        let config = Config::default();
        assert_eq!(config.cache.lock_wait_secs, 0);
    }
}
