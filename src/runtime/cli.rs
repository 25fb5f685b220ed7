//! CLI-driven container runtime
//!
//! Drives docker or podman through their (compatible) command-line
//! interfaces. All state-changing calls capture stderr so failures surface
//! the underlying tool's diagnostics verbatim.

use crate::error::{KilnError, KilnResult};
use crate::runtime::runtime::{ContainerRuntime, RunStatus, VolumeInfo};
use crate::runtime::types::ContainerSpec;
use crate::runtime::{output_tail, stream_child_output};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Container runtime backed by the docker or podman CLI
pub struct CliRuntime {
    binary: String,
    name: &'static str,
}

impl CliRuntime {
    /// Runtime over the docker CLI
    pub fn docker() -> Self {
        Self {
            binary: "docker".to_string(),
            name: "Docker",
        }
    }

    /// Runtime over the podman CLI
    pub fn podman() -> Self {
        Self {
            binary: "podman".to_string(),
            name: "Podman",
        }
    }

    /// The binary this runtime shells out to
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Execute a runtime command and return the output
    async fn exec(&self, args: &[&str]) -> KilnResult<std::process::Output> {
        debug!("Executing: {} {:?}", self.binary, args);

        Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| KilnError::command_failed(format!("{} {:?}", self.binary, args), e))
    }

    /// Spawn a runtime command with piped output for streaming
    fn spawn(&self, args: &[&str]) -> KilnResult<tokio::process::Child> {
        debug!("Spawning: {} {:?}", self.binary, args);

        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| KilnError::command_failed(format!("{} {:?}", self.binary, args), e))
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn is_available(&self) -> KilnResult<bool> {
        let status = Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        Ok(status.map(|s| s.success()).unwrap_or(false))
    }

    async fn image_exists(&self, tag: &str) -> KilnResult<bool> {
        let output = self.exec(&["image", "inspect", tag]).await?;
        Ok(output.status.success())
    }

    async fn build_image(
        &self,
        tag: &str,
        definition: &Path,
        context: &Path,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> KilnResult<()> {
        info!("Building image {} from {}", tag, definition.display());

        let definition = definition.display().to_string();
        let context = context.display().to_string();
        let mut child = self.spawn(&["build", "-f", &definition, "-t", tag, &context])?;

        let all_output = stream_child_output(&mut child, on_output).await;
        let status = child
            .wait()
            .await
            .map_err(|e| KilnError::command_failed(format!("{} build", self.binary), e))?;

        if status.success() {
            info!("Image built: {}", tag);
            Ok(())
        } else {
            Err(KilnError::Provision {
                image: tag.to_string(),
                diagnostics: output_tail(&all_output),
            })
        }
    }

    async fn volume_exists(&self, name: &str) -> KilnResult<bool> {
        let output = self.exec(&["volume", "inspect", name]).await?;
        Ok(output.status.success())
    }

    async fn volume_create(&self, name: &str, labels: &HashMap<String, String>) -> KilnResult<()> {
        let mut args: Vec<String> = vec!["volume".to_string(), "create".to_string()];
        for (key, value) in labels {
            args.push("--label".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(name.to_string());

        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.exec(&args_refs).await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(KilnError::VolumeCreate {
                name: name.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }

    async fn volume_list(&self, label: &str) -> KilnResult<Vec<VolumeInfo>> {
        let filter = format!("label={label}");
        let output = self
            .exec(&["volume", "ls", "--filter", &filter, "--format", "{{.Name}}"])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KilnError::command_exec(
                format!("{} volume ls", self.binary),
                stderr,
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| VolumeInfo {
                name: line.to_string(),
            })
            .collect())
    }

    async fn volume_remove(&self, name: &str) -> KilnResult<()> {
        let output = self.exec(&["volume", "rm", name]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no such volume") {
                Err(KilnError::VolumeNotFound(name.to_string()))
            } else {
                Err(KilnError::command_exec(
                    format!("{} volume rm", self.binary),
                    stderr,
                ))
            }
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> KilnResult<String> {
        let mut args: Vec<String> = vec!["create".to_string()];

        args.push("-w".to_string());
        args.push(spec.workdir.clone());

        args.push("--network".to_string());
        args.push(spec.network.clone());

        for mount in &spec.mounts {
            args.push("-v".to_string());
            args.push(mount.to_arg());
        }

        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }

        for (key, value) in &spec.labels {
            args.push("--label".to_string());
            args.push(format!("{key}={value}"));
        }

        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());

        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.exec(&args_refs).await?;

        if output.status.success() {
            let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
            debug!(
                "Container created: {}",
                &container_id[..12.min(container_id.len())]
            );
            Ok(container_id)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            // A vanished image between provision and execute is its own failure kind.
            if stderr.contains("No such image") || stderr.contains("image not known") {
                Err(KilnError::EnvironmentMissing(spec.image.clone()))
            } else {
                Err(KilnError::command_exec(
                    format!("{} create", self.binary),
                    stderr,
                ))
            }
        }
    }

    async fn start_container(
        &self,
        id: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> KilnResult<RunStatus> {
        let mut child = self.spawn(&["start", "-a", id])?;

        let all_output = stream_child_output(&mut child, on_output).await;
        let status = child
            .wait()
            .await
            .map_err(|e| KilnError::command_failed(format!("{} start", self.binary), e))?;

        Ok(RunStatus {
            exit_code: status.code().unwrap_or(-1),
            output_tail: output_tail(&all_output),
        })
    }

    async fn kill_container(&self, id: &str) -> KilnResult<()> {
        debug!("Killing container: {}", id);

        let output = self.exec(&["kill", id]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(KilnError::command_exec(
                format!("{} kill", self.binary),
                stderr,
            ))
        }
    }

    async fn remove_container(&self, id: &str) -> KilnResult<()> {
        debug!("Removing container: {}", id);

        let output = self.exec(&["rm", "-f", id]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no such container") || stderr.contains("No such container") {
                Ok(())
            } else {
                Err(KilnError::command_exec(
                    format!("{} rm", self.binary),
                    stderr,
                ))
            }
        }
    }

    async fn copy_into(&self, id: &str, source: &Path, dest: &str) -> KilnResult<()> {
        // Trailing /. copies directory contents, not the directory itself.
        let from = format!("{}/.", source.display());
        let to = format!("{id}:{dest}");
        let output = self.exec(&["cp", &from, &to]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(KilnError::command_exec(
                format!("{} cp {from} {to}", self.binary),
                stderr,
            ))
        }
    }

    async fn copy_out(&self, id: &str, source: &str, dest: &Path) -> KilnResult<()> {
        let from = format!("{id}:{source}/.");
        let to = dest.display().to_string();
        let output = self.exec(&["cp", &from, &to]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(KilnError::command_exec(
                format!("{} cp {from} {to}", self.binary),
                stderr,
            ))
        }
    }

    fn runtime_name(&self) -> &'static str {
        self.name
    }
}
