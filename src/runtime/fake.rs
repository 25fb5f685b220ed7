//! In-process fake runtime for engine and store tests

use crate::error::{KilnError, KilnResult};
use crate::runtime::runtime::{ContainerRuntime, RunStatus, VolumeInfo};
use crate::runtime::types::{ContainerSpec, Mount};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

struct FakeContainer {
    spec: ContainerSpec,
    produced: Vec<(String, Vec<u8>)>,
}

/// Scriptable [`ContainerRuntime`] holding all state in memory.
///
/// A successful "run" materializes `produced` files: under the bind mount's
/// host path for mounted-mode specs, or inside the container (readable via
/// `copy_out`) otherwise.
pub struct FakeRuntime {
    pub images: Mutex<HashSet<String>>,
    pub volumes: Mutex<HashSet<String>>,
    pub built: Mutex<Vec<String>>,
    pub created_specs: Mutex<Vec<ContainerSpec>>,
    containers: Mutex<HashMap<String, FakeContainer>>,
    /// Exit code the fake pipeline reports
    pub exit_code: Mutex<i32>,
    /// Files the fake pipeline writes under the output directory
    pub produced: Mutex<Vec<(String, Vec<u8>)>>,
    /// Output directory name, relative to the sandbox workdir
    pub output_dir: String,
    /// Simulate losing a volume-create race: create errors but the volume appears
    pub lose_volume_create_race: AtomicBool,
    next_id: AtomicU64,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            images: Mutex::new(HashSet::new()),
            volumes: Mutex::new(HashSet::new()),
            built: Mutex::new(Vec::new()),
            created_specs: Mutex::new(Vec::new()),
            containers: Mutex::new(HashMap::new()),
            exit_code: Mutex::new(0),
            produced: Mutex::new(vec![("contract.wasm".to_string(), b"\0asm-opt".to_vec())]),
            output_dir: "artifacts".to_string(),
            lose_volume_create_race: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_image(self, tag: &str) -> Self {
        self.images.lock().unwrap().insert(tag.to_string());
        self
    }

    pub fn set_produced(&self, files: Vec<(String, Vec<u8>)>) {
        *self.produced.lock().unwrap() = files;
    }

    pub fn set_exit_code(&self, code: i32) {
        *self.exit_code.lock().unwrap() = code;
    }

    pub fn live_containers(&self) -> usize {
        self.containers.lock().unwrap().len()
    }

    pub fn builds_performed(&self) -> usize {
        self.built.lock().unwrap().len()
    }
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn is_available(&self) -> KilnResult<bool> {
        Ok(true)
    }

    async fn image_exists(&self, tag: &str) -> KilnResult<bool> {
        Ok(self.images.lock().unwrap().contains(tag))
    }

    async fn build_image(
        &self,
        tag: &str,
        _definition: &Path,
        _context: &Path,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> KilnResult<()> {
        on_output(format!("fake build of {tag}"));
        self.built.lock().unwrap().push(tag.to_string());
        self.images.lock().unwrap().insert(tag.to_string());
        Ok(())
    }

    async fn volume_exists(&self, name: &str) -> KilnResult<bool> {
        Ok(self.volumes.lock().unwrap().contains(name))
    }

    async fn volume_create(&self, name: &str, _labels: &HashMap<String, String>) -> KilnResult<()> {
        if self.lose_volume_create_race.load(Ordering::SeqCst) {
            // Another invocation created it first; the create itself errors.
            self.volumes.lock().unwrap().insert(name.to_string());
            return Err(KilnError::VolumeCreate {
                name: name.to_string(),
                reason: "volume already exists".to_string(),
            });
        }
        self.volumes.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn volume_list(&self, _label: &str) -> KilnResult<Vec<VolumeInfo>> {
        let mut names: Vec<String> = self.volumes.lock().unwrap().iter().cloned().collect();
        names.sort();
        Ok(names.into_iter().map(|name| VolumeInfo { name }).collect())
    }

    async fn volume_remove(&self, name: &str) -> KilnResult<()> {
        if self.volumes.lock().unwrap().remove(name) {
            Ok(())
        } else {
            Err(KilnError::VolumeNotFound(name.to_string()))
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> KilnResult<String> {
        if !self.images.lock().unwrap().contains(&spec.image) {
            return Err(KilnError::EnvironmentMissing(spec.image.clone()));
        }
        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.created_specs.lock().unwrap().push(spec.clone());
        self.containers.lock().unwrap().insert(
            id.clone(),
            FakeContainer {
                spec: spec.clone(),
                produced: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn start_container(
        &self,
        id: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> KilnResult<RunStatus> {
        on_output("fake pipeline running".to_string());
        let exit_code = *self.exit_code.lock().unwrap();
        let produced = self.produced.lock().unwrap().clone();

        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .get_mut(id)
            .ok_or_else(|| KilnError::command_exec("fake start", "no such container"))?;

        if exit_code == 0 {
            let bind_source = container.spec.mounts.iter().find_map(|m| match m {
                Mount::Bind { source, .. } => Some(source.clone()),
                Mount::Volume { .. } => None,
            });
            match bind_source {
                Some(source) => {
                    let out = source.join(&self.output_dir);
                    fs::create_dir_all(&out)
                        .map_err(|e| KilnError::io("fake output dir", e))?;
                    for (rel, contents) in &produced {
                        fs::write(out.join(rel), contents)
                            .map_err(|e| KilnError::io("fake output file", e))?;
                    }
                }
                None => container.produced = produced,
            }
        }

        Ok(RunStatus {
            exit_code,
            output_tail: "fake pipeline output".to_string(),
        })
    }

    async fn kill_container(&self, _id: &str) -> KilnResult<()> {
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> KilnResult<()> {
        self.containers.lock().unwrap().remove(id);
        Ok(())
    }

    async fn copy_into(&self, id: &str, _source: &Path, _dest: &str) -> KilnResult<()> {
        if self.containers.lock().unwrap().contains_key(id) {
            Ok(())
        } else {
            Err(KilnError::command_exec("fake cp", "no such container"))
        }
    }

    async fn copy_out(&self, id: &str, _source: &str, dest: &Path) -> KilnResult<()> {
        let containers = self.containers.lock().unwrap();
        let container = containers
            .get(id)
            .ok_or_else(|| KilnError::command_exec("fake cp", "no such container"))?;
        for (rel, contents) in &container.produced {
            fs::write(dest.join(rel), contents).map_err(|e| KilnError::io("fake copy out", e))?;
        }
        Ok(())
    }

    fn runtime_name(&self) -> &'static str {
        "Fake"
    }
}
