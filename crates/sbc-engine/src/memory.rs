//! In-memory [`ContainerEngine`] used by tests and dry runs.
//!
//! Containers and named volumes live in a shared map. Every call is
//! recorded, and individual calls can be made to fail with
//! [`MemoryEngine::fail_on`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::client::ContainerEngine;
use crate::error::{EngineError, EngineResult};
use crate::spec::*;

/// Engine operations, used to record calls and target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    Pull,
    Create,
    Start,
    Stop,
    Restart,
    Remove,
    RemoveVolume,
    Inspect,
    List,
}

/// A container held by the in-memory engine.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryContainer {
    pub id: String,
    pub spec: ContainerSpec,
    pub running: bool,
}

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    containers: BTreeMap<String, MemoryContainer>,
    volumes: BTreeSet<String>,
    images: BTreeSet<String>,
    calls: Vec<(EngineOp, String)>,
    timeouts: Vec<(EngineOp, String, Duration)>,
    failures: Vec<(EngineOp, String)>,
}

impl MemoryState {
    /// Record the call and return the injected failure, if any. `keys` are
    /// every name the target is known by (id, container name, image).
    fn enter(&mut self, op: EngineOp, target: &str, keys: &[&str]) -> EngineResult<()> {
        self.calls.push((op, target.to_string()));
        let injected = self
            .failures
            .iter()
            .any(|(fail_op, key)| *fail_op == op && (key == "*" || keys.contains(&key.as_str())));
        if injected {
            return Err(EngineError::Operation(format!(
                "injected {op:?} failure for {target}"
            )));
        }
        Ok(())
    }

    fn container_mut(&mut self, id: &str) -> EngineResult<&mut MemoryContainer> {
        self.containers
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {id}")))
    }

    fn keys_for(&self, id: &str) -> Vec<String> {
        let mut keys = vec![id.to_string()];
        if let Some(c) = self.containers.get(id) {
            keys.push(c.spec.name.clone());
        }
        keys
    }
}

#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every `op` call whose target matches `key` fail. `key` may be
    /// a container id, container name, image, volume name, or `*`.
    pub fn fail_on(&self, op: EngineOp, key: &str) {
        self.lock().failures.push((op, key.to_string()));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Every call so far, in order, with its target.
    pub fn calls(&self) -> Vec<(EngineOp, String)> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, op: EngineOp) -> usize {
        self.lock().calls.iter().filter(|(o, _)| *o == op).count()
    }

    /// Timeouts passed to stop and restart calls, in order, with their target.
    pub fn timeouts(&self, op: EngineOp) -> Vec<(String, Duration)> {
        self.lock()
            .timeouts
            .iter()
            .filter(|(o, _, _)| *o == op)
            .map(|(_, id, timeout)| (id.clone(), *timeout))
            .collect()
    }

    pub fn containers(&self) -> Vec<MemoryContainer> {
        self.lock().containers.values().cloned().collect()
    }

    pub fn container_named(&self, name: &str) -> Option<MemoryContainer> {
        self.lock()
            .containers
            .values()
            .find(|c| c.spec.name == name)
            .cloned()
    }

    pub fn container(&self, id: &str) -> Option<MemoryContainer> {
        self.lock().containers.get(id).cloned()
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.lock().containers.get(id).is_some_and(|c| c.running)
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.lock().volumes.contains(name)
    }

    pub fn volumes(&self) -> Vec<String> {
        self.lock().volumes.iter().cloned().collect()
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.lock().images.contains(image)
    }
}

#[async_trait]
impl ContainerEngine for MemoryEngine {
    async fn pull_image(&self, image: &str) -> EngineResult<()> {
        let mut state = self.lock();
        state.enter(EngineOp::Pull, image, &[image])?;
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<String> {
        let mut state = self.lock();
        state.enter(EngineOp::Create, &spec.name, &[&spec.name, &spec.image])?;

        if state.containers.values().any(|c| c.spec.name == spec.name) {
            return Err(EngineError::Operation(format!(
                "container name {} is already in use",
                spec.name
            )));
        }

        state.next_id += 1;
        let id = format!("{:012x}", state.next_id);
        for mount in &spec.mounts {
            state.volumes.insert(mount.volume.clone());
        }
        state.containers.insert(
            id.clone(),
            MemoryContainer {
                id: id.clone(),
                spec: spec.clone(),
                running: false,
            },
        );

        debug!(name = %spec.name, %id, "memory container created");
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        let mut state = self.lock();
        let keys = state.keys_for(id);
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        state.enter(EngineOp::Start, id, &keys)?;
        state.container_mut(id)?.running = true;
        Ok(())
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> EngineResult<()> {
        let mut state = self.lock();
        let keys = state.keys_for(id);
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        state.timeouts.push((EngineOp::Stop, id.to_string(), timeout));
        state.enter(EngineOp::Stop, id, &keys)?;
        state.container_mut(id)?.running = false;
        Ok(())
    }

    async fn restart_container(&self, id: &str, timeout: Duration) -> EngineResult<()> {
        let mut state = self.lock();
        let keys = state.keys_for(id);
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        state.timeouts.push((EngineOp::Restart, id.to_string(), timeout));
        state.enter(EngineOp::Restart, id, &keys)?;
        state.container_mut(id)?.running = true;
        Ok(())
    }

    async fn remove_container(&self, id: &str, options: RemoveOptions) -> EngineResult<()> {
        let mut state = self.lock();
        let keys = state.keys_for(id);
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        state.enter(EngineOp::Remove, id, &keys)?;

        let container = state.container_mut(id)?;
        if container.running && !options.force {
            return Err(EngineError::Operation(format!(
                "container {id} is running, stop it first or force removal"
            )));
        }
        state.containers.remove(id);
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> EngineResult<()> {
        let mut state = self.lock();
        state.enter(EngineOp::RemoveVolume, name, &[name])?;

        let in_use = state
            .containers
            .values()
            .any(|c| c.spec.mounts.iter().any(|m| m.volume == name));
        if in_use {
            return Err(EngineError::Operation(format!("volume {name} is in use")));
        }
        if !state.volumes.remove(name) {
            return Err(EngineError::NotFound(format!("No such volume: {name}")));
        }
        Ok(())
    }

    async fn inspect_mounts(&self, id: &str) -> EngineResult<Vec<MountInfo>> {
        let mut state = self.lock();
        let keys = state.keys_for(id);
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        state.enter(EngineOp::Inspect, id, &keys)?;

        let container = state.container_mut(id)?;
        Ok(container
            .spec
            .mounts
            .iter()
            .map(|m| MountInfo {
                name: Some(m.volume.clone()),
                destination: m.target.clone(),
            })
            .collect())
    }

    async fn list_containers(&self, all: bool) -> EngineResult<Vec<ContainerSummary>> {
        let mut state = self.lock();
        state.enter(EngineOp::List, "", &[])?;
        Ok(state
            .containers
            .values()
            .filter(|c| all || c.running)
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![c.spec.name.clone()],
            })
            .collect())
    }
}
