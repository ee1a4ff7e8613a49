// SPDX-License-Identifier: MIT

//! Scripted backend for tests — a fake process table driven by the test,
//! mirroring the teacher's `FakeAgentAdapter` (`daemon::adapters::agent::fake`).

use crate::backend::{BackendError, PortBackend, PortHolder};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
struct State {
    holders: HashMap<u16, PortHolder>,
    unbindable: HashSet<u16>,
    dead_pids: HashSet<u32>,
    terminate_fails: HashSet<u32>,
}

/// A scripted [`PortBackend`] for unit tests. Not cfg(test)-gated so that
/// downstream crates (`fleet-lifecycle`, `fleet-registry`, `fleet-health`)
/// can also script port behavior in their own tests without a dev-dependency
/// cycle.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_holder(&self, port: u16, pid: u32, name: &str) {
        self.state.lock().holders.insert(port, PortHolder { pid, name: name.to_string() });
    }

    pub fn clear_holder(&self, port: u16) {
        self.state.lock().holders.remove(&port);
    }

    pub fn set_bindable(&self, port: u16, bindable: bool) {
        let mut state = self.state.lock();
        if bindable {
            state.unbindable.remove(&port);
        } else {
            state.unbindable.insert(port);
        }
    }

    pub fn mark_dead(&self, pid: u32) {
        self.state.lock().dead_pids.insert(pid);
    }

    pub fn fail_terminate(&self, pid: u32) {
        self.state.lock().terminate_fails.insert(pid);
    }
}

#[async_trait]
impl PortBackend for FakeBackend {
    async fn inspect(&self, port: u16) -> Result<Option<PortHolder>, BackendError> {
        Ok(self.state.lock().holders.get(&port).cloned())
    }

    async fn bindable(&self, port: u16) -> Result<bool, BackendError> {
        let state = self.state.lock();
        if state.unbindable.contains(&port) {
            return Ok(false);
        }
        Ok(!state.holders.contains_key(&port))
    }

    async fn terminate(&self, pid: u32, force: bool) -> Result<bool, BackendError> {
        let mut state = self.state.lock();
        if state.terminate_fails.contains(&pid) && !force {
            return Ok(false);
        }
        state.dead_pids.insert(pid);
        state.holders.retain(|_, h| h.pid != pid);
        Ok(true)
    }

    async fn is_alive(&self, pid: u32) -> bool {
        !self.state.lock().dead_pids.contains(&pid)
    }
}
