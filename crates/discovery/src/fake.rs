// SPDX-License-Identifier: MIT

//! Scripted [`HttpProbe`] for tests.

use crate::probe::{HttpProbe, ProbeError, ProbeResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
struct ScriptedResponse {
    status: u16,
    body: String,
    elapsed_ms: u64,
}

#[derive(Default)]
struct State {
    responses: HashMap<u16, ScriptedResponse>,
    fail: std::collections::HashSet<u16>,
}

/// A scripted [`HttpProbe`]. Ports with no scripted response behave as
/// unreachable, matching a real closed port.
#[derive(Clone, Default)]
pub struct FakeHttpProbe {
    state: Arc<Mutex<State>>,
}

impl FakeHttpProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_response(&self, port: u16, status: u16, body: impl Into<String>) {
        let mut state = self.state.lock();
        state.fail.remove(&port);
        state
            .responses
            .insert(port, ScriptedResponse { status, body: body.into(), elapsed_ms: 5 });
    }

    pub fn set_unreachable(&self, port: u16) {
        let mut state = self.state.lock();
        state.responses.remove(&port);
        state.fail.insert(port);
    }
}

#[async_trait]
impl HttpProbe for FakeHttpProbe {
    async fn get(&self, port: u16, _timeout: Duration) -> Result<ProbeResponse, ProbeError> {
        let state = self.state.lock();
        match state.responses.get(&port) {
            Some(r) => Ok(ProbeResponse { status: r.status, body: r.body.clone(), elapsed_ms: r.elapsed_ms }),
            None => Err(ProbeError::Request("connection refused".to_string())),
        }
    }

    async fn head(&self, port: u16, _timeout: Duration) -> Result<u16, ProbeError> {
        let state = self.state.lock();
        match state.responses.get(&port) {
            Some(r) => Ok(r.status),
            None => Err(ProbeError::Request("connection refused".to_string())),
        }
    }
}
