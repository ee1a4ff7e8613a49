// SPDX-License-Identifier: MIT

//! HTTP probing, grounded in `other_examples/…gglib…health_monitor.rs`'s
//! separation of `check_http_health` from the loop that calls it — here
//! the probe is a trait so [`crate::Discovery`] and (via re-export)
//! `fleet-health`'s sweep can both substitute a fake responder in tests.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;

/// User-Agent sent on every outbound probe, per spec §6 ("a `User-Agent`
/// header identifying the controller").
pub const USER_AGENT: &str = "studio-fleet-controller/1.0";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
    pub elapsed_ms: u64,
}

impl ProbeResponse {
    /// 2xx-4xx counts as "responding" per spec §4.2.
    pub fn is_responding(&self) -> bool {
        (200..500).contains(&self.status)
    }
}

/// The probe seam: independent timeout per call, read-only, never binds or
/// mutates the host, per spec §4.2's discovery guarantees.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn get(&self, port: u16, timeout: Duration) -> Result<ProbeResponse, ProbeError>;
    async fn head(&self, port: u16, timeout: Duration) -> Result<u16, ProbeError>;
}

/// Real `reqwest`-backed probe against `http://127.0.0.1:<port>/`.
pub struct RealHttpProbe {
    client: reqwest::Client,
}

impl RealHttpProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for RealHttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpProbe for RealHttpProbe {
    async fn get(&self, port: u16, timeout: Duration) -> Result<ProbeResponse, ProbeError> {
        let url = format!("http://127.0.0.1:{port}/");
        let start = Instant::now();
        let result = tokio::time::timeout(timeout, self.client.get(&url).send()).await;
        let response = match result {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(ProbeError::Request(e.to_string())),
            Err(_) => return Err(ProbeError::Timeout(timeout)),
        };
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        // Only sample a small prefix — discovery only needs enough of the
        // body to look for classification markers, per spec §4.2.
        let body: String = body.chars().take(4096).collect();
        Ok(ProbeResponse { status, body, elapsed_ms: start.elapsed().as_millis() as u64 })
    }

    async fn head(&self, port: u16, timeout: Duration) -> Result<u16, ProbeError> {
        let url = format!("http://127.0.0.1:{port}/");
        let result = tokio::time::timeout(timeout, self.client.head(&url).send()).await;
        match result {
            Ok(Ok(resp)) => Ok(resp.status().as_u16()),
            Ok(Err(e)) => Err(ProbeError::Request(e.to_string())),
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }
}
