//! HTTP communication with the collector.
//!
//! Three endpoints, all POST with JSON bodies: `/v1/register` (public
//! key + metadata, unsigned), `/v1/activate` and `/v1/snapshot` (both
//! carry an `X-Signature` header with the hex Ed25519 signature of the
//! exact request body). Bodies are serialized once and sent as raw
//! bytes so the signature always covers what goes on the wire.
//!
//! A snapshot that fails to transmit is logged and dropped by the
//! caller — the aggregator has already reset, so retrying would
//! misreport (see the agent main loop).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::{debug, info};

use emberpost_pipeline::ObservedValue;

use crate::error::AgentError;
use crate::identity::Identity;

/// Shared request timeout for register, activate, and snapshot.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Payload for `POST /v1/register`.
#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    instance_id: &'a str,
    public_key: String,
    app_name: &'a str,
    app_version: &'a str,
    deployment_mode: &'static str,
    environment: &'a str,
    os_arch: String,
}

/// Payload for `POST /v1/activate`.
#[derive(Debug, Serialize)]
struct ActivateRequest<'a> {
    instance_id: &'a str,
}

/// Payload for `POST /v1/snapshot`.
#[derive(Debug, Serialize)]
struct SnapshotRequest<'a> {
    instance_id: &'a str,
    timestamp: DateTime<Utc>,
    metrics: &'a BTreeMap<String, ObservedValue>,
}

/// Sender configuration, copied out of the agent config.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub server_url: String,
    pub app_name: String,
    pub app_version: String,
    pub environment: String,
}

/// HTTP client for the collector.
#[derive(Debug)]
pub struct Sender {
    config: SenderConfig,
    identity: Arc<Identity>,
    client: reqwest::Client,
    registered: bool,
}

impl Sender {
    /// Create a new sender. Fails only if the TLS backend cannot
    /// initialize.
    pub fn new(config: SenderConfig, identity: Arc<Identity>) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AgentError::Registration(format!("building http client: {e}")))?;

        Ok(Self {
            config,
            identity,
            client,
            registered: false,
        })
    }

    /// Register this instance with the collector, then activate it.
    ///
    /// Success is 200 or 201 for register, exactly 200 for activate.
    /// Idempotent once registered.
    pub async fn register(&mut self) -> Result<(), AgentError> {
        if self.registered {
            return Ok(());
        }

        let body = self.register_body()?;
        let url = format!("{}/v1/register", self.config.server_url);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| AgentError::Registration(format!("sending register request to {url}: {e}")))?;

        let status = response.status();
        if status.as_u16() != 200 && status.as_u16() != 201 {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Registration(format!(
                "register failed with status {status}: {body}"
            )));
        }

        self.registered = true;
        info!(instance_id = %self.identity.instance_id, "registered with collector");

        self.activate().await
    }

    /// Activate the registered instance with a signed request.
    async fn activate(&self) -> Result<(), AgentError> {
        let (body, signature) = self.activate_body()?;
        let url = format!("{}/v1/activate", self.config.server_url);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header("X-Signature", signature)
            .body(body)
            .send()
            .await
            .map_err(|e| AgentError::Registration(format!("sending activate request to {url}: {e}")))?;

        let status = response.status();
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Registration(format!(
                "activate failed with status {status}: {body}"
            )));
        }

        info!("activated with collector");
        Ok(())
    }

    /// Send a metrics snapshot. Success is 200 or 202.
    pub async fn send_snapshot(
        &self,
        metrics: &BTreeMap<String, ObservedValue>,
    ) -> Result<(), AgentError> {
        let (body, signature) = self.snapshot_body(metrics, Utc::now())?;
        let url = format!("{}/v1/snapshot", self.config.server_url);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header("X-Signature", signature)
            .body(body)
            .send()
            .await
            .map_err(|e| AgentError::Snapshot(format!("sending snapshot to {url}: {e}")))?;

        let status = response.status();
        if status.as_u16() != 200 && status.as_u16() != 202 {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Snapshot(format!(
                "snapshot failed with status {status}: {body}"
            )));
        }

        debug!(metrics_count = metrics.len(), "sent snapshot");
        Ok(())
    }

    /// Serialized register body.
    fn register_body(&self) -> Result<Vec<u8>, AgentError> {
        let request = RegisterRequest {
            instance_id: &self.identity.instance_id,
            public_key: self.identity.public_key_hex(),
            app_name: &self.config.app_name,
            app_version: &self.config.app_version,
            deployment_mode: detect_deployment_mode(),
            environment: &self.config.environment,
            os_arch: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        };
        serde_json::to_vec(&request)
            .map_err(|e| AgentError::Registration(format!("encoding register request: {e}")))
    }

    /// Serialized activate body plus its signature.
    fn activate_body(&self) -> Result<(Vec<u8>, String), AgentError> {
        let request = ActivateRequest {
            instance_id: &self.identity.instance_id,
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| AgentError::Registration(format!("encoding activate request: {e}")))?;
        let signature = self.identity.sign(&body);
        Ok((body, signature))
    }

    /// Serialized snapshot body plus its signature.
    fn snapshot_body(
        &self,
        metrics: &BTreeMap<String, ObservedValue>,
        timestamp: DateTime<Utc>,
    ) -> Result<(Vec<u8>, String), AgentError> {
        let request = SnapshotRequest {
            instance_id: &self.identity.instance_id,
            timestamp,
            metrics,
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| AgentError::Snapshot(format!("encoding snapshot request: {e}")))?;
        let signature = self.identity.sign(&body);
        Ok((body, signature))
    }
}

/// Detect how the agent is deployed, by environment probing.
///
/// Probe order: Kubernetes service env var, Docker marker file,
/// container cgroup, else standalone.
fn detect_deployment_mode() -> &'static str {
    let kubernetes = std::env::var_os("KUBERNETES_SERVICE_HOST").is_some();
    let dockerenv = std::path::Path::new("/.dockerenv").exists();
    let cgroup = std::fs::read_to_string("/proc/self/cgroup").unwrap_or_default();
    deployment_mode_from(kubernetes, dockerenv, &cgroup)
}

/// Pure classification half of the deployment probe.
fn deployment_mode_from(kubernetes: bool, dockerenv: bool, cgroup: &str) -> &'static str {
    if kubernetes {
        return "kubernetes";
    }
    if dockerenv {
        return "docker";
    }
    if cgroup_indicates_container(cgroup) {
        return "container";
    }
    "standalone"
}

/// A cgroup listing mentioning a container runtime means we are inside
/// some container that is neither Kubernetes nor Docker-marked.
fn cgroup_indicates_container(cgroup: &str) -> bool {
    const RUNTIME_TOKENS: &[&str] = &["docker", "containerd", "kubepods", "lxc", "podman"];
    cgroup
        .lines()
        .any(|line| RUNTIME_TOKENS.iter().any(|token| line.contains(token)))
}
