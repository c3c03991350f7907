use crate::client::Client;
use async_trait::async_trait;
use k8s_openapi::ByteString;
use keel_core::{Cluster, ObjectKey, Resource, Secret};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Data key holding the kubeconfig inside the secret
pub const KUBECONFIG_DATA_KEY: &str = "value";

/// Outcome of a connectivity probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Reachable,
    Unreachable(String),
}

impl ProbeResult {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeResult::Reachable)
    }
}

/// Checks whether a Cluster's workload API is reachable
#[async_trait]
pub trait RemoteProber: Send + Sync {
    async fn probe(&self, cluster: &Cluster) -> ProbeResult;
}

/// Name of the secret carrying a cluster's kubeconfig
pub fn kubeconfig_secret_name(cluster_name: &str) -> String {
    format!("{}-kubeconfig", cluster_name)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProbeMode {
    /// Reachable once a kubeconfig secret with data exists
    #[default]
    SecretPresence,
    /// Additionally GET `/healthz` on the kubeconfig's server
    Healthz,
}

/// Configuration for the kubeconfig prober
#[derive(Debug, Clone)]
pub struct KubeconfigProberConfig {
    pub mode: ProbeMode,
    /// Request timeout for the healthz check
    pub timeout: Duration,
}

impl Default for KubeconfigProberConfig {
    fn default() -> Self {
        Self {
            mode: ProbeMode::SecretPresence,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Probes a cluster through its `<name>-kubeconfig` secret
pub struct KubeconfigProber {
    client: Client,
    config: KubeconfigProberConfig,
}

impl KubeconfigProber {
    pub fn new(client: Client, config: KubeconfigProberConfig) -> Self {
        Self { client, config }
    }

    async fn load_kubeconfig(&self, cluster: &Cluster) -> Result<Vec<u8>, String> {
        let key = ObjectKey::new(cluster.namespace(), kubeconfig_secret_name(cluster.name()));
        let secret = match self.client.get_opt::<Secret>(&key).await {
            Ok(Some(secret)) => secret,
            Ok(None) => return Err(format!("kubeconfig secret {} not found", key)),
            Err(e) => return Err(format!("failed to read kubeconfig secret {}: {}", key, e)),
        };

        secret
            .data
            .as_ref()
            .and_then(|data| data.get(KUBECONFIG_DATA_KEY))
            .map(|value| value.0.clone())
            .filter(|bytes| !bytes.is_empty())
            .ok_or_else(|| {
                format!(
                    "kubeconfig secret {} has no '{}' key",
                    key, KUBECONFIG_DATA_KEY
                )
            })
    }

    async fn healthz(&self, kubeconfig: &[u8]) -> Result<(), String> {
        let endpoint = Kubeconfig::parse(kubeconfig)?.endpoint()?;

        let mut builder = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .danger_accept_invalid_certs(endpoint.insecure_skip_tls_verify);
        if let Some(ca) = &endpoint.certificate_authority_data {
            let cert = reqwest::Certificate::from_pem(&ca.0)
                .map_err(|e| format!("invalid certificate-authority-data: {}", e))?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;

        let url = format!("{}/healthz", endpoint.server.trim_end_matches('/'));
        debug!("GET {}", url);
        // Any HTTP response proves the API server is reachable
        http.get(&url)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| format!("GET {} failed: {}", url, e))
    }
}

#[async_trait]
impl RemoteProber for KubeconfigProber {
    async fn probe(&self, cluster: &Cluster) -> ProbeResult {
        let kubeconfig = match self.load_kubeconfig(cluster).await {
            Ok(k) => k,
            Err(reason) => return ProbeResult::Unreachable(reason),
        };

        match self.config.mode {
            ProbeMode::SecretPresence => ProbeResult::Reachable,
            ProbeMode::Healthz => match self.healthz(&kubeconfig).await {
                Ok(()) => ProbeResult::Reachable,
                Err(reason) => ProbeResult::Unreachable(reason),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    current_context: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEndpoint,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEndpoint {
    server: String,
    #[serde(default)]
    certificate_authority_data: Option<ByteString>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextRef,
}

#[derive(Debug, Deserialize)]
struct ContextRef {
    cluster: String,
}

impl Kubeconfig {
    fn parse(data: &[u8]) -> Result<Self, String> {
        serde_yaml::from_slice(data).map_err(|e| format!("invalid kubeconfig: {}", e))
    }

    /// The current context's cluster, or the only cluster when no context is set
    fn endpoint(&self) -> Result<ClusterEndpoint, String> {
        let cluster_name = self.current_context.as_ref().and_then(|current| {
            self.contexts
                .iter()
                .find(|c| &c.name == current)
                .map(|c| c.context.cluster.as_str())
        });

        let found = match cluster_name {
            Some(name) => self.clusters.iter().find(|c| c.name == name),
            None => self.clusters.first(),
        };

        found
            .map(|c| c.cluster.clone())
            .ok_or_else(|| "kubeconfig has no cluster for the current context".to_string())
    }
}
