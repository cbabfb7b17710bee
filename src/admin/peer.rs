use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use url::Url;

use super::ServerInfoData;
use crate::utils;

// Signals a node's service loop understands.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Display, EnumString)]
pub enum ServiceSignal {
    #[serde(rename = "restart")]
    #[strum(serialize = "restart")]
    Restart,
    #[serde(rename = "stop")]
    #[strum(serialize = "stop")]
    Stop,
}

// Outcome of one peer's part in a fan-out. Either `data` or `error` is
// set; the address is always populated.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PeerResult<T> {
    pub addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// RPC surface of one cluster member, local node included.
#[async_trait]
pub trait PeerClient: Send + Sync {
    fn addr(&self) -> &str;

    async fn server_info(&self) -> anyhow::Result<ServerInfoData>;

    // Seconds since the peer's process started.
    async fn uptime(&self) -> anyhow::Result<u64>;

    async fn signal_service(&self, signal: ServiceSignal) -> anyhow::Result<()>;

    async fn reload_credentials(&self) -> anyhow::Result<()>;
}

// The set of cluster peers an admin operation fans out to. Fed by
// endpoint discovery at process start.
pub struct PeerRegistry {
    peers: Vec<Arc<dyn PeerClient>>,
}

impl PeerRegistry {
    pub fn new(peers: Vec<Arc<dyn PeerClient>>) -> PeerRegistry {
        PeerRegistry { peers }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    // Runs `op` against every peer concurrently and waits for all of
    // them. Slot i of the result always belongs to peer i, whatever the
    // completion order; a failed or panicked peer task yields an error
    // entry in its own slot and nothing else.
    pub async fn fanout<T, F, Fut>(&self, op: F) -> Vec<PeerResult<T>>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn PeerClient>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let mut addrs = Vec::with_capacity(self.peers.len());
        let mut handles = Vec::with_capacity(self.peers.len());
        for peer in &self.peers {
            addrs.push(peer.addr().to_owned());
            handles.push(tokio::spawn(op(peer.clone())));
        }

        let outcomes = join_all(handles).await;

        addrs
            .into_iter()
            .zip(outcomes)
            .map(|(addr, outcome)| match outcome {
                Ok(Ok(data)) => PeerResult {
                    addr,
                    data: Some(data),
                    error: None,
                },
                Ok(Err(err)) => PeerResult {
                    addr,
                    data: None,
                    error: Some(err.to_string()),
                },
                Err(err) => PeerResult {
                    addr,
                    data: None,
                    error: Some(format!("peer task failed: {}", err)),
                },
            })
            .collect()
    }
}

// Fans a one-way service signal out to all peers. Per-peer failures are
// logged and dropped; delivery is not acknowledged beyond the call.
pub async fn send_service_signal(peers: &PeerRegistry, signal: ServiceSignal) {
    let results = peers
        .fanout(move |peer| async move { peer.signal_service(signal).await })
        .await;
    for result in results {
        if let Some(err) = result.error {
            log::error!(
                "sending service signal '{}' to peer {} failed: {}",
                signal,
                result.addr,
                err
            );
        }
    }
}

// Peer client speaking the admin REST API, used for all remote cluster
// members.
pub struct RestPeerClient {
    addr: String,
    base_url: Url,
    client: reqwest::Client,
}

impl RestPeerClient {
    pub fn new(addr: &str, secure: bool) -> anyhow::Result<RestPeerClient> {
        let scheme = if secure { "https" } else { "http" };
        let base_url = Url::parse(&format!("{}://{}", scheme, addr))?;
        let client = reqwest::Client::builder()
            .connect_timeout(utils::seconds(15))
            .timeout(utils::seconds(60))
            .tcp_keepalive(Some(utils::seconds(15)))
            .build()?;
        Ok(RestPeerClient {
            addr: addr.to_owned(),
            base_url,
            client,
        })
    }

    fn url(&self, path: &str) -> anyhow::Result<Url> {
        Ok(self.base_url.join(path)?)
    }
}

#[async_trait]
impl PeerClient for RestPeerClient {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn server_info(&self) -> anyhow::Result<ServerInfoData> {
        let resp = self
            .client
            .get(self.url("/kodiak/admin/v1/peer/info")?)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn uptime(&self) -> anyhow::Result<u64> {
        let resp = self
            .client
            .get(self.url("/kodiak/admin/v1/peer/uptime")?)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn signal_service(&self, signal: ServiceSignal) -> anyhow::Result<()> {
        self.client
            .post(self.url("/kodiak/admin/v1/peer/service")?)
            .json(&serde_json::json!({ "action": signal }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn reload_credentials(&self) -> anyhow::Result<()> {
        self.client
            .post(self.url("/kodiak/admin/v1/peer/reload-credentials")?)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
