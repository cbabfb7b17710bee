use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{
    send_service_signal, AdminApiVersionInfo, ConfigReplicator, HealOpts, HealPath,
    HealSequence, HealSequenceStatus, HealStartSuccess, HealStateStore, PeerRegistry,
    PeerResult, ServerInfoData, ServerVersion, ServiceSignal, ServiceStatus,
};
use crate::errors::AdminError;
use crate::storage::{ConfigStore, HealEngine};
use crate::{ADMIN_API_VERSION, COMMIT_ID, VERSION};

// Outcome of a heal call: a freshly started sequence or the next status
// batch of a running one.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum HealResponse {
    Started(HealStartSuccess),
    Status(HealSequenceStatus),
}

// The admin operation surface, transport excluded. Constructed once at
// process start and handed to the request layer by reference; request
// authentication happens before any call lands here.
pub struct AdminApi {
    heal_state: Arc<HealStateStore>,
    replicator: Arc<ConfigReplicator>,
    peers: Arc<PeerRegistry>,
    heal_engine: Arc<dyn HealEngine>,
    store: Arc<dyn ConfigStore>,
    signal_tx: mpsc::Sender<ServiceSignal>,
}

impl AdminApi {
    pub fn new(
        heal_state: Arc<HealStateStore>,
        replicator: Arc<ConfigReplicator>,
        peers: Arc<PeerRegistry>,
        heal_engine: Arc<dyn HealEngine>,
        store: Arc<dyn ConfigStore>,
        signal_tx: mpsc::Sender<ServiceSignal>,
    ) -> AdminApi {
        AdminApi {
            heal_state,
            replicator,
            peers,
            heal_engine,
            store,
            signal_tx,
        }
    }

    pub fn version_info(&self) -> AdminApiVersionInfo {
        AdminApiVersionInfo {
            version: ADMIN_API_VERSION.to_owned(),
        }
    }

    // Build version plus per-node uptimes. Unreachable nodes degrade to
    // error entries instead of failing the call.
    pub async fn service_status(&self) -> ServiceStatus {
        let uptimes = self
            .peers
            .fanout(|peer| async move { peer.uptime().await })
            .await;
        ServiceStatus {
            server_version: ServerVersion {
                version: VERSION.to_owned(),
                commit_id: COMMIT_ID.to_owned(),
            },
            uptimes,
        }
    }

    // Acknowledges right away; the signal reaches peers first and the
    // local service loop last, both detached from this call.
    pub async fn signal_service(&self, signal: ServiceSignal) -> Result<(), AdminError> {
        let peers = self.peers.clone();
        let signal_tx = self.signal_tx.clone();
        tokio::spawn(async move {
            send_service_signal(&peers, signal).await;
            if signal_tx.send(signal).await.is_err() {
                log::error!("local service signal channel closed, dropping '{}'", signal);
            }
        });
        Ok(())
    }

    pub async fn server_info(&self) -> Vec<PeerResult<ServerInfoData>> {
        self.peers
            .fanout(|peer| async move { peer.server_info().await })
            .await
    }

    // Starts a heal sequence (no client token) or destructively polls a
    // running one (token given). Validation happens before any state
    // changes; a launch returns as soon as the sequence is registered.
    pub async fn heal(
        &self,
        bucket: &str,
        object_prefix: &str,
        client_token: Option<&str>,
        force_start: bool,
        opts: HealOpts,
        client_address: String,
    ) -> Result<HealResponse, AdminError> {
        match client_token {
            Some(token) => {
                let path = HealPath::new(bucket, object_prefix)?;
                let status = self.heal_state.pop_heal_status(&path, token)?;
                Ok(HealResponse::Status(status))
            }
            None => {
                let num_disks = self.store.storage_info().total_disks();
                let seq = HealSequence::new(
                    bucket,
                    object_prefix,
                    client_address,
                    num_disks,
                    opts,
                    force_start,
                )?;
                let started = self
                    .heal_state
                    .launch_new_heal_sequence(seq, self.heal_engine.clone())?;
                Ok(HealResponse::Started(started))
            }
        }
    }

    pub fn get_config(&self) -> Result<Vec<u8>, AdminError> {
        self.replicator.get_config_data()
    }

    pub async fn set_config(&self, payload: &[u8]) -> Result<(), AdminError> {
        self.replicator.set_config(payload).await
    }

    pub async fn update_credentials(&self, payload: &[u8]) -> Result<(), AdminError> {
        self.replicator.update_credentials(payload).await
    }
}
