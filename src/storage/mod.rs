use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::admin::{HealOpts, HealPath, HealResultItem};
use crate::errors::StorageError;

// Disk counts of the local erasure set, as reported by the storage
// backend at request time.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default)]
pub struct StorageInfo {
    #[serde(rename = "onlineDisks")]
    pub online_disks: usize,
    #[serde(rename = "offlineDisks")]
    pub offline_disks: usize,
}

impl StorageInfo {
    pub fn total_disks(&self) -> usize {
        self.online_disks + self.offline_disks
    }
}

// Persistence for the server configuration blob. Writes require quorum
// across the erasure set; a quorum miss is a distinct error kind.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn save_config(&self, data: &[u8]) -> Result<(), StorageError>;

    async fn read_config(&self) -> Result<Vec<u8>, StorageError>;

    fn storage_info(&self) -> StorageInfo;
}

// The object-repair engine. This control plane only sequences a heal
// run and exposes its record stream; the repair logic lives behind this
// trait.
#[async_trait]
pub trait HealEngine: Send + Sync {
    async fn run_heal(
        &self,
        path: &HealPath,
        opts: HealOpts,
        tx: mpsc::Sender<HealResultItem>,
    ) -> anyhow::Result<()>;
}
