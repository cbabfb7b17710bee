use serde::{Deserialize, Serialize};

use super::PeerResult;
use crate::storage::StorageInfo;

// Admin API version the server speaks.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AdminApiVersionInfo {
    pub version: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServerVersion {
    pub version: String,
    #[serde(rename = "commitID")]
    pub commit_id: String,
}

// Per-node properties such as version, region and uptime.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ServerProperties {
    pub uptime: u64,
    pub version: String,
    #[serde(rename = "commitID")]
    pub commit_id: String,
    pub region: String,
    #[serde(rename = "notifyTargets", default)]
    pub notify_targets: Vec<String>,
}

// Storage and server information of a single node.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ServerInfoData {
    pub storage: StorageInfo,
    pub server: ServerProperties,
}

// Cluster service status: the local build plus per-node uptimes. Nodes
// that could not be reached carry an error instead of an uptime.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServiceStatus {
    #[serde(rename = "serverVersion")]
    pub server_version: ServerVersion,
    pub uptimes: Vec<PeerResult<u64>>,
}
