use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{send_service_signal, PeerRegistry, ServiceSignal};
use crate::auth::{self, Credentials};
use crate::config::{ServerConfig, MAX_CONFIG_JSON_SIZE};
use crate::crypto;
use crate::errors::{AdminError, StorageError};
use crate::jsonutils;
use crate::storage::ConfigStore;

// Credential rotation request carried inside the encrypted envelope.
#[derive(Serialize, Deserialize, Debug)]
pub struct SetCredsReq {
    #[serde(rename = "accessKey")]
    pub access_key: String,
    #[serde(rename = "secretKey")]
    pub secret_key: String,
}

// Single writer for the cluster configuration. Validates, encrypts and
// persists updates with write quorum, then propagates them to peers.
// Readers take cheap snapshots and never observe a half-applied update.
pub struct ConfigReplicator {
    store: Arc<dyn ConfigStore>,
    peers: Arc<PeerRegistry>,
    current: RwLock<Arc<ServerConfig>>,
    write_lock: Mutex<()>,
    env_creds: bool,
}

impl ConfigReplicator {
    // Loads the persisted configuration at process start, bootstrapping
    // a default one on first run. `env_creds` marks credentials as
    // pinned by the environment; the pinned pair then overrides the
    // persisted one in memory and rejects admin-path changes.
    pub async fn load(
        store: Arc<dyn ConfigStore>,
        peers: Arc<PeerRegistry>,
        boot_creds: Credentials,
        env_creds: bool,
    ) -> anyhow::Result<ConfigReplicator> {
        let config = match store.read_config().await {
            Ok(blob) => {
                let plain = crypto::decrypt_config_data(&boot_creds.secret_key, &blob)?;
                let mut config: ServerConfig = serde_json::from_slice(&plain)?;
                if env_creds {
                    config.credential = boot_creds;
                }
                config.validate()?;
                config
            }
            Err(StorageError::ConfigNotFound) => {
                let config = ServerConfig::new(boot_creds);
                let data = serde_json::to_vec(&config)?;
                let blob = crypto::encrypt_config_data(&config.credential.secret_key, &data)?;
                store.save_config(&blob).await?;
                config
            }
            Err(err) => return Err(err.into()),
        };

        Ok(ConfigReplicator {
            store,
            peers,
            current: RwLock::new(Arc::new(config)),
            write_lock: Mutex::new(()),
            env_creds,
        })
    }

    // Snapshot of the last committed configuration.
    pub fn current(&self) -> Arc<ServerConfig> {
        self.current.read().unwrap().clone()
    }

    // The configuration blob handed to admin clients, freshly encrypted
    // with the current secret.
    pub fn get_config_data(&self) -> Result<Vec<u8>, AdminError> {
        let config = self.current();
        let data = serde_json::to_vec(&*config)
            .map_err(|err| AdminError::Internal(err.into()))?;
        crypto::encrypt_config_data(&config.credential.secret_key, &data)
            .map_err(AdminError::Internal)
    }

    // Applies a full configuration update: size bound, decrypt,
    // duplicate-key check, parse, credential immutability, semantic
    // validation, quorum persist, then a fire-and-forget cluster
    // restart broadcast. On any failure the committed configuration is
    // left untouched.
    pub async fn set_config(&self, payload: &[u8]) -> Result<(), AdminError> {
        if payload.len() > MAX_CONFIG_JSON_SIZE {
            return Err(AdminError::ConfigTooLarge);
        }

        let secret = self.current().credential.secret_key.clone();
        let plain = crypto::decrypt_config_data(&secret, payload)
            .map_err(|_| AdminError::bad_config("unable to decrypt configuration payload"))?;
        let text = std::str::from_utf8(&plain)
            .map_err(|_| AdminError::bad_config("configuration payload is not valid UTF-8"))?;

        // Duplicate keys would make the effective value ambiguous.
        jsonutils::check_duplicate_keys(text)
            .map_err(|err| AdminError::bad_config(err.to_string()))?;

        let config: ServerConfig =
            serde_json::from_str(text).map_err(|err| AdminError::bad_config(err.to_string()))?;

        let _guard = self.write_lock.lock().await;

        if self.env_creds {
            let current = self.current();
            if config.credential.access_key != current.credential.access_key
                || config.credential.secret_key != current.credential.secret_key
            {
                return Err(AdminError::CredentialsImmutable);
            }
        }

        config
            .validate()
            .map_err(|err| AdminError::bad_config(err.to_string()))?;

        self.persist(&config).await?;
        *self.current.write().unwrap() = Arc::new(config);

        log::info!("configuration updated, broadcasting cluster restart");
        let peers = self.peers.clone();
        tokio::spawn(async move {
            send_service_signal(&peers, ServiceSignal::Restart).await;
        });
        Ok(())
    }

    // Rotates the cluster credential pair. Refused outright on nodes
    // whose credentials come from the environment. The local change is
    // authoritative once persisted; peers reload best-effort.
    pub async fn update_credentials(&self, payload: &[u8]) -> Result<(), AdminError> {
        if self.env_creds {
            return Err(AdminError::CredentialsImmutable);
        }
        if payload.len() > MAX_CONFIG_JSON_SIZE {
            return Err(AdminError::ConfigTooLarge);
        }

        let secret = self.current().credential.secret_key.clone();
        let plain = crypto::decrypt_config_data(&secret, payload)
            .map_err(|_| AdminError::bad_config("unable to decrypt credentials payload"))?;
        let req: SetCredsReq = serde_json::from_slice(&plain)
            .map_err(|err| AdminError::bad_request(err.to_string()))?;

        let creds = auth::new_credentials(req.access_key, req.secret_key)
            .map_err(|err| AdminError::InvalidCredentials {
                detail: err.to_string(),
            })?;

        let _guard = self.write_lock.lock().await;

        let mut config = (*self.current()).clone();
        config.credential = creds;
        self.persist(&config).await?;
        *self.current.write().unwrap() = Arc::new(config);

        // Notify peers to pick up the rotated pair; a peer that misses
        // the reload is reconciled by the operator re-running the
        // update.
        let results = self
            .peers
            .fanout(|peer| async move { peer.reload_credentials().await })
            .await;
        for result in results {
            if let Some(err) = result.error {
                log::error!(
                    "peer {} failed to reload credentials: {}",
                    result.addr,
                    err
                );
            }
        }
        Ok(())
    }

    // Serializes and persists `config` encrypted with its own secret,
    // mapping a quorum miss to its distinct error.
    async fn persist(&self, config: &ServerConfig) -> Result<(), AdminError> {
        let data = serde_json::to_vec(config)
            .map_err(|err| AdminError::Internal(err.into()))?;
        let blob = crypto::encrypt_config_data(&config.credential.secret_key, &data)
            .map_err(AdminError::Internal)?;
        match self.store.save_config(&blob).await {
            Ok(()) => Ok(()),
            Err(StorageError::WriteQuorum) => Err(AdminError::NoQuorum),
            Err(err) => Err(AdminError::Internal(err.into())),
        }
    }
}
