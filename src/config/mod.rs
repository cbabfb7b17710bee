use std::collections::HashMap;

use anyhow::bail;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::{self, Credentials};

// Version of the on-disk configuration format.
pub const CONFIG_VERSION: &str = "1";

// Env prefix used for all envs in Kodiak.
pub const ENV_PREFIX: &str = "KODIAK_";

pub const ENV_ACCESS_KEY: &str = "KODIAK_ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "KODIAK_SECRET_KEY";

// Largest encrypted configuration payload accepted by the admin API.
pub const MAX_CONFIG_JSON_SIZE: usize = 256 * 1024;

lazy_static! {
    static ref VALID_REGION: Regex = Regex::new(r#"^[a-zA-Z][a-zA-Z0-9\-_\.]{1,31}$"#).unwrap();
}

// A single notification target reachable over HTTP.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct WebhookTarget {
    pub enable: bool,
    #[serde(default)]
    pub endpoint: String,
}

// Cluster-wide notification targets, keyed by target id.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NotifyConfig {
    #[serde(default)]
    pub webhook: HashMap<String, WebhookTarget>,
}

// The server configuration replicated across the cluster. Mutated only
// through the admin configuration path, persisted encrypted.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub version: String,
    pub credential: Credentials,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl ServerConfig {
    pub fn new(credential: Credentials) -> ServerConfig {
        ServerConfig {
            version: CONFIG_VERSION.to_owned(),
            credential,
            region: "".to_owned(),
            notify: NotifyConfig::default(),
        }
    }

    // Semantic validation of the configuration. Returns a detail message
    // suitable for surfacing to the admin client.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.version != CONFIG_VERSION {
            bail!(
                "unsupported config version '{}', expected '{}'",
                self.version,
                CONFIG_VERSION
            );
        }
        if !self.credential.is_valid() {
            bail!("invalid credential in config");
        }
        if !self.region.is_empty() && !VALID_REGION.is_match(&self.region) {
            bail!("invalid region '{}' in config", self.region);
        }
        for (id, target) in &self.notify.webhook {
            if id.trim().is_empty() {
                bail!("notification target with empty id");
            }
            if target.enable {
                url::Url::parse(&target.endpoint).map_err(|e| {
                    anyhow::anyhow!("notification target '{}' endpoint invalid: {}", id, e)
                })?;
            }
        }
        Ok(())
    }
}

// Credentials pinned by the process environment, when both keys are set.
// A node started this way rejects credential changes via the admin API.
pub fn credentials_from_env() -> Option<Credentials> {
    let access_key = std::env::var(ENV_ACCESS_KEY).ok()?;
    let secret_key = std::env::var(ENV_SECRET_KEY).ok()?;
    auth::new_credentials(access_key, secret_key).ok()
}
