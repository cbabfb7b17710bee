use constant_time_eq::constant_time_eq;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Minimum length for Kodiak access key.
const ACCESS_KEY_MIN_LEN: usize = 3;

// Maximum length for Kodiak access key, used when auto-generating
// new credentials.
const ACCESS_KEY_MAX_LEN: usize = 20;

// Minimum length for Kodiak secret key.
const SECRET_KEY_MIN_LEN: usize = 8;

// Maximum secret key length for Kodiak, this
// is used when auto-generating new credentials.
const SECRET_KEY_MAX_LEN: usize = 40;

// Alpha numeric table used for generating access keys.
const ALPHA_NUMERIC_TABLE: &[u8] = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ".as_bytes();

// Total length of the alpha numeric table.
const ALPHA_NUMERIC_TABLE_LEN: u8 = ALPHA_NUMERIC_TABLE.len() as u8;

pub const DEFAULT_ACCESS_KEY: &str = "kodiakadmin";
pub const DEFAULT_SECRET_KEY: &str = "kodiakadmin";

// ACCOUNT_ON indicates that credentials are enabled
pub const ACCOUNT_ON: &str = "on";
// ACCOUNT_OFF indicates that credentials are disabled
pub const ACCOUNT_OFF: &str = "off";

pub fn is_access_key_valid(access_key: &str) -> bool {
    access_key.len() >= ACCESS_KEY_MIN_LEN
}

pub fn is_secret_key_valid(secret_key: &str) -> bool {
    secret_key.len() >= SECRET_KEY_MIN_LEN
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error(
        "access key length should be between {} and {}",
        ACCESS_KEY_MIN_LEN,
        ACCESS_KEY_MAX_LEN
    )]
    InvalidAccessKeyLen,
    #[error(
        "secret key length should be between {} and {}",
        SECRET_KEY_MIN_LEN,
        SECRET_KEY_MAX_LEN
    )]
    InvalidSecretKeyLen,
}

// Credentials holds access and secret keys.
#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct Credentials {
    #[serde(rename = "accessKey")]
    pub access_key: String,
    #[serde(rename = "secretKey")]
    pub secret_key: String,
    #[serde(skip)]
    pub status: String,
}

impl Credentials {
    pub fn is_valid(&self) -> bool {
        if self.status == ACCOUNT_OFF {
            return false;
        }
        is_access_key_valid(&self.access_key) && is_secret_key_valid(&self.secret_key)
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        if !self.is_valid() {
            return false;
        }
        self.access_key == other.access_key
            && constant_time_eq(self.secret_key.as_bytes(), other.secret_key.as_bytes())
    }
}

pub fn new_credentials(access_key: String, secret_key: String) -> anyhow::Result<Credentials> {
    if access_key.len() < ACCESS_KEY_MIN_LEN || access_key.len() > ACCESS_KEY_MAX_LEN {
        return Err(AuthError::InvalidAccessKeyLen.into());
    }
    if secret_key.len() < SECRET_KEY_MIN_LEN || secret_key.len() > SECRET_KEY_MAX_LEN {
        return Err(AuthError::InvalidSecretKeyLen.into());
    }

    Ok(Credentials {
        access_key,
        secret_key,
        status: ACCOUNT_ON.into(),
    })
}

pub fn generate_credentials() -> anyhow::Result<Credentials> {
    let mut rng = rand::thread_rng();
    let mut read_bytes = |size: usize| {
        let mut data = vec![0u8; size];
        rng.fill(&mut data[..]);
        data
    };

    let mut key_bytes = read_bytes(ACCESS_KEY_MAX_LEN);
    for b in &mut key_bytes {
        *b = ALPHA_NUMERIC_TABLE[(*b % ALPHA_NUMERIC_TABLE_LEN) as usize];
    }
    let access_key = String::from_utf8(key_bytes)?;

    let key_bytes = read_bytes(SECRET_KEY_MAX_LEN);
    let secret_key_str = &base64::encode(&key_bytes)[..SECRET_KEY_MAX_LEN];
    let secret_key = secret_key_str.replace("/", "+");

    new_credentials(access_key, secret_key)
}
