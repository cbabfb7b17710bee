use thiserror::Error;

use crate::utils::DateTime;

// Errors returned by the admin control plane. Validation and conflict
// errors are always raised before any state mutation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdminError {
    // Heal path validation.
    #[error("A heal-start request with a non-empty object prefix requires a bucket")]
    HealMissingBucket,

    #[error("The specified bucket is not valid")]
    InvalidBucketName,

    #[error("The specified object prefix is not valid")]
    InvalidObjectPrefix,

    // A heal sequence is already running on the requested path. Carries
    // the running sequence's token and start time so the operator can
    // poll it or retry with force-start.
    #[error("Heal is already running on the given path (use force-start to override)")]
    HealInProgress {
        client_token: String,
        start_time: DateTime,
    },

    // The supplied client token does not match the sequence currently
    // registered for the path, e.g. it was superseded by a force-start.
    #[error("Client token mismatch")]
    InvalidClientToken,

    #[error("Configuration data provided exceeds the allowed maximum size")]
    ConfigTooLarge,

    #[error("Configuration data provided is invalid: {detail}")]
    BadConfig { detail: String },

    #[error("Request body is malformed: {detail}")]
    BadRequest { detail: String },

    #[error("Invalid credentials: {detail}")]
    InvalidCredentials { detail: String },

    // Credentials are pinned by the process environment and cannot be
    // changed through the admin API.
    #[error("Credentials are sourced from the environment and cannot be modified")]
    CredentialsImmutable,

    // The storage layer could not reach write quorum; previously
    // committed configuration is left untouched.
    #[error("Configuration update failed: storage write quorum not met")]
    NoQuorum,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AdminError {
    pub fn bad_config<S: Into<String>>(detail: S) -> Self {
        AdminError::BadConfig {
            detail: detail.into(),
        }
    }

    pub fn bad_request<S: Into<String>>(detail: S) -> Self {
        AdminError::BadRequest {
            detail: detail.into(),
        }
    }
}
