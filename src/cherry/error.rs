//! Error types for the Cherry Servers driver.

use crate::config::ConfigError;
use crate::driver::DriverError;
use crate::ssh::SshKeyError;
use crate::user_data::UserDataError;
use thiserror::Error;

/// Errors raised by the Cherry Servers driver.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CherryDriverError {
    /// Raised when the configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when a server request is missing a required field.
    #[error("invalid server request: {0}")]
    Validation(String),
    /// Raised when no remote key carries the requested label.
    #[error("could not find ssh key labelled '{label}'")]
    KeyNotFound {
        /// Label that was looked up.
        label: String,
    },
    /// Raised when the remote key does not match the local public key.
    #[error("remote key {remote} does not match local key {local}")]
    FingerprintMismatch {
        /// Remote fingerprint with separators removed.
        remote: String,
        /// Fingerprint computed from the local public key.
        local: String,
    },
    /// Local key handling failed.
    #[error(transparent)]
    SshKey(#[from] SshKeyError),
    /// User data could not be loaded.
    #[error(transparent)]
    UserData(#[from] UserDataError),
    /// Raised when an operation needs a server that was never created.
    #[error("no server has been created for machine {machine}")]
    ServerNotCreated {
        /// Host-assigned machine name.
        machine: String,
    },
    /// Raised when the server has no primary IP address yet.
    #[error("server {server_id} has no primary IP address")]
    IpNotSet {
        /// Provider server identifier.
        server_id: String,
    },
    /// Raised when an operation requires a running machine.
    #[error("machine is not running (state {state})")]
    NotRunning {
        /// State observed instead.
        state: String,
    },
    /// Raised when the provisioning wait loop exhausts its attempts.
    #[error("timed out waiting for active server {server_id} after {attempts} attempts")]
    Timeout {
        /// Provider server identifier.
        server_id: String,
        /// Number of polls performed.
        attempts: u32,
    },
    /// Raised when the API answers with a non-success status.
    #[error("API request failed with status {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },
    /// Wrapper for transport and decoding failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message describing the failure.
        message: String,
    },
}

impl From<DriverError> for CherryDriverError {
    fn from(value: DriverError) -> Self {
        match value {
            DriverError::Validation(field) => Self::Validation(field),
        }
    }
}

impl From<ConfigError> for CherryDriverError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<reqwest::Error> for CherryDriverError {
    fn from(value: reqwest::Error) -> Self {
        Self::Provider {
            message: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for CherryDriverError {
    fn from(value: serde_json::Error) -> Self {
        Self::Provider {
            message: value.to_string(),
        }
    }
}
