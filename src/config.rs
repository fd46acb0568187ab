//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Sentinel label meaning "generate a fresh key pair".
pub const GENERATE_KEY_LABEL: &str = "none";

/// Cherry Servers configuration derived from environment variables and
/// configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "CHERRYSERVERS")]
pub struct CherryConfig {
    /// API token used for authentication. This value is required.
    pub auth_token: String,
    /// Project that owns new servers.
    #[ortho_config(default = String::new())]
    pub project_id: String,
    /// Hostname for the server. Falls back to the machine name when empty.
    #[ortho_config(default = String::new())]
    pub hostname: String,
    /// User name for SSH connections.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// Label of a key already registered with Cherry Servers, or `none` to
    /// generate a new key pair.
    #[ortho_config(default = "none".to_owned())]
    pub existing_ssh_key_label: String,
    /// Path of the private key matching `existing_ssh_key_label`.
    pub existing_ssh_key_path: Option<String>,
    /// Port for SSH connections.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Operating system image.
    #[ortho_config(default = "Ubuntu 16.04 64bit".to_owned())]
    pub image: String,
    /// Deployment region.
    #[ortho_config(default = "EU-East-1".to_owned())]
    pub region: String,
    /// Plan identifier.
    #[ortho_config(default = "94".to_owned())]
    pub plan: String,
    /// Path to a file with cloud-init user data (`CHERRYSERVERS_USERDATA`).
    pub userdata: Option<String>,
    /// Comma-separated `key=value` tags applied to the server.
    pub tags: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl CherryConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to your configuration file",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("cherry-machine")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns `true` when an existing remote key should be reused.
    #[must_use]
    pub fn reuses_existing_key(&self) -> bool {
        self.existing_ssh_key_label != GENERATE_KEY_LABEL
    }

    /// Returns the existing key path when one is configured and non-blank.
    #[must_use]
    pub fn existing_key_path(&self) -> Option<&str> {
        self.existing_ssh_key_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
    }

    /// Parses the comma-separated `tags` option into key/value pairs.
    ///
    /// Entries without `=` become keys with an empty value; blank entries are
    /// skipped.
    #[must_use]
    pub fn parsed_tags(&self) -> Vec<(String, String)> {
        let Some(raw) = self.tags.as_deref() else {
            return Vec::new();
        };
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) => (key.trim().to_owned(), value.trim().to_owned()),
                None => (entry.to_owned(), String::new()),
            })
            .collect()
    }

    /// Performs semantic validation. Error messages include guidance on how to
    /// provide missing values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the auth token is empty or
    /// when an existing key label is set without a key path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.auth_token,
            &FieldMetadata::new(
                "Cherry Servers auth token",
                "CHERRYSERVERS_AUTH_TOKEN",
                "auth_token",
            ),
        )?;
        if self.reuses_existing_key() && self.existing_key_path().is_none() {
            return Err(ConfigError::MissingKeyPath {
                label: self.existing_ssh_key_label.clone(),
            });
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Raised when an existing key label is given without its path.
    #[error(
        "existing ssh key label '{label}' requires CHERRYSERVERS_EXISTING_SSH_KEY_PATH as well"
    )]
    MissingKeyPath {
        /// Label that was configured.
        label: String,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
