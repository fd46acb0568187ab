//! SSH key reconciliation for the Cherry Servers driver.
//!
//! A machine either reuses a key already registered with the provider (looked
//! up by label and checked against the local public key) or gets a freshly
//! generated key pair registered under the machine name.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::command::CommandRunner;
use crate::ssh::{copy_key_pair, fingerprint, read_public_key, strip_separators};
use crate::util::expand_tilde;

use super::{CherryApi, CherryDriver, CherryDriverError};

/// Checks a provider fingerprint against one computed locally.
///
/// Colons are stripped from `remote` before an exact comparison.
///
/// # Errors
///
/// Returns [`CherryDriverError::FingerprintMismatch`] naming both values when
/// they differ.
pub fn verify_fingerprint(remote: &str, local: &str) -> Result<(), CherryDriverError> {
    let stripped = strip_separators(remote);
    if stripped == local {
        return Ok(());
    }
    Err(CherryDriverError::FingerprintMismatch {
        remote: stripped,
        local: local.to_owned(),
    })
}

impl<A: CherryApi, R: CommandRunner> CherryDriver<A, R> {
    fn existing_key_source(&self) -> Option<Utf8PathBuf> {
        self.config
            .existing_key_path()
            .map(|path| Utf8PathBuf::from(expand_tilde(path)))
    }

    /// Resolves and verifies the configured existing key, recording its id.
    pub(super) async fn check_existing_key(&mut self) -> Result<(), CherryDriverError> {
        if !self.config.reuses_existing_key() {
            return Ok(());
        }
        self.config.validate()?;
        let Some(source) = self.existing_key_source() else {
            return Ok(());
        };
        let label = self.config.existing_ssh_key_label.clone();
        let key_id = self.reconcile_existing_key(&label, &source).await?;
        debug!(%label, %key_id, "existing ssh key verified");
        self.ssh_key_id = Some(key_id);
        Ok(())
    }

    async fn reconcile_existing_key(
        &self,
        label: &str,
        private_key: &Utf8Path,
    ) -> Result<String, CherryDriverError> {
        let keys = self.api.list_ssh_keys().await?;
        let remote = keys
            .into_iter()
            .find(|key| key.label == label)
            .ok_or_else(|| CherryDriverError::KeyNotFound {
                label: label.to_owned(),
            })?;

        let public_key = read_public_key(private_key)?;
        let local = fingerprint(&public_key)?;
        verify_fingerprint(&remote.fingerprint, &local)?;
        Ok(remote.id)
    }

    /// Places a private key and its public half at `key_path`.
    fn prepare_key_material(&self, key_path: &Utf8Path) -> Result<(), CherryDriverError> {
        if let Some(source) = self.existing_key_source() {
            debug!(%source, destination = %key_path, "copying existing ssh key pair");
            copy_key_pair(&source, key_path)?;
            return Ok(());
        }
        debug!(destination = %key_path, "generating new ssh key pair");
        self.keygen
            .generate(key_path, &self.context.machine_name)?;
        Ok(())
    }

    /// Puts key material at `key_path` and returns the key id to authorise on
    /// the new server.
    ///
    /// An existing key is verified before anything is copied into the store.
    /// Otherwise the key placed at `key_path` is registered under the machine
    /// name.
    pub(super) async fn provision_key(
        &mut self,
        key_path: &Utf8Path,
    ) -> Result<String, CherryDriverError> {
        if self.config.reuses_existing_key() {
            let key_id = self.existing_key_id().await?;
            self.prepare_key_material(key_path)?;
            return Ok(key_id);
        }

        self.prepare_key_material(key_path)?;
        let public_key = read_public_key(key_path)?;
        let label = self.context.machine_name.as_str();
        debug!(%label, "registering ssh key");
        let key = self.api.create_ssh_key(label, &public_key).await?;
        self.ssh_key_id = Some(key.id.clone());
        Ok(key.id)
    }

    async fn existing_key_id(&mut self) -> Result<String, CherryDriverError> {
        if self.ssh_key_id.is_none() {
            self.check_existing_key().await?;
        }
        self.ssh_key_id
            .clone()
            .ok_or_else(|| CherryDriverError::KeyNotFound {
                label: self.config.existing_ssh_key_label.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_fingerprint_accepts_colon_delimited_match() {
        assert!(verify_fingerprint("aa:bb:cc", "aabbcc").is_ok());
    }

    #[test]
    fn verify_fingerprint_names_both_values_on_mismatch() {
        let err = verify_fingerprint("aa:bb:cc", "aabbcd").expect_err("mismatch");
        assert_eq!(
            err.to_string(),
            "remote key aabbcc does not match local key aabbcd"
        );
    }

    #[test]
    fn verify_fingerprint_is_case_sensitive() {
        assert!(verify_fingerprint("AA:BB", "aabb").is_err());
    }
}
