//! SSH key lifecycle
//!
//! Instances are only reachable through the cluster's SSH key, so no
//! instance is created before one is registered. The private key lives in
//! `keys/{label}_rsa` beside the config document; the provider side is the
//! registered public key, whose id is committed to the document's
//! `ssh-key` entry.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::ConfigStore;
use crate::provider::{ProviderGateway, SshKeyInfo};
use crate::{Error, Result};

/// Directory the generated keypairs are written to
pub const KEYS_DIR: &str = "keys";

/// Path of the private key file for a cluster label
pub fn key_path(label: &str) -> PathBuf {
    PathBuf::from(KEYS_DIR).join(format!("{label}_rsa"))
}

/// Manages the cluster's SSH key on disk and at the provider.
pub struct KeyManager<G> {
    store: ConfigStore,
    gateway: G,
}

impl<G: ProviderGateway> KeyManager<G> {
    /// Create a key manager over the given store and gateway
    pub fn new(store: ConfigStore, gateway: G) -> Self {
        Self { store, gateway }
    }

    /// Generate a fresh RSA keypair, register the public key with the
    /// provider, and commit the returned key id.
    pub async fn generate_and_register(&self) -> Result<String> {
        let state = self.store.load()?;

        tokio::fs::create_dir_all(KEYS_DIR).await?;
        let path = key_path(&state.label);
        let comment = format!("{} cluster", state.label);

        let status = tokio::process::Command::new("ssh-keygen")
            .args(["-t", "rsa", "-b", "4096", "-C", &comment, "-N", ""])
            .arg("-f")
            .arg(&path)
            .status()
            .await
            .map_err(|e| Error::command(format!("ssh-keygen: {e}")))?;
        if !status.success() {
            return Err(Error::command(format!(
                "ssh-keygen failed for {}",
                path.display()
            )));
        }

        // ssh-keygen appends .pub to the exact file name we passed
        let public = tokio::fs::read_to_string(format!("{}.pub", path.display())).await?;
        let public = public.lines().next().unwrap_or_default().to_string();

        let name = format!("{} Cluster Key", state.label);
        let id = self.gateway.create_ssh_key(&name, &public).await?;
        self.store.commit_ssh_key(&id)?;
        info!(key = %id, path = %path.display(), "SSH key registered");
        Ok(id)
    }

    /// Unregister the provider key and clear the committed id. Local key
    /// files are removed best-effort.
    pub async fn destroy(&self) -> Result<bool> {
        let state = self.store.load()?;
        if state.ssh_key.is_empty() {
            warn!("no SSH key registered");
            return Ok(false);
        }

        if let Err(e) = self.gateway.destroy_ssh_key(&state.ssh_key).await {
            warn!(key = %state.ssh_key, error = %e, "could not destroy provider key");
            return Ok(false);
        }
        self.store.commit_ssh_key("")?;

        let path = key_path(&state.label);
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(format!("{}.pub", path.display()));
        info!("SSH key destroyed");
        Ok(true)
    }

    /// Keys currently registered at the provider
    pub async fn list(&self) -> Result<Vec<SshKeyInfo>> {
        self.gateway.list_ssh_keys().await
    }

    /// Commit an existing provider key id into the document
    pub fn register(&self, id: &str) -> Result<()> {
        self.store.commit_ssh_key(id)?;
        info!(key = %id, "SSH key registered in config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_path_is_derived_from_the_label() {
        assert_eq!(key_path("demo"), PathBuf::from("keys/demo_rsa"));
    }
}
