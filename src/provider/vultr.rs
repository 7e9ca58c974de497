//! Vultr adapter for the provider gateway
//!
//! Talks to the legacy v1 API: form-encoded POSTs for mutations, an
//! `API-Key` header on every request, and numeric `DCID`/`VPSPLANID`/`OSID`
//! codes resolved from the symbolic identifiers in the cluster document.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{Addresses, ProviderGateway, SshKeyInfo};
use crate::{catalog, Error, Result, PLACEHOLDER_ADDR};

const API_ENDPOINT: &str = "https://api.vultr.com";

const CREATE_SERVER: &str = "/v1/server/create";
const DESTROY_SERVER: &str = "/v1/server/destroy";
const UPGRADE_SERVER: &str = "/v1/server/upgrade_plan";
const NODE_IPV4: &str = "/v1/server/list_ipv4";
const ENABLE_PRIVATE_NETWORK: &str = "/v1/server/private_network_enable";

const CREATE_SSHKEY: &str = "/v1/sshkey/create";
const DESTROY_SSHKEY: &str = "/v1/sshkey/destroy";
const LIST_SSHKEY: &str = "/v1/sshkey/list";

const API_KEY_HEADER: &str = "API-Key";

/// Gateway implementation for the Vultr v1 API.
#[derive(Debug, Clone)]
pub struct VultrGateway {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    ssh_key_id: String,
}

impl VultrGateway {
    /// Create a gateway using the given API credential
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: API_ENDPOINT.to_string(),
            api_key: api_key.into(),
            ssh_key_id: String::new(),
        }
    }

    /// Set the SSH key id attached to created instances
    pub fn with_ssh_key(mut self, id: impl Into<String>) -> Self {
        self.ssh_key_id = id.into();
        self
    }

    /// Override the API endpoint (used by tests and mirrors)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn post_form(&self, path: &str, form: &[(&str, String)]) -> Result<String> {
        let resp = self
            .http
            .post(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .form(form)
            .send()
            .await
            .map_err(|e| Error::provider(format!("{path}: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::provider(format!("{path}: {e}")))?;

        if !status.is_success() {
            return Err(Error::provider(format!("{path} failed ({status}): {body}")));
        }
        Ok(body)
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let resp = self
            .http
            .get(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::provider(format!("{path}: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::provider(format!("{path}: {e}")))?;

        if !status.is_success() {
            return Err(Error::provider(format!("{path} failed ({status}): {body}")));
        }
        serde_json::from_str(&body)
            .map_err(|e| Error::provider(format!("{path}: invalid response: {e}")))
    }
}

/// The v1 API is inconsistent about numeric vs string ids
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn real_address(entry: &Value) -> Option<String> {
    entry
        .get("ip")
        .and_then(Value::as_str)
        .filter(|ip| !ip.is_empty() && *ip != PLACEHOLDER_ADDR)
        .map(str::to_string)
}

#[async_trait]
impl ProviderGateway for VultrGateway {
    async fn create_instance(
        &self,
        zone: &str,
        plan: u32,
        os: &str,
        label: &str,
    ) -> Result<String> {
        let dcid = catalog::resolve_zone(zone);
        let osid = catalog::resolve_os(os);

        let form = [
            ("DCID", dcid.to_string()),
            ("VPSPLANID", plan.to_string()),
            ("OSID", osid.to_string()),
            ("label", label.to_string()),
            ("host", label.to_string()),
            ("SSHKEYID", self.ssh_key_id.clone()),
        ];

        let body = self.post_form(CREATE_SERVER, &form).await?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| Error::provider(format!("create response is not JSON: {e}")))?;

        value
            .get("SUBID")
            .and_then(id_string)
            .ok_or_else(|| Error::provider(format!("create response missing SUBID: {body}")))
    }

    async fn destroy_instance(&self, id: &str) -> Result<()> {
        self.post_form(DESTROY_SERVER, &[("SUBID", id.to_string())])
            .await?;
        Ok(())
    }

    async fn resize_instance(&self, id: &str, plan: u32) -> Result<()> {
        self.post_form(
            UPGRADE_SERVER,
            &[("SUBID", id.to_string()), ("VPSPLANID", plan.to_string())],
        )
        .await?;
        Ok(())
    }

    async fn list_addresses(&self, id: &str) -> Result<Addresses> {
        let body = self.get_json(NODE_IPV4, &[("SUBID", id)]).await?;

        // response shape: { "<SUBID>": [ {"ip": ..., "type": "main_ip"}, ... ] }
        let mut addrs = Addresses::default();
        if let Some(entries) = body.get(id).and_then(Value::as_array) {
            for entry in entries {
                match entry.get("type").and_then(Value::as_str) {
                    Some("main_ip") => {
                        if let Some(ip) = real_address(entry) {
                            addrs.public_ip = Some(ip);
                        }
                    }
                    Some("private") => {
                        if let Some(ip) = real_address(entry) {
                            addrs.private_ip = Some(ip);
                        }
                    }
                    _ => {}
                }
            }
        }
        debug!(id = %id, ?addrs, "address lookup");
        Ok(addrs)
    }

    async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<String> {
        let form = [
            ("name", name.to_string()),
            ("ssh_key", public_key.to_string()),
        ];
        let body = self.post_form(CREATE_SSHKEY, &form).await?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| Error::provider(format!("sshkey response is not JSON: {e}")))?;

        value
            .get("SSHKEYID")
            .and_then(id_string)
            .ok_or_else(|| Error::provider(format!("sshkey response missing SSHKEYID: {body}")))
    }

    async fn destroy_ssh_key(&self, id: &str) -> Result<()> {
        self.post_form(DESTROY_SSHKEY, &[("SSHKEYID", id.to_string())])
            .await?;
        Ok(())
    }

    async fn list_ssh_keys(&self) -> Result<Vec<SshKeyInfo>> {
        let body = self.get_json(LIST_SSHKEY, &[]).await?;

        let mut keys = Vec::new();
        if let Some(map) = body.as_object() {
            for entry in map.values() {
                let id = entry.get("SSHKEYID").and_then(id_string);
                let name = entry
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if let Some(id) = id {
                    keys.push(SshKeyInfo { id, name });
                }
            }
        }
        Ok(keys)
    }

    async fn enable_private_network(&self, id: &str) -> Result<()> {
        self.post_form(ENABLE_PRIVATE_NETWORK, &[("SUBID", id.to_string())])
            .await?;
        Ok(())
    }
}
