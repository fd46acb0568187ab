//! Wire types for the Cherry Servers API.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::driver::ServerRequest;

/// Address type the provider assigns to a server's main routable address.
pub const PRIMARY_IP_TYPE: &str = "primary-ip";

/// Status reported once a server is fully deployed.
pub const ACTIVE_STATE: &str = "active";

/// Server record as returned by the provider.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Server {
    /// Provider identifier.
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// Hostname assigned to the server.
    #[serde(default)]
    pub hostname: String,
    /// Raw lifecycle status (for example `provisioning` or `active`).
    #[serde(default)]
    pub state: String,
    /// Addresses assigned to the server.
    #[serde(default)]
    pub ip_addresses: Vec<IpAddressRecord>,
}

impl Server {
    /// Returns the first non-empty address tagged as the primary IP.
    #[must_use]
    pub fn primary_ip(&self) -> Option<&str> {
        self.ip_addresses
            .iter()
            .find(|ip| ip.address_type == PRIMARY_IP_TYPE && !ip.address.is_empty())
            .map(|ip| ip.address.as_str())
    }

    /// Returns the primary IP only when the server is also active.
    ///
    /// Both conditions must hold on this single observation.
    #[must_use]
    pub fn ready_address(&self) -> Option<&str> {
        if self.state != ACTIVE_STATE {
            return None;
        }
        self.primary_ip()
    }
}

/// An address attached to a server.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct IpAddressRecord {
    /// Textual IPv4 or IPv6 address.
    #[serde(default)]
    pub address: String,
    /// Address classification (for example `primary-ip` or `floating-ip`).
    #[serde(rename = "type", default)]
    pub address_type: String,
}

/// SSH key registered with the provider.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct SshKey {
    /// Provider identifier.
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// Human readable label.
    #[serde(default)]
    pub label: String,
    /// Colon-delimited MD5 fingerprint.
    #[serde(default)]
    pub fingerprint: String,
}

/// Power actions accepted by the server actions endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PowerAction {
    /// Power the server on.
    PowerOn,
    /// Power the server off.
    PowerOff,
    /// Reboot the server.
    Reboot,
}

impl PowerAction {
    /// Wire name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PowerOn => "power-on",
            Self::PowerOff => "power-off",
            Self::Reboot => "reboot",
        }
    }
}

#[derive(Serialize)]
pub(crate) struct ActionBody {
    #[serde(rename = "type")]
    pub(crate) action_type: &'static str,
}

#[derive(Serialize)]
pub(crate) struct CreateServerBody<'a> {
    plan_id: &'a str,
    hostname: &'a str,
    image: &'a str,
    region: &'a str,
    ssh_keys: &'a [String],
    ip_addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    tags: BTreeMap<&'a str, &'a str>,
}

impl<'a> From<&'a ServerRequest> for CreateServerBody<'a> {
    fn from(request: &'a ServerRequest) -> Self {
        Self {
            plan_id: &request.plan,
            hostname: &request.hostname,
            image: &request.image,
            region: &request.region,
            ssh_keys: &request.ssh_key_ids,
            ip_addresses: Vec::new(),
            user_data: request.user_data.as_deref(),
            tags: request
                .tags
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct CreateSshKeyBody<'a> {
    pub(crate) label: &'a str,
    pub(crate) key: &'a str,
}

/// Error payload returned by the API on failure.
#[derive(Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub(crate) message: String,
}

/// Accepts identifiers encoded either as JSON numbers or strings.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(value) => value.to_string(),
        RawId::Text(value) => value,
    })
}
