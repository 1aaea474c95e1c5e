//! Serde mappings for the hypervisor's REST wire format.
//!
//! Every endpoint answers with the same outer envelope; `metadata` carries
//! the endpoint-specific payload. Unknown fields are ignored so newer
//! daemon versions do not break deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{ContainerRecord, ContainerState, InterfaceAddress, NetworkInterface};
use crate::types::{ContainerStatus, Operation, OperationStatus};

/// Outer envelope of every response: `type` is `sync`, `async`, or `error`.
#[derive(Debug, Deserialize)]
pub(crate) struct WireResponse<T> {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_code: Option<i64>,
    // Missing `metadata` already decodes to `None`; a `default` attribute
    // here would put a `T: Default` bound on the derived impl.
    pub metadata: Option<T>,
}

/// Background-operation body: the `metadata` of async responses and the
/// payload returned by operation wait queries.
#[derive(Debug, Deserialize)]
pub(crate) struct WireOperation {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub err: String,
}

impl From<WireOperation> for Operation {
    fn from(wire: WireOperation) -> Self {
        Operation {
            id: wire.id,
            status: OperationStatus::parse(&wire.status),
            err: if wire.err.is_empty() {
                None
            } else {
                Some(wire.err)
            },
        }
    }
}

/// Container descriptor payload.
#[derive(Debug, Deserialize)]
pub(crate) struct WireContainer {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub profiles: Vec<String>,
    #[serde(default)]
    pub config: HashMap<String, String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<WireContainer> for ContainerRecord {
    fn from(wire: WireContainer) -> Self {
        ContainerRecord {
            name: wire.name,
            status: ContainerStatus::parse(&wire.status),
            profiles: wire.profiles,
            config: wire.config,
            created_at: wire.created_at,
        }
    }
}

/// Container runtime-state payload. `network` is null until the container
/// has run at least once.
#[derive(Debug, Deserialize)]
pub(crate) struct WireContainerState {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub network: Option<HashMap<String, WireNetwork>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireNetwork {
    #[serde(default)]
    pub addresses: Vec<WireAddress>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireAddress {
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub address: String,
}

impl From<WireContainerState> for ContainerState {
    fn from(wire: WireContainerState) -> Self {
        let network = wire
            .network
            .unwrap_or_default()
            .into_iter()
            .map(|(name, interface)| {
                let addresses = interface
                    .addresses
                    .into_iter()
                    .map(|addr| InterfaceAddress {
                        family: addr.family,
                        address: addr.address,
                    })
                    .collect();
                (name, NetworkInterface { addresses })
            })
            .collect();
        ContainerState {
            status: ContainerStatus::parse(&wire.status),
            network,
        }
    }
}

/// `POST /1.0/containers` body.
#[derive(Debug, Serialize)]
pub(crate) struct CreateRequest {
    pub name: String,
    pub source: CreateSource,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateSource {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub server: String,
    pub protocol: String,
    pub alias: String,
}

/// `PUT /1.0/containers/{name}/state` body.
#[derive(Debug, Serialize)]
pub(crate) struct StateRequest {
    pub action: &'static str,
}

/// `POST /1.0/containers/{name}/exec` body.
#[derive(Debug, Serialize)]
pub(crate) struct ExecRequest {
    pub command: Vec<String>,
    #[serde(rename = "wait-for-websocket")]
    pub wait_for_websocket: bool,
    #[serde(rename = "record-output")]
    pub record_output: bool,
    pub interactive: bool,
}

/// `POST /1.0/certificates` body.
#[derive(Debug, Serialize)]
pub(crate) struct CertificateRequest {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub certificate: String,
    pub password: String,
}

/// Last path segment of an API reference like `/1.0/operations/<id>`.
pub(crate) fn trailing_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
