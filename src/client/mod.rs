//! Client-side view of the hypervisor's asynchronous REST API.
//!
//! The orchestrator talks to the hypervisor exclusively through
//! [`ContainerApi`], so workflows can be exercised against mocks and the
//! HTTP adapter stays swappable. Every method takes the node address it
//! should target; implementations open a fresh connection per call rather
//! than pinning a node for the orchestrator's lifetime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::ApiError;
use crate::types::{ContainerStatus, ImageSpec, Operation};

pub mod http;
mod wire;

pub use http::LxdClient;

/// Descriptor metadata for a single container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub name: String,
    pub status: ContainerStatus,
    pub profiles: Vec<String>,
    pub config: HashMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl ContainerRecord {
    /// Human-readable description of the image the container was built from.
    pub fn image_description(&self) -> Option<&str> {
        self.config.get("image.description").map(String::as_str)
    }
}

/// Runtime state for a single container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerState {
    pub status: ContainerStatus,
    pub network: HashMap<String, NetworkInterface>,
}

impl ContainerState {
    /// First IPv4 address leased on the given interface, if any.
    pub fn ipv4_address(&self, interface: &str) -> Option<&str> {
        self.network
            .get(interface)?
            .addresses
            .iter()
            .find(|addr| addr.family == "inet")
            .map(|addr| addr.address.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub addresses: Vec<InterfaceAddress>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceAddress {
    /// Address family as reported by the remote: `inet` or `inet6`.
    pub family: String,
    pub address: String,
}

/// Asynchronous, operation-based container API.
///
/// Mutating calls hand back an [`Operation`] that must be driven to a
/// terminal status with [`ContainerApi::wait_for_operation`]; only
/// [`ContainerApi::exec`] waits internally, because callers never need the
/// in-flight handle of a command run.
#[async_trait]
pub trait ContainerApi: Send + Sync {
    /// Request creation of a container from an image source.
    async fn create_container(
        &self,
        node: &str,
        hostname: &str,
        image: &ImageSpec,
    ) -> Result<Operation, ApiError>;

    /// Request a state change to running.
    async fn start_container(&self, node: &str, hostname: &str) -> Result<Operation, ApiError>;

    /// Request a state change to stopped.
    async fn stop_container(&self, node: &str, hostname: &str) -> Result<Operation, ApiError>;

    /// Request removal of a (stopped) container.
    async fn delete_container(&self, node: &str, hostname: &str) -> Result<Operation, ApiError>;

    /// Fetch a container's descriptor; absent containers yield
    /// [`ApiError::NotFound`].
    async fn container(&self, node: &str, hostname: &str) -> Result<ContainerRecord, ApiError>;

    /// Fetch a container's runtime state.
    async fn container_state(&self, node: &str, hostname: &str)
    -> Result<ContainerState, ApiError>;

    /// Hostnames of all containers on the node.
    async fn containers(&self, node: &str) -> Result<Vec<String>, ApiError>;

    /// Run a command inside the container and wait for it to finish.
    async fn exec(
        &self,
        node: &str,
        hostname: &str,
        command: &[String],
    ) -> Result<Operation, ApiError>;

    /// Poll an operation until it reaches a terminal status or the deadline
    /// passes; never returns a non-terminal operation.
    async fn wait_for_operation(
        &self,
        node: &str,
        operation_id: &str,
        timeout: Duration,
    ) -> Result<Operation, ApiError>;

    /// Submit this client's certificate to the node's trust store.
    async fn register_certificate(
        &self,
        node: &str,
        certificate: &str,
        password: &str,
    ) -> Result<(), ApiError>;
}
