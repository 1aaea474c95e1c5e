//! Read-only container queries.

use tracing::debug;

use super::Drover;
use crate::error::ApiError;
use crate::types::{Container, Outcome};

/// Interface queried for the container's IPv4 lease.
const PRIMARY_INTERFACE: &str = "eth0";

impl Drover {
    /// Fetch a container's descriptor and runtime state as one view.
    ///
    /// The runtime state is authoritative for `status` (the descriptor can
    /// lag behind a transition in flight); the descriptor contributes the
    /// provenance fields. An absent container fails with the not-found
    /// error before any state query is made; a container without an IPv4
    /// lease yet simply has no `ip_address`, which is not an error.
    pub async fn show(&self, hostname: &str) -> Outcome<Container> {
        match self.show_inner(hostname).await {
            Ok(container) => Outcome::ok(container),
            Err(e) => Outcome::err(e),
        }
    }

    /// List the containers known to the resolved node, by hostname only.
    pub async fn list(&self) -> Outcome<Vec<Container>> {
        match self.list_inner().await {
            Ok(containers) => Outcome::ok(containers),
            Err(e) => Outcome::err(e),
        }
    }

    async fn show_inner(&self, hostname: &str) -> Result<Container, ApiError> {
        let node = self.node().await?;
        let record = self.api.container(&node, hostname).await?;
        let state = self.api.container_state(&node, hostname).await?;

        let ip_address = state.ipv4_address(PRIMARY_INTERFACE).map(str::to_string);
        let image_description = record.image_description().map(str::to_string);
        debug!(
            "Container '{}' is {} (ip: {})",
            record.name,
            state.status,
            ip_address.as_deref().unwrap_or("none")
        );

        Ok(Container {
            hostname: record.name,
            status: Some(state.status),
            ip_address,
            image_description,
            profiles: record.profiles,
            created_at: record.created_at,
        })
    }

    async fn list_inner(&self) -> Result<Vec<Container>, ApiError> {
        let node = self.node().await?;
        let names = self.api.containers(&node).await?;
        debug!("{} containers on {}", names.len(), node);
        Ok(names.into_iter().map(Container::named).collect())
    }
}
