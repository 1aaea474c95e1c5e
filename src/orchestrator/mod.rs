//! Container lifecycle workflows.
//!
//! [`Drover`] composes the asynchronous remote API into the multi-step
//! sequences callers actually want: create-and-wait, stop-then-delete,
//! full recreate. Every entry point returns an [`Outcome`] envelope; no
//! error escapes as a panic or a bare `Err`.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::{ContainerApi, LxdClient};
use crate::cluster::{NodeResolver, StaticNode};
use crate::config::DroverConfig;
use crate::error::ApiError;
use crate::scheduler::{ActionScheduler, FollowUp, SpawnScheduler};
use crate::types::{ImageSpec, Operation, OperationStatus, Outcome};

mod state_reader;
mod trust;

/// Login account whose key file is replaced when none is specified.
const DEFAULT_LOGIN_USER: &str = "ubuntu";

/// Options for [`Drover::attach_public_key`].
#[derive(Debug, Clone, Default)]
pub struct AttachOptions {
    /// Account whose `authorized_keys` file is replaced; defaults to `ubuntu`.
    pub username: Option<String>,
}

/// Drives container lifecycles on a remote hypervisor.
///
/// Holds no mutable state: clones share the underlying client and
/// scheduler, concurrent calls are safe, and every call resolves its
/// target node afresh through the injected [`NodeResolver`].
#[derive(Clone)]
pub struct Drover {
    api: Arc<dyn ContainerApi>,
    scheduler: Arc<dyn ActionScheduler>,
    nodes: Arc<dyn NodeResolver>,
    config: DroverConfig,
}

impl Drover {
    /// Production wiring: HTTP client plus detached-task scheduler.
    pub fn new(config: DroverConfig, nodes: Arc<dyn NodeResolver>) -> crate::Result<Self> {
        let api: Arc<dyn ContainerApi> = Arc::new(LxdClient::new(&config)?);
        let scheduler: Arc<dyn ActionScheduler> = Arc::new(SpawnScheduler::new(
            Arc::clone(&api),
            Arc::clone(&nodes),
            config.operation_timeout(),
        ));
        Ok(Self {
            api,
            scheduler,
            nodes,
            config,
        })
    }

    /// Production wiring against one fixed node address.
    pub fn with_node(config: DroverConfig, address: impl Into<String>) -> crate::Result<Self> {
        Self::new(config, Arc::new(StaticNode::new(address)))
    }

    /// Custom wiring for embedders and tests.
    pub fn with_parts(
        api: Arc<dyn ContainerApi>,
        scheduler: Arc<dyn ActionScheduler>,
        nodes: Arc<dyn NodeResolver>,
        config: DroverConfig,
    ) -> Self {
        Self {
            api,
            scheduler,
            nodes,
            config,
        }
    }

    pub fn config(&self) -> &DroverConfig {
        &self.config
    }

    /// Create a container from `image` (or the configured default) and wait
    /// for the build to finish.
    pub async fn create(&self, hostname: &str, image: Option<&ImageSpec>) -> Outcome {
        match self.create_inner(hostname, image).await {
            Ok(op) => Self::outcome_when(op, OperationStatus::Success),
            Err(e) => Outcome::err(e),
        }
    }

    /// Create a container, then dispatch its first start asynchronously.
    ///
    /// The envelope reflects only the creation; the start runs detached so
    /// callers are not held up by boot time.
    pub async fn launch(&self, hostname: &str, image: Option<&ImageSpec>) -> Outcome {
        let outcome = self.create(hostname, image).await;
        if outcome.success {
            self.dispatch_start(hostname);
        }
        outcome
    }

    /// Ask the hypervisor to start a container.
    ///
    /// Succeeds once the start request is accepted and underway; the boot
    /// itself finishes in the background.
    pub async fn start(&self, hostname: &str) -> Outcome {
        match self.start_inner(hostname).await {
            Ok(op) => Self::outcome_when(op, OperationStatus::Running),
            Err(e) => Outcome::err(e),
        }
    }

    /// Stop a container and wait until it is down.
    pub async fn stop(&self, hostname: &str) -> Outcome {
        match self.stop_inner(hostname).await {
            Ok(op) => Self::outcome_when(op, OperationStatus::Success),
            Err(e) => Outcome::err(e),
        }
    }

    /// Stop a container if it is running, then schedule its deletion after
    /// the configured grace interval.
    ///
    /// A container that is already stopped skips the stop step entirely.
    /// The envelope reflects the stop step; the deletion runs detached and
    /// its outcome is only logged.
    pub async fn destroy(&self, hostname: &str) -> Outcome {
        let shown = self.show(hostname).await;
        let already_stopped = shown
            .data
            .as_ref()
            .and_then(|c| c.status)
            .is_some_and(|s| s.is_stopped());

        let outcome = if already_stopped {
            debug!("Container '{}' is already stopped, skipping stop", hostname);
            Outcome::done()
        } else {
            self.stop(hostname).await
        };

        if outcome.success {
            match self.scheduler.schedule_after(
                self.config.destroy_delay(),
                FollowUp::Delete,
                hostname,
            ) {
                Ok(()) => info!(
                    "🗑️ Deletion of '{}' scheduled in {}s",
                    hostname, self.config.wait_interval_seconds
                ),
                Err(e) => warn!(
                    "Container '{}' stopped but its deletion could not be dispatched: {}",
                    hostname, e
                ),
            }
        }
        outcome
    }

    /// Rebuild a container from scratch: stop it when needed, delete it,
    /// create it again, then dispatch a fresh start.
    ///
    /// Steps run strictly in order and the first non-success aborts the
    /// rest, so a container that failed to delete is never re-created over
    /// itself. Steps that already completed are not rolled back.
    pub async fn recreate(&self, hostname: &str, image: Option<&ImageSpec>) -> Outcome {
        match self.recreate_inner(hostname, image).await {
            Ok(op) => {
                let outcome = Self::outcome_when(op, OperationStatus::Success);
                if outcome.success {
                    self.dispatch_start(hostname);
                }
                outcome
            }
            Err(e) => Outcome::err(e),
        }
    }

    /// Replace the SSH `authorized_keys` of the container's login account
    /// with `public_key`.
    pub async fn attach_public_key(
        &self,
        hostname: &str,
        public_key: &str,
        options: &AttachOptions,
    ) -> Outcome {
        match self.attach_inner(hostname, public_key, options).await {
            Ok(op) => Self::outcome_when(op, OperationStatus::Success),
            Err(e) => Outcome::err(e),
        }
    }

    async fn create_inner(
        &self,
        hostname: &str,
        image: Option<&ImageSpec>,
    ) -> Result<Operation, ApiError> {
        let node = self.node().await?;
        let image = image.unwrap_or(&self.config.default_image);
        info!("📦 Creating container '{}' from image {}", hostname, image);
        self.create_and_wait(&node, hostname, image).await
    }

    async fn start_inner(&self, hostname: &str) -> Result<Operation, ApiError> {
        let node = self.node().await?;
        info!("▶️ Starting container '{}'", hostname);
        self.api.start_container(&node, hostname).await
    }

    async fn stop_inner(&self, hostname: &str) -> Result<Operation, ApiError> {
        let node = self.node().await?;
        self.stop_and_wait(&node, hostname).await
    }

    async fn recreate_inner(
        &self,
        hostname: &str,
        image: Option<&ImageSpec>,
    ) -> Result<Operation, ApiError> {
        let node = self.node().await?;
        info!("🔄 Recreating container '{}'", hostname);

        let shown = self.show(hostname).await;
        if shown.success {
            let stopped = shown
                .data
                .as_ref()
                .and_then(|c| c.status)
                .is_some_and(|s| s.is_stopped());
            if !stopped {
                let op = self.stop_and_wait(&node, hostname).await?;
                Self::require_success(op)?;
            }
            let op = self.delete_and_wait(&node, hostname).await?;
            Self::require_success(op)?;
        } else {
            debug!(
                "Container '{}' could not be shown ({}), creating from scratch",
                hostname,
                shown.error_message().unwrap_or_default()
            );
        }

        let image = image.unwrap_or(&self.config.default_image);
        self.create_and_wait(&node, hostname, image).await
    }

    async fn attach_inner(
        &self,
        hostname: &str,
        public_key: &str,
        options: &AttachOptions,
    ) -> Result<Operation, ApiError> {
        let node = self.node().await?;
        let username = options.username.as_deref().unwrap_or(DEFAULT_LOGIN_USER);
        info!("🔑 Installing public key for {}@{}", username, hostname);

        let script = format!(
            "echo \"{}\" > /home/{}/.ssh/authorized_keys",
            public_key, username
        );
        let command = vec!["bash".to_string(), "-c".to_string(), script];
        self.api.exec(&node, hostname, &command).await
    }

    async fn create_and_wait(
        &self,
        node: &str,
        hostname: &str,
        image: &ImageSpec,
    ) -> Result<Operation, ApiError> {
        let op = self.api.create_container(node, hostname, image).await?;
        debug!("Create of '{}' is operation {}", hostname, op.id);
        self.api
            .wait_for_operation(node, &op.id, self.config.operation_timeout())
            .await
    }

    async fn stop_and_wait(&self, node: &str, hostname: &str) -> Result<Operation, ApiError> {
        info!("🛑 Stopping container '{}'", hostname);
        let op = self.api.stop_container(node, hostname).await?;
        self.api
            .wait_for_operation(node, &op.id, self.config.operation_timeout())
            .await
    }

    async fn delete_and_wait(&self, node: &str, hostname: &str) -> Result<Operation, ApiError> {
        info!("🗑️ Deleting container '{}'", hostname);
        let op = self.api.delete_container(node, hostname).await?;
        self.api
            .wait_for_operation(node, &op.id, self.config.operation_timeout())
            .await
    }

    fn dispatch_start(&self, hostname: &str) {
        match self.scheduler.schedule_now(FollowUp::Start, hostname) {
            Ok(()) => info!("🚀 Start of '{}' dispatched", hostname),
            Err(e) => warn!(
                "Container '{}' created but its start could not be dispatched: {}",
                hostname, e
            ),
        }
    }

    /// Resolve the node this call should target.
    async fn node(&self) -> Result<String, ApiError> {
        self.nodes
            .reachable_node()
            .await
            .map_err(|e| ApiError::NoReachableNode {
                message: format!("{:#}", e),
            })
    }

    /// Fold a settled operation into the envelope callers see.
    fn outcome_when(op: Operation, expected: OperationStatus) -> Outcome {
        if op.status == expected {
            Outcome::done()
        } else {
            Outcome::err(Self::operation_error(op, expected))
        }
    }

    fn require_success(op: Operation) -> Result<(), ApiError> {
        if op.status.is_success() {
            Ok(())
        } else {
            Err(Self::operation_error(op, OperationStatus::Success))
        }
    }

    fn operation_error(op: Operation, expected: OperationStatus) -> ApiError {
        ApiError::OperationFailed {
            id: op.id,
            message: op.err.unwrap_or_else(|| {
                format!("operation reported {} (expected {})", op.status, expected)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(status: OperationStatus, err: Option<&str>) -> Operation {
        Operation {
            id: "op-1".to_string(),
            status,
            err: err.map(str::to_string),
        }
    }

    #[test]
    fn test_outcome_when_matching_status_succeeds() {
        let outcome = Drover::outcome_when(op(OperationStatus::Success, None), OperationStatus::Success);
        assert!(outcome.success);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_outcome_when_preserves_remote_error_text() {
        let outcome = Drover::outcome_when(
            op(OperationStatus::Failure, Some("disk full")),
            OperationStatus::Success,
        );
        assert!(!outcome.success);
        assert!(outcome.error_message().unwrap().contains("disk full"));
    }

    #[test]
    fn test_outcome_when_explains_status_mismatch() {
        let outcome = Drover::outcome_when(
            op(OperationStatus::Cancelled, None),
            OperationStatus::Running,
        );
        let message = outcome.error_message().unwrap();
        assert!(message.contains("Cancelled"));
        assert!(message.contains("Running"));
    }

    #[test]
    fn test_require_success_rejects_non_success_terminals() {
        assert!(Drover::require_success(op(OperationStatus::Success, None)).is_ok());
        assert!(Drover::require_success(op(OperationStatus::Failure, None)).is_err());
        assert!(Drover::require_success(op(OperationStatus::Cancelled, None)).is_err());
    }
}
