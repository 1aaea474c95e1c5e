//! Deferred follow-up actions.
//!
//! Some lifecycle steps must not hold up the caller: the start that follows
//! a launch, and the delete that trails a destroy by a grace interval. The
//! orchestrator hands those to an [`ActionScheduler`] and returns
//! immediately; outcomes of deferred actions are only logged, never
//! reported back.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::client::ContainerApi;
use crate::cluster::NodeResolver;
use crate::types::OperationStatus;

/// Follow-up actions that run detached from the call that requested them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    Start,
    Delete,
}

impl fmt::Display for FollowUp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("no async runtime available to dispatch {action} of '{hostname}'")]
    NoRuntime { action: FollowUp, hostname: String },
}

/// Dispatches lifecycle follow-ups without blocking the caller.
pub trait ActionScheduler: Send + Sync {
    /// Run `action` as soon as possible.
    fn schedule_now(&self, action: FollowUp, hostname: &str) -> Result<(), ScheduleError>;

    /// Run `action` once `delay` has elapsed.
    fn schedule_after(
        &self,
        delay: Duration,
        action: FollowUp,
        hostname: &str,
    ) -> Result<(), ScheduleError>;
}

/// Scheduler backed by detached tokio tasks.
///
/// Each dispatched action resolves its target node at execution time, so a
/// delayed delete still lands on a live node even if the fleet changed
/// while it slept.
pub struct SpawnScheduler {
    api: Arc<dyn ContainerApi>,
    nodes: Arc<dyn NodeResolver>,
    operation_timeout: Duration,
}

impl SpawnScheduler {
    pub fn new(
        api: Arc<dyn ContainerApi>,
        nodes: Arc<dyn NodeResolver>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            api,
            nodes,
            operation_timeout,
        }
    }

    fn dispatch(
        &self,
        delay: Duration,
        action: FollowUp,
        hostname: &str,
    ) -> Result<(), ScheduleError> {
        let handle = Handle::try_current().map_err(|_| ScheduleError::NoRuntime {
            action,
            hostname: hostname.to_string(),
        })?;

        let api = Arc::clone(&self.api);
        let nodes = Arc::clone(&self.nodes);
        let timeout = self.operation_timeout;
        let hostname = hostname.to_string();
        debug!("Dispatching {} of '{}' after {:?}", action, hostname, delay);

        handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Self::run(api, nodes, timeout, action, &hostname).await;
        });
        Ok(())
    }

    async fn run(
        api: Arc<dyn ContainerApi>,
        nodes: Arc<dyn NodeResolver>,
        timeout: Duration,
        action: FollowUp,
        hostname: &str,
    ) {
        let node = match nodes.reachable_node().await {
            Ok(node) => node,
            Err(e) => {
                warn!(
                    "Deferred {} of '{}' dropped: no reachable node: {:#}",
                    action, hostname, e
                );
                return;
            }
        };

        match action {
            FollowUp::Start => match api.start_container(&node, hostname).await {
                Ok(op) if op.status == OperationStatus::Running => {
                    info!("▶️ Deferred start of '{}' underway", hostname);
                }
                Ok(op) => warn!(
                    "Deferred start of '{}' reported {}: {}",
                    hostname,
                    op.status,
                    op.err.as_deref().unwrap_or("no error detail")
                ),
                Err(e) => warn!("Deferred start of '{}' failed: {}", hostname, e),
            },
            FollowUp::Delete => {
                let settled = match api.delete_container(&node, hostname).await {
                    Ok(op) => api.wait_for_operation(&node, &op.id, timeout).await,
                    Err(e) => Err(e),
                };
                match settled {
                    Ok(op) if op.status.is_success() => {
                        info!("🗑️ Deferred delete of '{}' completed", hostname);
                    }
                    Ok(op) => warn!(
                        "Deferred delete of '{}' ended with {}: {}",
                        hostname,
                        op.status,
                        op.err.as_deref().unwrap_or("no error detail")
                    ),
                    Err(e) => warn!("Deferred delete of '{}' failed: {}", hostname, e),
                }
            }
        }
    }
}

impl ActionScheduler for SpawnScheduler {
    fn schedule_now(&self, action: FollowUp, hostname: &str) -> Result<(), ScheduleError> {
        self.dispatch(Duration::ZERO, action, hostname)
    }

    fn schedule_after(
        &self,
        delay: Duration,
        action: FollowUp,
        hostname: &str,
    ) -> Result<(), ScheduleError> {
        self.dispatch(delay, action, hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ContainerRecord, ContainerState};
    use crate::cluster::StaticNode;
    use crate::error::ApiError;
    use crate::types::{ImageSpec, Operation};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Records the calls a deferred action makes and signals completion.
    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<String>>,
        done: Notify,
    }

    impl RecordingApi {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ContainerApi for RecordingApi {
        async fn create_container(
            &self,
            _node: &str,
            _hostname: &str,
            _image: &ImageSpec,
        ) -> Result<Operation, ApiError> {
            unimplemented!("not exercised by deferred actions")
        }

        async fn start_container(
            &self,
            _node: &str,
            hostname: &str,
        ) -> Result<Operation, ApiError> {
            self.record(format!("start {}", hostname));
            self.done.notify_one();
            Ok(Operation {
                id: "op-start".to_string(),
                status: OperationStatus::Running,
                err: None,
            })
        }

        async fn stop_container(&self, _node: &str, _hostname: &str) -> Result<Operation, ApiError> {
            unimplemented!("not exercised by deferred actions")
        }

        async fn delete_container(
            &self,
            _node: &str,
            hostname: &str,
        ) -> Result<Operation, ApiError> {
            self.record(format!("delete {}", hostname));
            Ok(Operation {
                id: "op-del".to_string(),
                status: OperationStatus::Running,
                err: None,
            })
        }

        async fn container(
            &self,
            _node: &str,
            _hostname: &str,
        ) -> Result<ContainerRecord, ApiError> {
            unimplemented!("not exercised by deferred actions")
        }

        async fn container_state(
            &self,
            _node: &str,
            _hostname: &str,
        ) -> Result<ContainerState, ApiError> {
            unimplemented!("not exercised by deferred actions")
        }

        async fn containers(&self, _node: &str) -> Result<Vec<String>, ApiError> {
            unimplemented!("not exercised by deferred actions")
        }

        async fn exec(
            &self,
            _node: &str,
            _hostname: &str,
            _command: &[String],
        ) -> Result<Operation, ApiError> {
            unimplemented!("not exercised by deferred actions")
        }

        async fn wait_for_operation(
            &self,
            _node: &str,
            operation_id: &str,
            _timeout: Duration,
        ) -> Result<Operation, ApiError> {
            self.record(format!("wait {}", operation_id));
            self.done.notify_one();
            Ok(Operation {
                id: operation_id.to_string(),
                status: OperationStatus::Success,
                err: None,
            })
        }

        async fn register_certificate(
            &self,
            _node: &str,
            _certificate: &str,
            _password: &str,
        ) -> Result<(), ApiError> {
            unimplemented!("not exercised by deferred actions")
        }
    }

    fn scheduler_over(api: Arc<RecordingApi>) -> SpawnScheduler {
        SpawnScheduler::new(
            api,
            Arc::new(StaticNode::new("10.0.0.7")),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_schedule_now_runs_the_action() {
        let api = Arc::new(RecordingApi::default());
        let scheduler = scheduler_over(api.clone());

        scheduler.schedule_now(FollowUp::Start, "web01").unwrap();
        api.done.notified().await;

        assert_eq!(api.calls(), vec!["start web01".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_after_waits_out_the_delay() {
        let api = Arc::new(RecordingApi::default());
        let scheduler = scheduler_over(api.clone());

        scheduler
            .schedule_after(Duration::from_secs(30), FollowUp::Delete, "web01")
            .unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        tokio::task::yield_now().await;
        assert!(api.calls().is_empty(), "delete ran before the delay lapsed");

        tokio::time::advance(Duration::from_secs(1)).await;
        api.done.notified().await;

        assert_eq!(
            api.calls(),
            vec!["delete web01".to_string(), "wait op-del".to_string()]
        );
    }

    #[test]
    fn test_schedule_without_runtime_is_an_error() {
        let api = Arc::new(RecordingApi::default());
        let scheduler = scheduler_over(api);

        let result = scheduler.schedule_now(FollowUp::Start, "web01");
        assert!(matches!(
            result,
            Err(ScheduleError::NoRuntime { action: FollowUp::Start, .. })
        ));
    }

    #[test]
    fn test_follow_up_display() {
        assert_eq!(FollowUp::Start.to_string(), "start");
        assert_eq!(FollowUp::Delete.to_string(), "delete");
    }
}
