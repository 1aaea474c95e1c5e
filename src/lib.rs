//! Drover - asynchronous container lifecycle orchestration for LXD fleets
//!
//! This crate drives a remote LXD-style hypervisor through its
//! operation-based REST API: mutating calls hand back in-flight operations
//! that are polled to completion, multi-step workflows (stop-then-delete,
//! full recreates) compose those operations with strict abort-on-failure
//! ordering, and follow-up actions (the start after a launch, the delayed
//! delete after a destroy) run detached from the caller. Every entry point
//! returns a uniform [`Outcome`] envelope instead of raising, so embedders
//! always see `{success, data, error}`.
//!
//! ```no_run
//! use drover::{Drover, DroverConfig};
//!
//! # async fn example() -> drover::Result<()> {
//! let drover = Drover::with_node(DroverConfig::load()?, "10.0.0.7")?;
//! let outcome = drover.launch("web01", None).await;
//! assert!(outcome.success);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod cluster;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod scheduler;
pub mod types;

pub use config::DroverConfig;
pub use error::{ApiError, DroverError, Result};
pub use orchestrator::{AttachOptions, Drover};

// Export main types at root level
pub use client::{ContainerApi, LxdClient};
pub use cluster::{NodeResolver, StaticNode};
pub use scheduler::{ActionScheduler, FollowUp, ScheduleError, SpawnScheduler};
pub use types::{
    Container, ContainerStatus, ImageSpec, Operation, OperationStatus, Outcome,
};

// Re-export anyhow for resolver implementations
pub use anyhow;
