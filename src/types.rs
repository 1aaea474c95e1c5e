use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ApiError;

/// Lifecycle state the hypervisor reports for a container.
///
/// Anything the remote sends that we do not recognize parses to
/// [`ContainerStatus::Unknown`] rather than failing the whole read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerStatus {
    Creating,
    Starting,
    Running,
    Stopping,
    Stopped,
    Freezing,
    Frozen,
    Deleting,
    Error,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ContainerStatus {
    /// Parse the remote's status string, case-sensitively.
    pub fn parse(s: &str) -> Self {
        match s {
            "Creating" => Self::Creating,
            "Starting" => Self::Starting,
            "Running" => Self::Running,
            "Stopping" => Self::Stopping,
            "Stopped" => Self::Stopped,
            "Freezing" => Self::Freezing,
            "Frozen" => Self::Frozen,
            "Deleting" => Self::Deleting,
            "Error" => Self::Error,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "Creating",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Freezing => "Freezing",
            Self::Frozen => "Frozen",
            Self::Deleting => "Deleting",
            Self::Error => "Error",
            Self::Unknown => "Unknown",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a background operation on the hypervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Pending,
    Running,
    Cancelling,
    Success,
    Failure,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl OperationStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Cancelling" => Self::Cancelling,
            "Success" => Self::Success,
            "Failure" => Self::Failure,
            "Cancelled" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Cancelling => "Cancelling",
            Self::Success => "Success",
            Self::Failure => "Failure",
            Self::Cancelled => "Cancelled",
            Self::Unknown => "Unknown",
        }
    }

    /// True once the operation can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle for an in-flight or settled hypervisor operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub status: OperationStatus,
    /// Remote error text, populated when the operation did not succeed.
    pub err: Option<String>,
}

/// Container view assembled from the hypervisor's descriptor and state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub hostname: String,
    pub status: Option<ContainerStatus>,
    /// First IPv4 address leased on the primary interface, once one exists.
    pub ip_address: Option<String>,
    pub image_description: Option<String>,
    pub profiles: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Container {
    /// A container known only by name, as returned by list queries.
    pub fn named(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Default::default()
        }
    }
}

/// Source a container image is fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub server: String,
    pub protocol: String,
    pub alias: String,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            server: "https://cloud-images.ubuntu.com/releases".to_string(),
            protocol: "simplestreams".to_string(),
            alias: "16.04".to_string(),
        }
    }
}

impl fmt::Display for ImageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.alias, self.server)
    }
}

/// Uniform result envelope returned by every orchestration entry point.
///
/// A successful outcome never carries an error and a failed one never
/// carries data; the constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<T = ()> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T> Outcome<T> {
    /// Successful outcome carrying a payload.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed outcome carrying the normalized error.
    pub fn err(error: impl Into<ApiError>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Human-readable error text, when the outcome failed.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }
}

impl Outcome<()> {
    /// Successful outcome with no payload.
    pub fn done() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_status_parses_remote_strings() {
        assert_eq!(ContainerStatus::parse("Running"), ContainerStatus::Running);
        assert_eq!(ContainerStatus::parse("Stopped"), ContainerStatus::Stopped);
        assert_eq!(ContainerStatus::parse("Frozen"), ContainerStatus::Frozen);
    }

    #[test]
    fn test_container_status_unrecognized_falls_back_to_unknown() {
        assert_eq!(ContainerStatus::parse("Broken"), ContainerStatus::Unknown);
        // Parsing is case-sensitive to mirror the remote exactly.
        assert_eq!(ContainerStatus::parse("running"), ContainerStatus::Unknown);
        assert_eq!(ContainerStatus::parse(""), ContainerStatus::Unknown);
    }

    #[test]
    fn test_container_status_display_round_trips() {
        for status in [
            ContainerStatus::Running,
            ContainerStatus::Stopped,
            ContainerStatus::Starting,
        ] {
            assert_eq!(ContainerStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_operation_status_terminal_states() {
        assert!(OperationStatus::Success.is_terminal());
        assert!(OperationStatus::Failure.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(!OperationStatus::Running.is_terminal());
        assert!(!OperationStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_operation_status_only_success_is_success() {
        assert!(OperationStatus::Success.is_success());
        assert!(!OperationStatus::Failure.is_success());
        assert!(!OperationStatus::Running.is_success());
    }

    #[test]
    fn test_outcome_ok_never_carries_error() {
        let outcome = Outcome::ok(Container::named("web01"));
        assert!(outcome.success);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.data.unwrap().hostname, "web01");
    }

    #[test]
    fn test_outcome_err_never_carries_data() {
        let outcome: Outcome<Container> = Outcome::err(ApiError::NotFound {
            name: "web01".to_string(),
        });
        assert!(!outcome.success);
        assert!(outcome.data.is_none());
        assert!(outcome.error_message().unwrap().contains("web01"));
    }

    #[test]
    fn test_outcome_done_is_empty_success() {
        let outcome = Outcome::done();
        assert!(outcome.success);
        assert!(outcome.data.is_none());
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_default_image_targets_ubuntu_releases() {
        let image = ImageSpec::default();
        assert_eq!(image.server, "https://cloud-images.ubuntu.com/releases");
        assert_eq!(image.protocol, "simplestreams");
        assert_eq!(image.alias, "16.04");
    }

    #[test]
    fn test_named_container_has_no_state() {
        let container = Container::named("db01");
        assert_eq!(container.hostname, "db01");
        assert!(container.status.is_none());
        assert!(container.ip_address.is_none());
        assert!(container.profiles.is_empty());
    }
}
