use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::ImageSpec;

/// Runtime configuration for the orchestrator and its HTTP client.
///
/// Values come from `<config_dir>/drover/config.toml` when the file exists,
/// with `DROVER_*` environment variables applied on top. Durations are kept
/// as whole seconds so the file stays trivially editable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DroverConfig {
    /// Port the hypervisor's REST API listens on.
    pub api_port: u16,
    /// Verify the hypervisor's TLS certificate. Off by default because
    /// fleet nodes serve self-signed certificates.
    pub verify_tls: bool,
    /// PEM client certificate presented to the hypervisor.
    pub client_cert_path: PathBuf,
    /// PEM private key matching `client_cert_path`.
    pub client_key_path: PathBuf,
    /// Password for registering this client in a node's trust store.
    pub trust_password: Option<String>,
    /// Grace period between a stop and the deferred delete that follows it.
    pub wait_interval_seconds: u64,
    /// Deadline for any single operation wait.
    pub operation_timeout_seconds: u64,
    /// Image used when a caller does not request one.
    pub default_image: ImageSpec,
}

impl Default for DroverConfig {
    fn default() -> Self {
        Self {
            api_port: 8443,
            verify_tls: false,
            client_cert_path: lxc_config_dir().join("client.crt"),
            client_key_path: lxc_config_dir().join("client.key"),
            trust_password: None,
            wait_interval_seconds: 30,
            operation_timeout_seconds: 300,
            default_image: ImageSpec::default(),
        }
    }
}

fn lxc_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("lxc")
}

impl DroverConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("drover")
            .join("config.toml");

        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            debug!("No config file at {:?}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file at {:?}", path.as_ref()))?;

        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;

        Ok(config)
    }

    /// Apply `DROVER_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var("DROVER_TRUST_PASSWORD") {
            self.trust_password = Some(password);
        }
        if let Ok(path) = std::env::var("DROVER_CLIENT_CERT") {
            self.client_cert_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("DROVER_CLIENT_KEY") {
            self.client_key_path = PathBuf::from(path);
        }
        if let Some(seconds) = env_seconds("DROVER_WAIT_INTERVAL") {
            self.wait_interval_seconds = seconds;
        }
        if let Some(seconds) = env_seconds("DROVER_OPERATION_TIMEOUT") {
            self.operation_timeout_seconds = seconds;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            return Err(anyhow!("api_port must be non-zero"));
        }
        if self.operation_timeout_seconds == 0 {
            return Err(anyhow!("operation_timeout_seconds must be non-zero"));
        }
        if self.default_image.alias.is_empty() {
            return Err(anyhow!("default_image.alias must not be empty"));
        }
        Ok(())
    }

    /// Delay applied before a deferred deletion runs.
    pub fn destroy_delay(&self) -> Duration {
        Duration::from_secs(self.wait_interval_seconds)
    }

    /// Deadline for waiting out a single remote operation.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_seconds)
    }
}

fn env_seconds(var: &str) -> Option<u64> {
    let raw = std::env::var(var).ok()?;
    match raw.parse() {
        Ok(seconds) => Some(seconds),
        Err(_) => {
            warn!("Ignoring {}: '{}' is not a number of seconds", var, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_fleet_conventions() {
        let config = DroverConfig::default();
        assert_eq!(config.api_port, 8443);
        assert!(!config.verify_tls);
        assert!(config.trust_password.is_none());
        assert_eq!(config.wait_interval_seconds, 30);
        assert_eq!(config.operation_timeout_seconds, 300);
        assert!(config.client_cert_path.ends_with("lxc/client.crt"));
        assert!(config.client_key_path.ends_with("lxc/client.key"));
    }

    #[test]
    fn test_load_from_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_port = 9443").unwrap();
        writeln!(file, "wait_interval_seconds = 5").unwrap();

        let config = DroverConfig::load_from(file.path()).unwrap();
        assert_eq!(config.api_port, 9443);
        assert_eq!(config.wait_interval_seconds, 5);
        // Untouched fields keep their defaults.
        assert_eq!(config.operation_timeout_seconds, 300);
        assert_eq!(config.default_image.alias, "16.04");
    }

    #[test]
    fn test_load_from_parses_image_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[default_image]").unwrap();
        writeln!(file, "server = \"https://images.linuxcontainers.org\"").unwrap();
        writeln!(file, "protocol = \"simplestreams\"").unwrap();
        writeln!(file, "alias = \"ubuntu/22.04\"").unwrap();

        let config = DroverConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_image.alias, "ubuntu/22.04");
        assert_eq!(config.default_image.server, "https://images.linuxcontainers.org");
    }

    #[test]
    fn test_load_from_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = DroverConfig::load_from(dir.path().join("nope.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = DroverConfig {
            operation_timeout_seconds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_image_alias() {
        let mut config = DroverConfig::default();
        config.default_image.alias.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        let mut config = DroverConfig::default();
        unsafe {
            std::env::set_var("DROVER_TRUST_PASSWORD", "s3cret");
            std::env::set_var("DROVER_WAIT_INTERVAL", "90");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("DROVER_TRUST_PASSWORD");
            std::env::remove_var("DROVER_WAIT_INTERVAL");
        }

        assert_eq!(config.trust_password.as_deref(), Some("s3cret"));
        assert_eq!(config.wait_interval_seconds, 90);
    }

    #[test]
    fn test_non_numeric_env_seconds_is_ignored() {
        let mut config = DroverConfig {
            operation_timeout_seconds: 45,
            ..Default::default()
        };
        unsafe {
            std::env::set_var("DROVER_OPERATION_TIMEOUT", "soon");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("DROVER_OPERATION_TIMEOUT");
        }

        // The garbage override is dropped, not applied and not fatal.
        assert_eq!(config.operation_timeout_seconds, 45);
    }

    #[test]
    fn test_duration_accessors_convert_seconds() {
        let config = DroverConfig {
            wait_interval_seconds: 7,
            operation_timeout_seconds: 12,
            ..Default::default()
        };
        assert_eq!(config.destroy_delay(), Duration::from_secs(7));
        assert_eq!(config.operation_timeout(), Duration::from_secs(12));
    }
}
