//! Trust-store pairing with hypervisor nodes.

use tracing::info;

use super::Drover;
use crate::error::ApiError;
use crate::types::Outcome;

/// Error fragment a node returns when a certificate is submitted twice.
const ALREADY_TRUSTED: &str = "Certificate already in trust store";

impl Drover {
    /// Register this client's certificate with a node's trust store.
    ///
    /// Pairing is the bootstrap step for a fresh node: later calls
    /// authenticate with the certificate itself. Re-pairing a node that
    /// already trusts the certificate reports success; every other failure,
    /// including an unreadable certificate file, lands in the envelope.
    pub async fn add_remote(&self, node: &str) -> Outcome {
        match self.add_remote_inner(node).await {
            Ok(()) => {
                info!("🤝 Node '{}' now trusts this client", node);
                Outcome::done()
            }
            Err(e) if e.to_string().contains(ALREADY_TRUSTED) => {
                info!("🤝 Node '{}' already trusts this client", node);
                Outcome::done()
            }
            Err(e) => Outcome::err(e),
        }
    }

    async fn add_remote_inner(&self, node: &str) -> Result<(), ApiError> {
        let password =
            self.config
                .trust_password
                .clone()
                .ok_or_else(|| ApiError::Config {
                    message: "trust_password is not configured".to_string(),
                })?;

        let cert_path = &self.config.client_cert_path;
        let certificate =
            tokio::fs::read_to_string(cert_path)
                .await
                .map_err(|e| ApiError::Config {
                    message: format!(
                        "cannot read client certificate {}: {}",
                        cert_path.display(),
                        e
                    ),
                })?;

        info!("🤝 Pairing with node '{}'", node);
        self.api
            .register_certificate(node, &certificate, &password)
            .await
    }
}
