//! HTTP implementation of [`ContainerApi`] for the LXD REST API.

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::{Client, Identity, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::wire::{
    CertificateRequest, CreateRequest, CreateSource, ExecRequest, StateRequest, WireContainer,
    WireContainerState, WireOperation, WireResponse, trailing_segment,
};
use super::{ContainerApi, ContainerRecord, ContainerState};
use crate::config::DroverConfig;
use crate::error::ApiError;
use crate::types::{ImageSpec, Operation, OperationStatus};

/// Client for the LXD daemon's REST API.
///
/// Connections are built fresh for every call, so one `LxdClient` can serve
/// any node in the fleet; the node address comes in with each request.
/// Server certificates are not verified unless `verify_tls` is set, because
/// fleet nodes serve self-signed certificates.
#[derive(Clone)]
pub struct LxdClient {
    config: DroverConfig,
    identity: Option<Identity>,
}

impl LxdClient {
    pub fn new(config: &DroverConfig) -> crate::Result<Self> {
        let identity = Self::load_identity(config)?;
        Ok(Self {
            config: config.clone(),
            identity,
        })
    }

    /// Load the client certificate pair used to authenticate against nodes
    /// that already trust us. Without one, calls run untrusted and only the
    /// pairing endpoint is useful.
    fn load_identity(config: &DroverConfig) -> crate::Result<Option<Identity>> {
        if !config.client_cert_path.exists() || !config.client_key_path.exists() {
            debug!(
                "No client certificate pair at {:?} / {:?}, connecting untrusted",
                config.client_cert_path, config.client_key_path
            );
            return Ok(None);
        }

        let cert = std::fs::read(&config.client_cert_path)?;
        let key = std::fs::read(&config.client_key_path)?;
        let identity = Identity::from_pkcs8_pem(&cert, &key)
            .map_err(|e| anyhow!("invalid client certificate pair: {}", e))?;
        Ok(Some(identity))
    }

    fn base_url(&self, node: &str) -> String {
        format!("https://{}:{}", node, self.config.api_port)
    }

    /// Fresh connection for one logical call.
    fn http_client(&self) -> Result<Client, ApiError> {
        let mut builder = Client::builder().danger_accept_invalid_certs(!self.config.verify_tls);
        if let Some(identity) = &self.identity {
            builder = builder.identity(identity.clone());
        }
        builder.build().map_err(transport)
    }

    async fn get(&self, url: &str) -> Result<Response, ApiError> {
        debug!("GET {}", url);
        self.http_client()?.get(url).send().await.map_err(transport)
    }

    async fn post<B: Serialize>(&self, url: &str, body: &B) -> Result<Response, ApiError> {
        debug!("POST {}", url);
        self.http_client()?
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport)
    }

    async fn put<B: Serialize>(&self, url: &str, body: &B) -> Result<Response, ApiError> {
        debug!("PUT {}", url);
        self.http_client()?
            .put(url)
            .json(body)
            .send()
            .await
            .map_err(transport)
    }

    async fn delete(&self, url: &str) -> Result<Response, ApiError> {
        debug!("DELETE {}", url);
        self.http_client()?
            .delete(url)
            .send()
            .await
            .map_err(transport)
    }

    /// Decode the outer envelope, folding `type: error` and non-2xx
    /// responses into [`ApiError::Remote`].
    async fn parse_envelope<T: DeserializeOwned>(
        response: Response,
    ) -> Result<WireResponse<T>, ApiError> {
        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        match serde_json::from_str::<WireResponse<T>>(&body) {
            Ok(envelope) if envelope.kind == "error" => Err(ApiError::Remote {
                message: envelope.error,
                code: envelope.error_code.or(Some(status.as_u16() as i64)),
            }),
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => Err(remote_http_error(status, &body)),
            Err(e) => Err(ApiError::Protocol {
                message: e.to_string(),
            }),
        }
    }

    /// Pull the operation handle out of an envelope, preferring the inline
    /// body and falling back to the operation path reference.
    fn operation_from(envelope: WireResponse<WireOperation>) -> Result<Operation, ApiError> {
        let path_id = trailing_segment(&envelope.operation).to_string();
        match envelope.metadata {
            Some(wire) => {
                let mut operation = Operation::from(wire);
                if operation.id.is_empty() {
                    operation.id = path_id;
                }
                Ok(operation)
            }
            None if !path_id.is_empty() => Ok(Operation {
                id: path_id,
                status: OperationStatus::parse(&envelope.status),
                err: None,
            }),
            None => Err(ApiError::Protocol {
                message: "response carried no operation".to_string(),
            }),
        }
    }

    async fn change_state(
        &self,
        node: &str,
        hostname: &str,
        action: &'static str,
    ) -> Result<Operation, ApiError> {
        let url = format!("{}/1.0/containers/{}/state", self.base_url(node), hostname);
        let response = self.put(&url, &StateRequest { action }).await?;
        let envelope = Self::parse_envelope(response)
            .await
            .map_err(|e| tag_not_found(e, hostname))?;
        Self::operation_from(envelope)
    }
}

#[async_trait]
impl ContainerApi for LxdClient {
    async fn create_container(
        &self,
        node: &str,
        hostname: &str,
        image: &ImageSpec,
    ) -> Result<Operation, ApiError> {
        let url = format!("{}/1.0/containers", self.base_url(node));
        let request = CreateRequest {
            name: hostname.to_string(),
            source: CreateSource {
                kind: "image",
                server: image.server.clone(),
                protocol: image.protocol.clone(),
                alias: image.alias.clone(),
            },
        };
        let response = self.post(&url, &request).await?;
        Self::operation_from(Self::parse_envelope(response).await?)
    }

    async fn start_container(&self, node: &str, hostname: &str) -> Result<Operation, ApiError> {
        self.change_state(node, hostname, "start").await
    }

    async fn stop_container(&self, node: &str, hostname: &str) -> Result<Operation, ApiError> {
        self.change_state(node, hostname, "stop").await
    }

    async fn delete_container(&self, node: &str, hostname: &str) -> Result<Operation, ApiError> {
        let url = format!("{}/1.0/containers/{}", self.base_url(node), hostname);
        let response = self.delete(&url).await?;
        let envelope = Self::parse_envelope(response)
            .await
            .map_err(|e| tag_not_found(e, hostname))?;
        Self::operation_from(envelope)
    }

    async fn container(&self, node: &str, hostname: &str) -> Result<ContainerRecord, ApiError> {
        let url = format!("{}/1.0/containers/{}", self.base_url(node), hostname);
        let response = self.get(&url).await?;
        let envelope: WireResponse<WireContainer> = Self::parse_envelope(response)
            .await
            .map_err(|e| tag_not_found(e, hostname))?;
        envelope
            .metadata
            .map(ContainerRecord::from)
            .ok_or_else(|| ApiError::Protocol {
                message: format!("container record for '{}' was empty", hostname),
            })
    }

    async fn container_state(
        &self,
        node: &str,
        hostname: &str,
    ) -> Result<ContainerState, ApiError> {
        let url = format!("{}/1.0/containers/{}/state", self.base_url(node), hostname);
        let response = self.get(&url).await?;
        let envelope: WireResponse<WireContainerState> = Self::parse_envelope(response)
            .await
            .map_err(|e| tag_not_found(e, hostname))?;
        envelope
            .metadata
            .map(ContainerState::from)
            .ok_or_else(|| ApiError::Protocol {
                message: format!("state for '{}' was empty", hostname),
            })
    }

    async fn containers(&self, node: &str) -> Result<Vec<String>, ApiError> {
        let url = format!("{}/1.0/containers", self.base_url(node));
        let response = self.get(&url).await?;
        let envelope: WireResponse<Vec<String>> = Self::parse_envelope(response).await?;
        Ok(envelope
            .metadata
            .unwrap_or_default()
            .iter()
            .map(|path| trailing_segment(path).to_string())
            .collect())
    }

    async fn exec(
        &self,
        node: &str,
        hostname: &str,
        command: &[String],
    ) -> Result<Operation, ApiError> {
        let url = format!("{}/1.0/containers/{}/exec", self.base_url(node), hostname);
        let request = ExecRequest {
            command: command.to_vec(),
            wait_for_websocket: false,
            record_output: false,
            interactive: false,
        };
        let response = self.post(&url, &request).await?;
        let envelope = Self::parse_envelope(response)
            .await
            .map_err(|e| tag_not_found(e, hostname))?;
        let operation = Self::operation_from(envelope)?;
        self.wait_for_operation(node, &operation.id, self.config.operation_timeout())
            .await
    }

    async fn wait_for_operation(
        &self,
        node: &str,
        operation_id: &str,
        timeout: Duration,
    ) -> Result<Operation, ApiError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(ApiError::OperationTimedOut {
                    id: operation_id.to_string(),
                    seconds: timeout.as_secs(),
                });
            }

            // The server holds the request until the operation settles or
            // its own timeout lapses; cap the socket slightly above that so
            // a stalled daemon cannot wedge the caller.
            let wait_secs = remaining.as_secs().max(1);
            let url = format!(
                "{}/1.0/operations/{}/wait?timeout={}",
                self.base_url(node),
                operation_id,
                wait_secs
            );
            debug!("GET {}", url);
            let response = self
                .http_client()?
                .get(&url)
                .timeout(remaining + Duration::from_secs(5))
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ApiError::OperationTimedOut {
                            id: operation_id.to_string(),
                            seconds: timeout.as_secs(),
                        }
                    } else {
                        transport(e)
                    }
                })?;

            let envelope: WireResponse<WireOperation> = Self::parse_envelope(response).await?;
            let operation = Self::operation_from(envelope)?;
            if operation.status.is_terminal() {
                return Ok(operation);
            }
            debug!("Operation {} still {}", operation_id, operation.status);
        }
    }

    async fn register_certificate(
        &self,
        node: &str,
        certificate: &str,
        password: &str,
    ) -> Result<(), ApiError> {
        let url = format!("{}/1.0/certificates", self.base_url(node));
        let request = CertificateRequest {
            kind: "client",
            certificate: pem_body(certificate),
            password: password.to_string(),
        };
        let response = self.post(&url, &request).await?;
        let _: WireResponse<serde_json::Value> = Self::parse_envelope(response).await?;
        Ok(())
    }
}

fn transport(error: reqwest::Error) -> ApiError {
    ApiError::Transport {
        message: error.to_string(),
    }
}

fn remote_http_error(status: StatusCode, body: &str) -> ApiError {
    let detail = body.trim();
    let message = if detail.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, detail)
    };
    if message.len() > 512 {
        warn!("Truncating oversized error body from remote");
    }
    ApiError::Remote {
        message: message.chars().take(512).collect(),
        code: Some(status.as_u16() as i64),
    }
}

/// Rewrite 404-coded remote errors into the not-found variant so callers
/// can tell "absent" apart from "broken".
fn tag_not_found(error: ApiError, hostname: &str) -> ApiError {
    match error {
        ApiError::Remote {
            code: Some(404), ..
        } => ApiError::NotFound {
            name: hostname.to_string(),
        },
        other => other,
    }
}

/// Base64 payload of a PEM block, as the certificates endpoint expects.
fn pem_body(pem: &str) -> String {
    pem.lines()
        .filter(|line| !line.starts_with("-----"))
        .map(str::trim)
        .collect::<Vec<_>>()
        .concat()
}
