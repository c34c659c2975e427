//! HTTP transport for the semantic repair service.
//!
//! [`AnthropicAssistant`] speaks the Messages API and implements the core's
//! [`SemanticAssistant`] trait; the core owns retries, timeouts around the
//! whole call, validation and translation.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;
use weft_config::RepairConfig;
use weft_ir::repair::{RepairError, RepairMessage, RepairRequest, SemanticAssistant};

/// Protocol version header sent with every request.
pub const API_VERSION: &str = "2023-06-01";

/// Longest error body kept in a [`RepairError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Errors raised while setting up the client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("no API key configured for the repair service")]
    MissingApiKey,

    #[error("invalid repair endpoint `{0}`")]
    InvalidEndpoint(String),

    /// Plain http is only accepted for loopback hosts.
    #[error("refusing non-https repair endpoint `{0}`")]
    InsecureEndpoint(String),

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [RepairMessage],
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnthropicAssistant {
    client: Client,
    endpoint: Url,
    api_key: String,
    timeout_secs: u64,
}

impl AnthropicAssistant {
    pub fn from_config(config: &RepairConfig) -> Result<Self, ClientError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ClientError::MissingApiKey)?
            .to_string();
        let endpoint = check_endpoint(&config.endpoint)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("weft/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, request: &RepairRequest) -> Result<String, RepairError> {
        let body = MessagesBody {
            model: &request.model,
            max_tokens: request.max_tokens,
            system: &request.system,
            messages: &request.messages,
        };
        debug!(
            endpoint = %self.endpoint,
            model = %request.model,
            messages = request.messages.len(),
            "sending repair request"
        );
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "repair service returned an error status");
            return Err(RepairError::Status {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|err| RepairError::Parse(err.to_string()))?;
        let text: Vec<String> = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(RepairError::Parse("response has no text content".to_string()));
        }
        Ok(text.join(""))
    }

    fn transport_error(&self, err: reqwest::Error) -> RepairError {
        if err.is_timeout() {
            RepairError::Timeout(self.timeout_secs)
        } else {
            RepairError::Transport(err.to_string())
        }
    }
}

impl SemanticAssistant for AnthropicAssistant {
    async fn complete(&self, request: &RepairRequest) -> Result<String, RepairError> {
        self.send(request).await
    }
}

/// Parse the endpoint and refuse anything but https, except plain http to a
/// loopback host.
pub fn check_endpoint(endpoint: &str) -> Result<Url, ClientError> {
    let url = Url::parse(endpoint).map_err(|_| ClientError::InvalidEndpoint(endpoint.to_string()))?;
    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback(&url) => Ok(url),
        "http" => Err(ClientError::InsecureEndpoint(endpoint.to_string())),
        _ => Err(ClientError::InvalidEndpoint(endpoint.to_string())),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain == "localhost",
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_scheme_guard() {
        assert!(check_endpoint("https://api.anthropic.com/v1/messages").is_ok());
        assert!(check_endpoint("http://127.0.0.1:9000/v1/messages").is_ok());
        assert!(check_endpoint("http://localhost/v1/messages").is_ok());
        assert!(matches!(
            check_endpoint("http://api.example.com/v1/messages"),
            Err(ClientError::InsecureEndpoint(_))
        ));
        assert!(matches!(
            check_endpoint("file:///etc/passwd"),
            Err(ClientError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            check_endpoint("not a url"),
            Err(ClientError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn missing_key_is_rejected() {
        let config = RepairConfig {
            api_key: Some("  ".into()),
            ..RepairConfig::default()
        };
        assert!(matches!(
            AnthropicAssistant::from_config(&config),
            Err(ClientError::MissingApiKey)
        ));
    }
}
