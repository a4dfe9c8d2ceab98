//! HTTP transport for the enrichment service.
//!
//! Uses reqwest against `<base_url>/<endpoint>`, sending the API token in the
//! configured header. Retries and caching are deliberately absent: a failed
//! request surfaces as a `ClientError` and callers decide what to do.
//!
//! A 4xx response carrying a JSON `message` (other than 401 and 403) is the
//! service rejecting the query itself and is returned in-band. Auth failures
//! and 5xx responses are always `ClientError::HttpStatus`.

use crate::client::{EnrichmentClient, Endpoint, Query};
use crate::config::ClientConfig;
use crate::error::ClientError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// reqwest-backed [`EnrichmentClient`].
#[derive(Debug, Clone)]
pub struct HttpEnrichmentClient {
    client: Client,
    base_url: Url,
}

impl HttpEnrichmentClient {
    /// Create a client from configuration, resolving the API token.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let token = config.resolve_token()?;
        Self::with_token(config, &token)
    }

    /// Create a client with an explicit token, ignoring the configured token sources.
    pub fn with_token(config: &ClientConfig, token: &str) -> Result<Self, ClientError> {
        let base_url = parse_base_url(&config.base_url)?;

        let header_name = HeaderName::from_bytes(config.token_header.as_bytes()).map_err(|e| {
            ClientError::Request {
                endpoint: String::new(),
                message: format!("invalid token header '{}': {e}", config.token_header),
            }
        })?;
        let mut token_value =
            HeaderValue::from_str(token).map_err(|e| ClientError::Request {
                endpoint: String::new(),
                message: format!("invalid API token: {e}"),
            })?;
        token_value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header_name, token_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Request {
                endpoint: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: Endpoint) -> Result<Url, ClientError> {
        self.base_url
            .join(endpoint.as_str())
            .map_err(|e| ClientError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                message: e.to_string(),
            })
    }
}

/// Parse the base URL, making sure it ends in `/` so endpoints join beneath it.
fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| ClientError::InvalidBaseUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })
}

/// Render query values the way the service expects them in a query string.
fn query_pairs(query: &Query) -> Vec<(String, String)> {
    query
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let rendered = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), rendered)
        })
        .collect()
}

/// Statuses whose JSON `message` body is a per-query answer rather than a
/// transport failure.
fn in_band_status(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::UNAUTHORIZED
        && status != StatusCode::FORBIDDEN
}

#[async_trait]
impl EnrichmentClient for HttpEnrichmentClient {
    async fn invoke(
        &self,
        endpoint: Endpoint,
        query: &Query,
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        let url = self.endpoint_url(endpoint)?;
        let pairs = query_pairs(query);

        let request = match body {
            Some(body) => self.client.post(url).query(&pairs).json(body),
            None => self.client.get(url).query(&pairs),
        };
        debug!(endpoint = %endpoint, params = pairs.len(), post = body.is_some(), "Sending enrichment request");

        let resp = request.send().await.map_err(|e| {
            warn!(endpoint = %endpoint, error = %e, "Enrichment request failed");
            ClientError::Request {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            }
        })?;

        let status = resp.status();
        let body_text = resp.text().await.map_err(|e| ClientError::Request {
            endpoint: endpoint.to_string(),
            message: format!("failed to read response body: {e}"),
        })?;

        let decoded: Result<Value, _> = serde_json::from_str(&body_text);

        if !status.is_success() {
            if let Ok(value) = &decoded {
                if in_band_status(status) && value.get("message").is_some() {
                    debug!(endpoint = %endpoint, status = %status, "Service returned in-band error");
                    return Ok(value.clone());
                }
            }
            warn!(endpoint = %endpoint, status = %status, "Enrichment API HTTP error");
            return Err(ClientError::HttpStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: body_text,
            });
        }

        decoded.map_err(|e| ClientError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}
