//! HTTP transport for the collection endpoint

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use crate::error::{Error, Result, TransportError};

use super::{OutboundRequest, Transport, CACHE_HEADER};

/// POSTs JSON reports to the collection endpoint
///
/// Only a request that gets no answer, or an answer whose body cannot be
/// read, is a failure. The body of any HTTP response is returned.
///
/// No request timeout is configured; a hung request resolves whenever the
/// underlying connection gives up.
pub struct HttpTransport {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Create a transport for an endpoint such as `https://stats.example.com/api/send`
    pub fn new(endpoint: &str) -> Result<Self> {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(Error::Config(format!(
                "collector endpoint must be an http(s) URL: {}",
                endpoint
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: &OutboundRequest) -> std::result::Result<String, TransportError> {
        let mut builder = self
            .http_client
            .post(&self.endpoint)
            .json(&request.collect_request());

        if let Some(token) = &request.cache_token {
            let value = HeaderValue::from_str(token)
                .map_err(|e| TransportError::Encode(format!("invalid cache token: {}", e)))?;
            builder = builder.header(CACHE_HEADER, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        // Any answer carries the next token, error statuses included
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(
                status = status.as_u16(),
                "Collector answered with an error status"
            );
        }

        response
            .text()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))
    }
}
