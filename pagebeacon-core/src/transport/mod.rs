//! Collection endpoint transport
//!
//! The tracker only needs one operation from its transport: POST a report
//! and hand back the response body. [`HttpTransport`] does that over HTTP;
//! [`RecordingTransport`] keeps requests in memory for dry runs and tests.

mod http;
mod memory;

pub use http::HttpTransport;
pub use memory::RecordingTransport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Request header carrying the dedupe token
pub const CACHE_HEADER: &str = "x-umami-cache";

/// Report type, sent as `type` in the request body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Event,
    Identify,
}

/// One report on its way to the collector
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub kind: ReportKind,
    pub payload: serde_json::Value,
    /// Token echoed from the previous successful response
    pub cache_token: Option<String>,
}

/// Request body for POST to the collection endpoint
#[derive(Serialize)]
struct CollectRequest<'a> {
    #[serde(rename = "type")]
    kind: ReportKind,
    payload: &'a serde_json::Value,
}

impl OutboundRequest {
    /// `{"type": ..., "payload": ...}`
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.kind,
            "payload": self.payload,
        })
    }

    fn collect_request(&self) -> CollectRequest<'_> {
        CollectRequest {
            kind: self.kind,
            payload: &self.payload,
        }
    }
}

/// Delivers reports to the collection endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one report, returning the raw response body.
    async fn post(&self, request: &OutboundRequest) -> Result<String, TransportError>;
}
