//! Report delivery
//!
//! The reporter checks the tracking policy, sends the report and keeps the
//! dedupe token the collector hands back. Delivery is best-effort: `send`
//! never fails from the caller's point of view.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::TransportError;
use crate::policy::TrackingPolicy;
use crate::transport::{OutboundRequest, ReportKind, Transport};

/// Outcome of a report that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// The collector accepted the report and returned this token
    Delivered { token: String },
    /// Tracking is disabled; nothing was sent
    Suppressed,
}

/// Sends reports and tracks the server-issued dedupe token
pub struct Reporter {
    transport: Arc<dyn Transport>,
    policy: TrackingPolicy,
    /// Body of the last successful response
    token: Mutex<Option<String>>,
}

impl Reporter {
    pub fn new(transport: Arc<dyn Transport>, policy: TrackingPolicy) -> Self {
        Self {
            transport,
            policy,
            token: Mutex::new(None),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.policy.is_disabled()
    }

    /// The token attached to the next request, if any.
    pub fn dedupe_token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    /// Send a report, surfacing transport failures.
    pub async fn try_send<P>(&self, payload: &P, kind: ReportKind) -> Result<Ack, TransportError>
    where
        P: Serialize + Sync + ?Sized,
    {
        if self.policy.is_disabled() {
            tracing::trace!("Tracking disabled, dropping report");
            return Ok(Ack::Suppressed);
        }

        let payload =
            serde_json::to_value(payload).map_err(|e| TransportError::Encode(e.to_string()))?;
        let request = OutboundRequest {
            kind,
            payload,
            cache_token: self.dedupe_token(),
        };

        let body = self.transport.post(&request).await?;
        *self.token.lock() = Some(body.clone());

        Ok(Ack::Delivered { token: body })
    }

    /// Send a report, dropping any failure.
    pub async fn send<P>(&self, payload: &P, kind: ReportKind) -> Option<Ack>
    where
        P: Serialize + Sync + ?Sized,
    {
        match self.try_send(payload, kind).await {
            Ok(ack) => Some(ack),
            Err(e) => {
                // Best-effort delivery: the report is lost
                tracing::debug!(error = %e, kind = ?kind, "Failed to deliver report");
                None
            }
        }
    }
}
