//! In-memory transport
//!
//! Records every request and answers from a queue of scripted replies. A
//! gated transport holds each reply until [`RecordingTransport::release`] is
//! called, which lets callers observe a report while it is in flight.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::error::TransportError;

use super::{OutboundRequest, Transport};

/// Transport that keeps requests in memory
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<OutboundRequest>>,
    replies: Mutex<VecDeque<Result<String, TransportError>>>,
    gate: Option<Arc<Semaphore>>,
}

impl RecordingTransport {
    /// Answers every request immediately with an empty body unless a reply
    /// has been queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds every reply until released.
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// Queue a successful reply body.
    pub fn reply_with(&self, body: &str) {
        self.replies.lock().push_back(Ok(body.to_string()));
    }

    /// Queue a failed reply.
    pub fn fail_with(&self, error: TransportError) {
        self.replies.lock().push_back(Err(error));
    }

    /// Let `count` held replies through.
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Requests received so far, including ones still in flight.
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post(&self, request: &OutboundRequest) -> Result<String, TransportError> {
        self.requests.lock().push(request.clone());

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;
            permit.forget();
        }

        self.replies.lock().pop_front().unwrap_or_else(|| Ok(String::new()))
    }
}
