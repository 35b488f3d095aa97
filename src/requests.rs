//! Asynchronous request bookkeeping for `await()` / `await.one()`
//!
//! Sheets create request ids; ingestion adapters resolve them through the
//! machine. Awaiting sheets are re-checked on every resolution.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::id::generate_request_id;

/// State of one asynchronous request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Resolved,
}

/// How a list of request ids is awaited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AwaitMode {
    /// `await`: suspended while any request is pending
    All,
    /// `await.one`: suspended while every request is pending
    Any,
}

/// Registry of request ids and their state
#[derive(Debug, Default)]
pub struct RequestRegistry {
    requests: HashMap<String, RequestStatus>,
    sequence: u64,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending request and return its id
    pub fn create(&mut self, label: &str) -> String {
        self.sequence += 1;
        let id = generate_request_id(self.sequence);
        log::debug!("Request {} created ({})", id, label);
        self.requests.insert(id.clone(), RequestStatus::Pending);
        id
    }

    /// Mark a request resolved. Returns false for unknown ids.
    pub fn resolve(&mut self, id: &str) -> bool {
        match self.requests.get_mut(id) {
            Some(status) => {
                *status = RequestStatus::Resolved;
                true
            }
            None => false,
        }
    }

    pub fn status(&self, id: &str) -> Option<RequestStatus> {
        self.requests.get(id).copied()
    }

    /// Unknown ids count as not pending
    pub fn is_pending(&self, id: &str) -> bool {
        self.status(id) == Some(RequestStatus::Pending)
    }

    pub fn pending_count(&self) -> usize {
        self.requests
            .values()
            .filter(|s| **s == RequestStatus::Pending)
            .count()
    }

    /// Whether a sheet awaiting `ids` in `mode` may continue
    pub fn is_satisfied(&self, ids: &[String], mode: AwaitMode) -> bool {
        match mode {
            AwaitMode::All => ids.iter().all(|id| !self.is_pending(id)),
            AwaitMode::Any => ids.is_empty() || ids.iter().any(|id| !self.is_pending(id)),
        }
    }
}
