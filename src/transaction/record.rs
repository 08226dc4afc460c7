//! Captured transaction records

use std::hash::{Hash, Hasher};
use std::time::{Duration, SystemTime};

use bytes::Bytes;

use super::TransactionId;

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Request observed, no response yet
    Pending,
    /// Response received
    Completed,
    /// Transport-level failure
    Failed,
}

impl TransactionState {
    /// Completed and Failed never change again
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Snapshot of a request or response body
///
/// The buffer is shared between copies, so snapshots of the store do not
/// duplicate payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    data: Bytes,
    len: usize,
}

impl Body {
    /// Wrap a body as observed on the wire
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let len = data.len();
        Self { data, len }
    }

    /// Stored bytes (possibly a truncated prefix)
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Original length before truncation
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the original body was empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether only a prefix of the body was kept
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.data.len() < self.len
    }

    /// Keep at most `limit` bytes; 0 disables the limit
    pub(crate) fn truncate(&mut self, limit: usize) {
        if limit > 0 && self.data.len() > limit {
            self.data = self.data.slice(..limit);
        }
    }
}

/// Request half of a transaction, fixed at admission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMetadata {
    /// HTTP method (uppercase)
    pub method: String,
    /// Full request URL
    pub url: String,
    /// Request headers in wire order
    pub headers: Vec<(String, String)>,
    /// Request body snapshot
    pub body: Body,
    /// When the request was observed
    pub started_at: SystemTime,
}

impl RequestMetadata {
    /// Create request metadata started now
    #[must_use]
    pub fn new(method: &str, url: impl Into<String>) -> Self {
        Self {
            method: method.trim().to_uppercase(),
            url: url.into(),
            headers: Vec::new(),
            body: Body::default(),
            started_at: SystemTime::now(),
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::new(body);
        self
    }

    /// Override the start timestamp
    #[must_use]
    pub fn started_at(mut self, at: SystemTime) -> Self {
        self.started_at = at;
        self
    }
}

/// Response half of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMetadata {
    /// HTTP status code, absent when the transport failed
    pub status: Option<u16>,
    /// Response headers in wire order
    pub headers: Vec<(String, String)>,
    /// Response body snapshot
    pub body: Body,
    /// When the response or error arrived
    pub completed_at: SystemTime,
    /// Transport error, if the transaction failed
    pub error: Option<String>,
}

impl ResponseMetadata {
    /// Successful response with the given status
    #[must_use]
    pub fn completed(status: u16) -> Self {
        Self {
            status: Some(status),
            headers: Vec::new(),
            body: Body::default(),
            completed_at: SystemTime::now(),
            error: None,
        }
    }

    /// Transport failure
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: None,
            headers: Vec::new(),
            body: Body::default(),
            completed_at: SystemTime::now(),
            error: Some(error.into()),
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::new(body);
        self
    }

    /// Override the completion timestamp
    #[must_use]
    pub fn completed_at(mut self, at: SystemTime) -> Self {
        self.completed_at = at;
        self
    }

    /// State this response moves a transaction into
    #[must_use]
    pub fn state(&self) -> TransactionState {
        if self.error.is_some() {
            TransactionState::Failed
        } else {
            TransactionState::Completed
        }
    }
}

/// One captured HTTP transaction
///
/// Equality and hashing are by id only.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    id: TransactionId,
    request: RequestMetadata,
    response: Option<ResponseMetadata>,
}

impl TransactionRecord {
    /// Create a pending record with a freshly generated id
    #[must_use]
    pub fn new(request: RequestMetadata) -> Self {
        let id = TransactionId::generate(&request.method, &request.url, request.started_at);
        Self::with_id(id, request)
    }

    /// Create a pending record with a caller-supplied id
    #[must_use]
    pub fn with_id(id: TransactionId, request: RequestMetadata) -> Self {
        Self {
            id,
            request,
            response: None,
        }
    }

    /// Record id
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Request metadata
    #[must_use]
    pub fn request(&self) -> &RequestMetadata {
        &self.request
    }

    /// Response metadata, `None` while pending
    #[must_use]
    pub fn response(&self) -> Option<&ResponseMetadata> {
        self.response.as_ref()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.response
            .as_ref()
            .map_or(TransactionState::Pending, ResponseMetadata::state)
    }

    /// Whether the record reached Completed or Failed
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Time between request start and completion
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.response.as_ref().map(|response| {
            response
                .completed_at
                .duration_since(self.request.started_at)
                .unwrap_or_default()
        })
    }

    /// Attach the response; refused once terminal
    pub(crate) fn complete(&mut self, response: ResponseMetadata) -> bool {
        if self.response.is_some() {
            return false;
        }
        self.response = Some(response);
        true
    }

    pub(crate) fn truncate_request_body(&mut self, limit: usize) {
        self.request.body.truncate(limit);
    }
}

impl PartialEq for TransactionRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TransactionRecord {}

impl Hash for TransactionRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
