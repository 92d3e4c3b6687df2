//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use crate::settings::SyncSettings;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use timeflow_sync_protocol::{
    AckRequest, AckResponse, PullRequest, PullResponse, PushRequest, PushResponse, StatusRequest,
    StatusResponse,
};

/// Where and how to reach the sync server for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Bearer token, if any.
    pub api_token: Option<String>,
    /// Deadline for the whole request.
    pub timeout: Duration,
}

impl Endpoint {
    /// Creates an endpoint without authentication.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            timeout,
        }
    }

    /// Builds the endpoint described by the user's settings.
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            base_url: settings.server_url.clone(),
            api_token: settings.bearer_token().map(str::to_string),
            timeout: settings.request_timeout(),
        }
    }

    /// Sets the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Replaces the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// A sync transport performs the remote calls of the sync protocol.
///
/// Implementations are stateless with respect to the protocol: every call
/// carries its own endpoint, so settings changes apply to the next call.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Asks the server which direction to sync.
    async fn status(&self, endpoint: &Endpoint, request: &StatusRequest)
        -> SyncResult<StatusResponse>;

    /// Fetches the latest archive if the client is behind.
    async fn pull(&self, endpoint: &Endpoint, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Uploads the local archive.
    async fn push(&self, endpoint: &Endpoint, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Acknowledges an imported revision.
    async fn ack(&self, endpoint: &Endpoint, request: &AckRequest) -> SyncResult<AckResponse>;
}

/// A request recorded by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    /// Status request.
    Status(StatusRequest),
    /// Pull request.
    Pull(PullRequest),
    /// Push request.
    Push(PushRequest),
    /// Ack request.
    Ack(AckRequest),
}

impl TransportCall {
    /// Endpoint name of the call.
    pub fn name(&self) -> &'static str {
        match self {
            TransportCall::Status(_) => "status",
            TransportCall::Pull(_) => "pull",
            TransportCall::Push(_) => "push",
            TransportCall::Ack(_) => "ack",
        }
    }
}

struct Script<T> {
    queued: VecDeque<SyncResult<T>>,
    fallback: Option<T>,
}

impl<T: Clone> Script<T> {
    fn next(&mut self, name: &str) -> SyncResult<T> {
        if let Some(reply) = self.queued.pop_front() {
            return reply;
        }
        self.fallback
            .clone()
            .ok_or_else(|| SyncError::Protocol(format!("no mock {name} response set")))
    }
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            queued: VecDeque::new(),
            fallback: None,
        }
    }
}

/// A scripted transport for testing.
///
/// Each endpoint answers from a queue of one-shot replies, then from a
/// sticky response. Every request is recorded before any artificial latency
/// elapses.
#[derive(Default)]
pub struct MockTransport {
    status: Mutex<Script<StatusResponse>>,
    pull: Mutex<Script<PullResponse>>,
    push: Mutex<Script<PushResponse>>,
    ack: Mutex<Script<AckResponse>>,
    calls: Mutex<Vec<TransportCall>>,
    latency: Mutex<Duration>,
}

impl MockTransport {
    /// Creates a mock transport with no responses set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sticky status response.
    pub fn set_status_response(&self, response: StatusResponse) {
        self.status.lock().fallback = Some(response);
    }

    /// Sets the sticky pull response.
    pub fn set_pull_response(&self, response: PullResponse) {
        self.pull.lock().fallback = Some(response);
    }

    /// Sets the sticky push response.
    pub fn set_push_response(&self, response: PushResponse) {
        self.push.lock().fallback = Some(response);
    }

    /// Sets the sticky ack response.
    pub fn set_ack_response(&self, response: AckResponse) {
        self.ack.lock().fallback = Some(response);
    }

    /// Queues a one-shot status reply.
    pub fn queue_status(&self, reply: SyncResult<StatusResponse>) {
        self.status.lock().queued.push_back(reply);
    }

    /// Queues a one-shot pull reply.
    pub fn queue_pull(&self, reply: SyncResult<PullResponse>) {
        self.pull.lock().queued.push_back(reply);
    }

    /// Queues a one-shot push reply.
    pub fn queue_push(&self, reply: SyncResult<PushResponse>) {
        self.push.lock().queued.push_back(reply);
    }

    /// Queues a one-shot ack reply.
    pub fn queue_ack(&self, reply: SyncResult<AckResponse>) {
        self.ack.lock().queued.push_back(reply);
    }

    /// Delays every reply by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Returns all recorded calls.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    /// Returns the names of all recorded calls, in order.
    pub fn call_names(&self) -> Vec<&'static str> {
        self.calls.lock().iter().map(TransportCall::name).collect()
    }

    /// Number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    async fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn status(
        &self,
        _endpoint: &Endpoint,
        request: &StatusRequest,
    ) -> SyncResult<StatusResponse> {
        self.record(TransportCall::Status(request.clone())).await;
        self.status.lock().next("status")
    }

    async fn pull(&self, _endpoint: &Endpoint, request: &PullRequest) -> SyncResult<PullResponse> {
        self.record(TransportCall::Pull(request.clone())).await;
        self.pull.lock().next("pull")
    }

    async fn push(&self, _endpoint: &Endpoint, request: &PushRequest) -> SyncResult<PushResponse> {
        self.record(TransportCall::Push(request.clone())).await;
        self.push.lock().next("push")
    }

    async fn ack(&self, _endpoint: &Endpoint, request: &AckRequest) -> SyncResult<AckResponse> {
        self.record(TransportCall::Ack(request.clone())).await;
        self.ack.lock().next("ack")
    }
}
