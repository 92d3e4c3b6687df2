//! HTTP transport implementation.
//!
//! The JSON mapping and error classification live in [`HttpTransport`]; the
//! actual HTTP client is abstracted via [`HttpClient`] so the transport can
//! run over `reqwest` in production and over an in-process loopback in tests.

use crate::error::{SyncError, SyncResult};
use crate::transport::{Endpoint, SyncTransport};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use timeflow_sync_protocol::{
    AckRequest, AckResponse, PullRequest, PullResponse, PushRequest, PushResponse, StatusRequest,
    StatusResponse, ACK_PATH, PULL_PATH, PUSH_PATH, STATUS_PATH,
};
use tracing::debug;

/// Raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpReply {
    /// Creates a reply.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations must enforce `timeout` over the whole exchange and report
/// it as [`SyncError::Timeout`]; connection failures map to
/// [`SyncError::Network`]. Non-2xx statuses are not errors at this level.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a JSON POST request.
    async fn post(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: Vec<u8>,
        timeout: Duration,
    ) -> SyncResult<HttpReply>;
}

/// HTTP-based sync transport using JSON bodies.
pub struct HttpTransport<C: HttpClient> {
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    async fn post_json<Req, Res>(
        &self,
        endpoint: &Endpoint,
        path: &str,
        request: &Req,
    ) -> SyncResult<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)?;
        let url = endpoint.url(path);
        debug!(%url, bytes = body.len(), "sync request");

        let reply = self
            .client
            .post(&url, endpoint.api_token.as_deref(), body, endpoint.timeout)
            .await?;

        decode_reply(reply)
    }
}

impl<C: HttpClient> std::fmt::Debug for HttpTransport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport").finish_non_exhaustive()
    }
}

/// Maps a raw reply to a typed response or a [`SyncError`].
///
/// Non-2xx replies carry the server's `error` field when the body is JSON,
/// else `HTTP <status>`. A 2xx body that is not the expected JSON is
/// [`SyncError::InvalidJson`].
pub fn decode_reply<Res: DeserializeOwned>(reply: HttpReply) -> SyncResult<Res> {
    if !reply.is_success() {
        let message = serde_json::from_slice::<Value>(&reply.body)
            .ok()
            .and_then(|json| json.get("error").and_then(Value::as_str).map(str::to_string));
        return Err(SyncError::http(reply.status, message));
    }

    serde_json::from_slice(&reply.body).map_err(|e| SyncError::InvalidJson(e.to_string()))
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn status(
        &self,
        endpoint: &Endpoint,
        request: &StatusRequest,
    ) -> SyncResult<StatusResponse> {
        self.post_json(endpoint, STATUS_PATH, request).await
    }

    async fn pull(&self, endpoint: &Endpoint, request: &PullRequest) -> SyncResult<PullResponse> {
        self.post_json(endpoint, PULL_PATH, request).await
    }

    async fn push(&self, endpoint: &Endpoint, request: &PushRequest) -> SyncResult<PushResponse> {
        self.post_json(endpoint, PUSH_PATH, request).await
    }

    async fn ack(&self, endpoint: &Endpoint, request: &AckRequest) -> SyncResult<AckResponse> {
        self.post_json(endpoint, ACK_PATH, request).await
    }
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with default connection settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn post(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: Vec<u8>,
        timeout: Duration,
    ) -> SyncResult<HttpReply> {
        let mut request = self
            .client
            .post(url)
            .timeout(timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);

        if let Some(token) = bearer.map(str::trim).filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(HttpReply::new(status, body.to_vec()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::Network(err.to_string())
    }
}

/// Trait for servers that can handle loopback requests.
#[async_trait]
pub trait LoopbackServer: Send + Sync {
    /// Handles a POST request and returns the status and body.
    async fn handle_post(&self, path: &str, bearer: Option<&str>, body: &[u8]) -> (u16, Vec<u8>);
}

/// A loopback HTTP client that routes requests directly to a sync server.
///
/// Useful for testing without a network. The timeout is still enforced.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn post(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: Vec<u8>,
        timeout: Duration,
    ) -> SyncResult<HttpReply> {
        let path = url.find("/api/").map(|i| &url[i..]).unwrap_or(url);

        let (status, body) = tokio::time::timeout(timeout, self.server.handle_post(path, bearer, &body))
            .await
            .map_err(|_| SyncError::Timeout)?;

        Ok(HttpReply::new(status, body))
    }
}
