//! Main sync server.

use crate::auth::TokenSigner;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::RequestHandler;
use crate::revisions::RevisionStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use timeflow_sync_protocol::{
    AckRequest, AckResponse, ErrorBody, PullRequest, PullResponse, PushRequest, PushResponse,
    StatusRequest, StatusResponse, ACK_PATH, PULL_PATH, PUSH_PATH, STATUS_PATH,
};

/// The sync server.
///
/// This server answers the four sync endpoints for any number of users. It
/// keeps every user's revisions in a [`RevisionStore`] and optionally
/// requires per-user bearer tokens.
///
/// # Example
///
/// ```
/// use timeflow_sync_server::{SyncServer, ServerConfig};
///
/// let server = SyncServer::new(ServerConfig::default());
///
/// let body = br#"{"userId":"u1","deviceId":"d1","clientRevision":0,"clientHash":null}"#;
/// let (status, reply) = server.handle_http("/api/sync/status", None, body);
/// assert_eq!(status, 200);
/// assert!(String::from_utf8(reply).unwrap().contains("server_empty"));
/// ```
pub struct SyncServer {
    config: ServerConfig,
    handler: RequestHandler,
    store: Arc<RevisionStore>,
    signer: Option<TokenSigner>,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        let store = Arc::new(RevisionStore::new(config.retained_archives));
        Self::with_store(config, store)
    }

    /// Creates a sync server with an existing revision store.
    pub fn with_store(config: ServerConfig, store: Arc<RevisionStore>) -> Self {
        let signer = config
            .auth_secret
            .clone()
            .filter(|_| config.require_auth)
            .map(TokenSigner::new);

        Self {
            handler: RequestHandler::new(Arc::clone(&store)),
            store,
            signer,
            config,
        }
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the revision store.
    pub fn store(&self) -> &Arc<RevisionStore> {
        &self.store
    }

    /// Returns the token signer, if authentication is enabled.
    pub fn signer(&self) -> Option<&TokenSigner> {
        self.signer.as_ref()
    }

    /// Handles a status request.
    pub fn handle_status(
        &self,
        bearer: Option<&str>,
        request: StatusRequest,
    ) -> ServerResult<StatusResponse> {
        self.authorize(bearer, &request.user_id)?;
        self.handler.handle_status(request)
    }

    /// Handles a pull request.
    pub fn handle_pull(
        &self,
        bearer: Option<&str>,
        request: PullRequest,
    ) -> ServerResult<PullResponse> {
        self.authorize(bearer, &request.user_id)?;
        self.handler.handle_pull(request)
    }

    /// Handles a push request.
    pub fn handle_push(
        &self,
        bearer: Option<&str>,
        request: PushRequest,
    ) -> ServerResult<PushResponse> {
        self.authorize(bearer, &request.user_id)?;
        self.handler.handle_push(request)
    }

    /// Handles an acknowledgement request.
    pub fn handle_ack(&self, bearer: Option<&str>, request: AckRequest) -> ServerResult<AckResponse> {
        self.authorize(bearer, &request.user_id)?;
        self.handler.handle_ack(request)
    }

    /// Handles a raw HTTP POST (dispatches to the appropriate handler).
    ///
    /// Successful replies are the response body with `"ok": true` added.
    /// Failures are answered with the error's status code and
    /// `{"ok": false, "error": "..."}`.
    pub fn handle_http(&self, path: &str, bearer: Option<&str>, body: &[u8]) -> (u16, Vec<u8>) {
        match self.dispatch(path, bearer, body) {
            Ok(value) => (200, encode(&value)),
            Err(err) => {
                if err.is_server_error() {
                    tracing::error!(path, error = %err, "request failed");
                } else {
                    tracing::debug!(path, error = %err, "request rejected");
                }
                let body = serde_json::to_value(ErrorBody::new(err.to_string()))
                    .unwrap_or(Value::Null);
                (err.status_code(), encode(&body))
            }
        }
    }

    fn dispatch(&self, path: &str, bearer: Option<&str>, body: &[u8]) -> ServerResult<Value> {
        if body.len() > self.config.max_archive_bytes {
            return Err(ServerError::PayloadTooLarge {
                size: body.len(),
                limit: self.config.max_archive_bytes,
            });
        }

        match path {
            STATUS_PATH => reply(self.handle_status(bearer, decode(body)?)?),
            PULL_PATH => reply(self.handle_pull(bearer, decode(body)?)?),
            PUSH_PATH => reply(self.handle_push(bearer, decode(body)?)?),
            ACK_PATH => reply(self.handle_ack(bearer, decode(body)?)?),
            other => Err(ServerError::NotFound(other.to_string())),
        }
    }

    fn authorize(&self, bearer: Option<&str>, user_id: &str) -> ServerResult<()> {
        let Some(signer) = &self.signer else {
            return Ok(());
        };

        let token = bearer
            .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ServerError::unauthorized("missing bearer token"))?;

        signer.verify(user_id, token)
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> ServerResult<T> {
    Ok(serde_json::from_slice(body)?)
}

fn reply<T: Serialize>(response: T) -> ServerResult<Value> {
    let mut value = serde_json::to_value(response)?;
    if let Value::Object(fields) = &mut value {
        fields.insert("ok".into(), Value::Bool(true));
    }
    Ok(value)
}

fn encode(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}
