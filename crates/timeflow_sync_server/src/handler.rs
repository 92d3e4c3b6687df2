//! Request handlers for sync endpoints.

use crate::error::{ServerError, ServerResult};
use crate::revisions::{RevisionStore, StoredRevision};
use std::sync::Arc;
use timeflow_sync_protocol::{
    reason, AckRequest, AckResponse, PullRequest, PullResponse, PushRequest, PushResponse,
    StatusRequest, StatusResponse,
};

/// Handler for sync requests.
///
/// Handlers decide everything from the stored revisions; they never look at
/// the transport. Authentication and size limits are enforced by
/// [`SyncServer`](crate::SyncServer) before a request reaches them.
pub struct RequestHandler {
    store: Arc<RevisionStore>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(store: Arc<RevisionStore>) -> Self {
        Self { store }
    }

    /// Handles a status request.
    pub fn handle_status(&self, request: StatusRequest) -> ServerResult<StatusResponse> {
        require_ids(&request.user_id, &request.device_id)?;

        let Some(latest) = self.store.latest(&request.user_id) else {
            return Ok(StatusResponse {
                server_revision: Some(0),
                server_hash: None,
                should_push: true,
                should_pull: false,
                reason: reason::SERVER_EMPTY.into(),
            });
        };

        let same_hash = request.client_hash.as_deref() == Some(latest.payload_sha256.as_str());
        let (should_push, should_pull, why) = if latest.is_pruned() && !same_hash {
            (true, false, reason::SERVER_SNAPSHOT_PRUNED)
        } else if same_hash {
            (false, false, reason::SAME_HASH)
        } else if request.client_revision < latest.revision {
            (false, true, reason::SERVER_NEWER)
        } else {
            (true, false, reason::CLIENT_CHANGED)
        };

        tracing::debug!(
            user_id = %request.user_id,
            device_id = %request.device_id,
            client_revision = request.client_revision,
            server_revision = latest.revision,
            reason = why,
            "status"
        );

        Ok(StatusResponse {
            server_revision: Some(latest.revision),
            server_hash: Some(latest.payload_sha256),
            should_push,
            should_pull,
            reason: why.into(),
        })
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, request: PullRequest) -> ServerResult<PullResponse> {
        require_ids(&request.user_id, &request.device_id)?;

        let Some(latest) = self.store.latest(&request.user_id) else {
            return Ok(PullResponse::no_update(None, None, reason::SERVER_EMPTY));
        };

        if request.client_revision >= latest.revision {
            return Ok(PullResponse::no_update(
                Some(latest.revision),
                Some(latest.payload_sha256),
                reason::CLIENT_UP_TO_DATE,
            ));
        }

        let StoredRevision {
            revision,
            payload_sha256,
            archive,
            received_at,
            ..
        } = latest;

        let Some(archive) = archive else {
            tracing::info!(user_id = %request.user_id, revision, "pull of pruned snapshot");
            return Ok(PullResponse::no_update(
                Some(revision),
                Some(payload_sha256),
                reason::SERVER_SNAPSHOT_PRUNED,
            ));
        };

        tracing::debug!(
            user_id = %request.user_id,
            device_id = %request.device_id,
            revision,
            "serving archive"
        );

        let mut response = PullResponse::update(revision, payload_sha256, archive);
        response.received_at = Some(received_at.to_rfc3339());
        Ok(response)
    }

    /// Handles a push request.
    ///
    /// A payload identical to the latest revision is not stored again.
    /// Otherwise it becomes the next revision, whatever revision the client
    /// based it on.
    pub fn handle_push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        require_ids(&request.user_id, &request.device_id)?;

        let payload_sha256 = request
            .archive
            .payload_sha256()
            .map_err(|e| ServerError::Internal(format!("hashing archive: {e}")))?;

        let (stored, no_op) = self.store.append(
            &request.user_id,
            &request.device_id,
            request.archive,
            payload_sha256,
        );

        if no_op {
            tracing::debug!(user_id = %request.user_id, revision = stored.revision, "push deduplicated");
        } else {
            tracing::info!(
                user_id = %request.user_id,
                device_id = %request.device_id,
                revision = stored.revision,
                known_server_revision = request.known_server_revision,
                "stored revision"
            );
        }

        Ok(PushResponse {
            accepted: Some(true),
            no_op,
            revision: stored.revision,
            payload_sha256: stored.payload_sha256,
            received_at: Some(stored.received_at.to_rfc3339()),
            reason: (if no_op { reason::SAME_HASH } else { reason::ACCEPTED }).into(),
        })
    }

    /// Handles an acknowledgement request.
    pub fn handle_ack(&self, request: AckRequest) -> ServerResult<AckResponse> {
        require_ids(&request.user_id, &request.device_id)?;

        let latest = self.store.latest(&request.user_id);
        let server_revision = latest.as_ref().map_or(0, |stored| stored.revision);
        let server_hash = latest.map(|stored| stored.payload_sha256);

        let mut response = AckResponse {
            accepted: false,
            revision: request.revision,
            payload_sha256: request.payload_sha256.clone(),
            server_revision,
            server_hash,
            is_latest: request.revision == server_revision,
            reason: String::new(),
        };

        match self.store.get(&request.user_id, request.revision) {
            None => response.reason = reason::UNKNOWN_REVISION.into(),
            Some(stored) if stored.payload_sha256 != request.payload_sha256 => {
                response.reason = reason::HASH_MISMATCH_FOR_REVISION.into();
            }
            Some(_) => {
                self.store
                    .record_ack(&request.user_id, &request.device_id, request.revision);
                response.accepted = true;
                response.reason = reason::ACK_RECORDED.into();
            }
        }

        tracing::debug!(
            user_id = %request.user_id,
            device_id = %request.device_id,
            revision = request.revision,
            accepted = response.accepted,
            reason = %response.reason,
            "ack"
        );

        Ok(response)
    }
}

fn require_ids(user_id: &str, device_id: &str) -> ServerResult<()> {
    if user_id.trim().is_empty() {
        return Err(ServerError::invalid_request("userId is required"));
    }
    if device_id.trim().is_empty() {
        return Err(ServerError::invalid_request("deviceId is required"));
    }
    Ok(())
}
