//! # TimeFlow Sync Protocol
//!
//! Wire types for the TimeFlow online sync protocol.
//!
//! This crate provides:
//! - Request/response bodies for the four endpoints (status, pull, push, ack)
//! - [`Archive`], the opaque full-dataset snapshot exchanged on push and pull
//! - [`ImportSummary`], the collaborator's report after applying an archive
//! - Reason strings the server and client agree on
//!
//! All bodies are JSON with camelCase field names. This is a pure protocol
//! crate with no I/O operations.
//!
//! ## Endpoints
//!
//! | Path | Request | Response |
//! |---|---|---|
//! | [`STATUS_PATH`] | [`StatusRequest`] | [`StatusResponse`] |
//! | [`PULL_PATH`] | [`PullRequest`] | [`PullResponse`] |
//! | [`PUSH_PATH`] | [`PushRequest`] | [`PushResponse`] |
//! | [`ACK_PATH`] | [`AckRequest`] | [`AckResponse`] |

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod archive;
mod error;
mod messages;
pub mod reason;

pub use archive::{Archive, ImportSummary};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    AckRequest, AckResponse, ErrorBody, PullRequest, PullResponse, PushRequest, PushResponse,
    StatusRequest, StatusResponse,
};

/// Path of the status endpoint.
pub const STATUS_PATH: &str = "/api/sync/status";

/// Path of the pull endpoint.
pub const PULL_PATH: &str = "/api/sync/pull";

/// Path of the push endpoint.
pub const PUSH_PATH: &str = "/api/sync/push";

/// Path of the acknowledgement endpoint.
pub const ACK_PATH: &str = "/api/sync/ack";
