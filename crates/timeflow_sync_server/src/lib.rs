//! # TimeFlow Sync Server
//!
//! Reference sync server for the TimeFlow online sync protocol.
//!
//! This crate provides:
//! - The server side of the status, pull, push and ack endpoints
//! - A per-user revision store with hash dedup and payload pruning
//! - Optional bearer authentication (HMAC-SHA256 tokens)
//!
//! # Architecture
//!
//! The server is transport-agnostic. [`SyncServer::handle_http`] takes a
//! request path, an optional bearer token and a JSON body, and returns an
//! HTTP status code with a JSON body. Embedding it behind a real HTTP
//! listener, or calling it in-process from tests, is up to the caller.
//!
//! # Authentication
//!
//! When a secret is configured every request must carry a bearer token
//! derived from the user id:
//!
//! ```rust
//! use timeflow_sync_server::{ServerConfig, TokenSigner};
//!
//! let secret = b"my-secure-secret".to_vec();
//! let config = ServerConfig::default().with_auth(secret.clone());
//!
//! let signer = TokenSigner::new(secret);
//! let token = signer.token_for("user-1").unwrap();
//! assert!(signer.verify("user-1", &token).is_ok());
//! ```
//!
//! # Revisions
//!
//! Each push whose payload hash differs from the latest one becomes
//! revision `latest + 1`; the last writer wins. Archives of revisions older
//! than the retention window are dropped, keeping only their hashes. When
//! the latest archive itself is gone, clients are told the snapshot was
//! pruned and are expected to reseed.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod revisions;
mod server;

pub use auth::TokenSigner;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use revisions::{RevisionStore, StoredRevision};
pub use server::SyncServer;
