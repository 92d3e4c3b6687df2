//! Full-dataset archives and import summaries.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Collections under `data` whose presence makes an archive usable for a reseed.
const RESEED_COLLECTIONS: [&str; 4] = ["sessions", "manual_sessions", "projects", "applications"];

/// A complete serialized snapshot of the local dataset.
///
/// The sync engine treats archives as opaque: it only moves them between the
/// host application and the server. The wrapped JSON value is whatever the
/// host's export routine produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Archive(Value);

impl Archive {
    /// Wraps a JSON value as an archive.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parses an archive from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(ProtocolError::invalid_structure("archive must be a JSON object"));
        }
        Ok(Self(value))
    }

    /// Returns the wrapped JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the archive and returns the JSON value.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Encodes the archive as canonical JSON (object keys sorted, no whitespace).
    pub fn to_canonical_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(&canonicalize(&self.0))?)
    }

    /// Returns the lowercase hex SHA-256 of the canonical JSON encoding.
    ///
    /// Two archives with the same content hash identically regardless of the
    /// key order they were built with.
    pub fn payload_sha256(&self) -> ProtocolResult<String> {
        let bytes = self.to_canonical_json()?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }

    /// Returns true if the archive carries any user data worth reseeding a server with.
    pub fn has_reseed_data(&self) -> bool {
        let Some(data) = self.0.get("data") else {
            return false;
        };

        let has_rows = RESEED_COLLECTIONS.iter().any(|name| {
            data.get(*name)
                .and_then(Value::as_array)
                .is_some_and(|rows| !rows.is_empty())
        });

        let has_daily_files = data
            .get("daily_files")
            .and_then(Value::as_object)
            .is_some_and(|files| !files.is_empty());

        has_rows || has_daily_files
    }
}

impl From<Value> for Archive {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// What the host application did with an imported archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSummary {
    /// Projects created by the import.
    pub projects_created: u64,
    /// Applications created by the import.
    pub apps_created: u64,
    /// Sessions inserted.
    pub sessions_imported: u64,
    /// Sessions merged into existing rows.
    pub sessions_merged: u64,
    /// Daily tracker files written.
    pub daily_files_imported: u64,
}

impl ImportSummary {
    /// Summary of replacing a dataset wholesale with `archive`.
    ///
    /// Every row counts as created or imported; nothing is merged.
    pub fn replacing_with(archive: &Archive) -> Self {
        let data = archive.as_value().get("data");
        let rows = |name: &str| {
            data.and_then(|d| d.get(name))
                .and_then(Value::as_array)
                .map_or(0, |rows| rows.len() as u64)
        };
        let daily_files = data
            .and_then(|d| d.get("daily_files"))
            .and_then(Value::as_object)
            .map_or(0, |files| files.len() as u64);

        Self {
            projects_created: rows("projects"),
            apps_created: rows("applications"),
            sessions_imported: rows("sessions") + rows("manual_sessions"),
            sessions_merged: 0,
            daily_files_imported: daily_files,
        }
    }
}
