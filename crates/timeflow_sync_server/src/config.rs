//! Server configuration.

/// Default upper bound for an encoded archive (16 MiB).
pub const DEFAULT_MAX_ARCHIVE_BYTES: usize = 16 * 1024 * 1024;

/// Default number of archives kept per user.
pub const DEFAULT_RETAINED_ARCHIVES: usize = 5;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum size of a request body, in bytes.
    pub max_archive_bytes: usize,
    /// Number of most recent revisions whose archives are kept per user.
    ///
    /// Older revisions keep their hash but lose their payload. Never below 1.
    pub retained_archives: usize,
    /// Whether to require a bearer token.
    pub require_auth: bool,
    /// Secret key for token validation (if auth enabled).
    pub auth_secret: Option<Vec<u8>>,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            max_archive_bytes: DEFAULT_MAX_ARCHIVE_BYTES,
            retained_archives: DEFAULT_RETAINED_ARCHIVES,
            require_auth: false,
            auth_secret: None,
        }
    }

    /// Sets the maximum request body size.
    pub fn with_max_archive_bytes(mut self, max: usize) -> Self {
        self.max_archive_bytes = max;
        self
    }

    /// Sets how many archives are retained per user.
    pub fn with_retained_archives(mut self, count: usize) -> Self {
        self.retained_archives = count.max(1);
        self
    }

    /// Enables authentication with the given secret.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.require_auth = true;
        self.auth_secret = Some(secret);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
