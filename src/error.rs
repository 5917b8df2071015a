// Error types for the plugin engine

use thiserror::Error;

/// Unified error type for plugin engine operations
///
/// This is the primary error type returned by the public API.
/// Individual component errors are exposed through `From` conversions.
#[derive(Debug, Error)]
pub enum DevstrapError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Selection failed: {0}")]
    Select(#[from] SelectError),

    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Plugin execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the remote registry client
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid registry URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Registry host '{0}' is not on the allowlist")]
    HostNotAllowed(String),

    #[error("Registry host '{0}' resolves to a private or loopback address")]
    PrivateAddress(String),

    #[error("Transport failure contacting {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("Registry returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Not found in registry: {0}")]
    NotFound(String),

    #[error("Invalid registry response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("Registry request cancelled")]
    Cancelled,
}

impl RegistryError {
    /// Whether a retry with backoff can be expected to help.
    ///
    /// Connection failures, timeouts, and DNS errors surface as
    /// `Transport`; rate limiting and server faults as `Status`
    /// 429/500/502/503/504. Everything else fails immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            RegistryError::Transport { .. } => true,
            RegistryError::Status { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}

/// Errors from plugin selection
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("Dependency cycle among plugins: {}", .members.join(" -> "))]
    DependencyCycle { members: Vec<String> },

    #[error("Plugin '{plugin}' conflicts with selected plugin '{conflicts_with}'")]
    Conflict {
        plugin: String,
        conflicts_with: String,
    },

    #[error("Invalid selection configuration: {0}")]
    Config(String),
}

/// Errors from plugin binary downloads
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Plugin '{0}' is not in the registry snapshot")]
    UnknownPlugin(String),

    #[error("Plugin '{name}' is not available for platform '{platform}'")]
    PlatformUnavailable { name: String, platform: String },

    #[error("Plugin '{0}' has no download URL for this platform")]
    MissingUrl(String),

    #[error("Plugin '{0}' has no checksum for this platform")]
    MissingChecksum(String),

    #[error("Plugin '{0}' reports a zero-length binary for this platform")]
    ZeroSize(String),

    #[error("Checksum mismatch for plugin '{name}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Download of '{name}' from {url} failed: {reason}")]
    Transfer {
        name: String,
        url: String,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the installed-plugin manager
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Plugin '{0}' is not installed")]
    NotInstalled(String),

    #[error("Plugin '{name}' introspection timed out after {seconds}s")]
    IntrospectionTimeout { name: String, seconds: u64 },

    #[error("Plugin '{name}' exited with status {code}")]
    CommandFailed { name: String, code: i32 },

    #[error("Plugin '{name}' was terminated by a signal")]
    Terminated { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
