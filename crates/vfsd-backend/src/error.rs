use thiserror::Error;

/// Boxed cause carried by [`VfsError::Transport`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors a backend verb can complete with.
///
/// Callers are expected to branch on the kind, never on the message.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Network, DNS, TLS or redirect failure below the HTTP status level.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// Non-success HTTP status with no more specific mapping.
    #[error("HTTP Error: {reason}")]
    Protocol { status: u16, reason: String },

    /// The response body was not the XML document we asked for.
    #[error("{0}")]
    Parse(String),

    /// The multistatus root element had no children.
    #[error("Empty response")]
    EmptyResponse,

    /// The resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The target already exists.
    #[error("{0}")]
    Exists(String),

    /// A directory was found where a file was expected.
    #[error("{0}")]
    IsDirectory(String),

    /// A file was found where a directory was expected.
    #[error("{0}")]
    NotDirectory(String),

    /// The directory still has children.
    #[error("{0}")]
    NotEmpty(String),

    /// Moving a directory over a directory would merge them.
    #[error("{0}")]
    WouldMerge(String),

    /// A server side recursive copy would be required.
    #[error("{0}")]
    WouldRecurse(String),

    /// The entity tag precondition did not hold.
    #[error("{0}")]
    WrongETag(String),

    /// The server refused access.
    #[error("{0}")]
    PermissionDenied(String),

    /// The server or a gateway timed out.
    #[error("{0}")]
    TimedOut(String),

    /// The operation is not supported by this backend or server.
    #[error("{0}")]
    NotSupported(String),

    /// The server has no space left.
    #[error("{0}")]
    NoSpace(String),

    /// Backups are requested but cannot be made.
    #[error("{0}")]
    CantCreateBackup(String),

    /// The user declined a credential or certificate prompt.
    #[error("Password dialog cancelled")]
    AuthenticationCancelled,

    /// The operation's cancellation token fired.
    #[error("Operation was cancelled")]
    Cancelled,

    /// Malformed arguments, e.g. a mount spec without a host.
    #[error("{0}")]
    InvalidArgument(String),

    /// Generic failure carrying a human-readable reason.
    #[error("{0}")]
    Failed(String),

    /// Local I/O error (push reads local files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VfsError {
    /// Maps an HTTP status onto the closest error kind.
    ///
    /// The reason phrase is kept as the message for every kind, so the
    /// user-visible text reads `HTTP Error: {reason}` whatever the mapping.
    pub fn from_status(status: u16, reason: &str) -> Self {
        let message = format!("HTTP Error: {}", reason);
        match status {
            401 | 402 | 403 => VfsError::PermissionDenied(message),
            404 | 410 => VfsError::NotFound(message),
            408 | 504 => VfsError::TimedOut(message),
            501 => VfsError::NotSupported(message),
            507 => VfsError::NoSpace(message),
            _ => VfsError::Protocol {
                status,
                reason: reason.to_string(),
            },
        }
    }

    /// Returns the HTTP status this error was built from, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            VfsError::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound(_))
    }
}

/// Result type for backend verbs.
pub type Result<T> = std::result::Result<T, VfsError>;
