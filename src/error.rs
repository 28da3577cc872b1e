use std::{fmt::Display, path::PathBuf};

/// The failure classes surfaced by every eris operation.
///
/// Runtime and filesystem failures carry a [stacked_errors::Error] so that the
/// context added at each layer survives up to the command line.
#[derive(Debug, thiserror::Error)]
pub enum ErisError {
    /// A referenced entity, container, definition file or field does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// A definition parsed as TOML but not into the expected shape, or could
    /// not be parsed at all
    #[error("malformed definition {path:?}: {reason}")]
    MalformedDefinition { path: PathBuf, reason: String },
    /// The container runtime rejected or failed an operation
    #[error("container runtime call failed: {0}")]
    RuntimeCallFailed(stacked_errors::Error),
    /// Creating, moving or removing something on the host failed
    #[error("filesystem failure: {0}")]
    FilesystemFailure(stacked_errors::Error),
    /// A host command such as `git` or `cargo` failed
    #[error("command failed: {0}")]
    CommandFailed(stacked_errors::Error),
    /// The user declined a confirmation prompt
    #[error("aborted: {0}")]
    Aborted(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, ErisError>;

impl ErisError {
    pub fn not_found(what: impl Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl Display) -> Self {
        Self::MalformedDefinition {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// A runtime failure from a plain message, for failures that are detected
    /// on our side of the API (e.g. a non-zero exit code)
    pub fn runtime_msg(msg: impl Display) -> Self {
        Self::RuntimeCallFailed(stacked_errors::Error::from_err(msg.to_string()))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedDefinition { .. })
    }

    pub fn is_runtime_failure(&self) -> bool {
        matches!(self, Self::RuntimeCallFailed(_))
    }

    pub fn is_filesystem_failure(&self) -> bool {
        matches!(self, Self::FilesystemFailure(_))
    }
}
