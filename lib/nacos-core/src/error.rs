use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Aborts the current pass and is recorded in the object's status
    #[error("[{code}] {message}")]
    Fatal { code: i32, message: String },

    #[error("Kubernetes error: {0}")]
    Kubernetes(#[from] kube::Error),

    /// Write rejected because the resource version was stale
    #[error("Conflict writing {0}")]
    Conflict(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn fatal(code: i32, message: impl Into<String>) -> Self {
        Error::Fatal {
            code,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Code of a fatal error
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Fatal { code, .. } => Some(*code),
            _ => None,
        }
    }
}
