use std::time::Duration;

/// Core error type for the engagement pipeline.
///
/// Adapter crates map their failures into [`ProviderError`] for remote calls;
/// this type covers local failures (config, storage, serialization).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single remote call (messaging provider or discovery source).
///
/// The retry policy is selected from [`ProviderError::kind`], never from the message text.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("rate limited, retry after {}s", wait.as_secs())]
    RateLimited { wait: Duration },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    RateLimited,
    PermissionDenied,
    NotFound,
    Transport,
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::RateLimited { .. } => ErrorKind::RateLimited,
            ProviderError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            ProviderError::NotFound(_) => ErrorKind::NotFound,
            ProviderError::Transport(_) => ErrorKind::Transport,
        }
    }

    pub fn transport(e: impl std::fmt::Display) -> Self {
        ProviderError::Transport(e.to_string())
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        let rl = ProviderError::RateLimited {
            wait: Duration::from_secs(7),
        };
        assert_eq!(rl.kind(), ErrorKind::RateLimited);
        assert_eq!(rl.to_string(), "rate limited, retry after 7s");
        assert_eq!(
            ProviderError::PermissionDenied("x".into()).kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(ProviderError::transport("boom").kind(), ErrorKind::Transport);
    }
}
