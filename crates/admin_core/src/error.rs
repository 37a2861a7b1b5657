use thiserror::Error;

use crate::input::InputError;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("invalid backend url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned {status}: {}", .message.as_deref().unwrap_or("no detail"))]
    Server {
        endpoint: String,
        status: u16,
        message: Option<String>,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl DashboardError {
    pub fn transport(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// True when the failure was caught locally and no request was issued.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Input(_) | Self::InvalidBaseUrl { .. })
    }

    /// Text for the operator notification. Local validation errors and
    /// server-supplied messages are shown verbatim; everything else falls
    /// back to `fallback`.
    pub fn notification_text(&self, fallback: &str) -> String {
        match self {
            Self::Input(err) => err.to_string(),
            Self::Server {
                message: Some(message),
                ..
            } => message.clone(),
            _ => fallback.to_string(),
        }
    }
}
