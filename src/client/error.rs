use thiserror::Error;

/// Classified outcome of a failed remote call
///
/// `Blocked` and `Verification` mean the session or address has been flagged;
/// callers end the current keyword or creator loop on them. `DataFetch` and
/// `Malformed` are ordinary data errors. `SigningUnavailable` is fatal for the
/// request that hit it and lets the driver offer a session refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Blocked by remote: {message}")]
    Blocked { message: String },

    #[error("Verification challenge ({kind}, uuid {uuid})")]
    Verification { kind: String, uuid: String },

    #[error("Data fetch failed: {message}")]
    DataFetch { message: String },

    #[error("Malformed response: {message}")]
    Malformed { message: String },

    #[error("Signing function unavailable after {attempts} attempt(s): {reason}")]
    SigningUnavailable { attempts: u32, reason: String },

    #[error("Cannot resolve seed: {0}")]
    Parse(String),
}

impl ApiError {
    pub fn blocked(message: impl Into<String>) -> Self {
        Self::Blocked {
            message: message.into(),
        }
    }

    pub fn data_fetch(message: impl Into<String>) -> Self {
        Self::DataFetch {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Whether the remote flagged the session rather than failing the request
    pub fn is_block(&self) -> bool {
        matches!(self, Self::Blocked { .. } | Self::Verification { .. })
    }
}

/// Result type alias for remote calls
pub type ApiResult<T> = std::result::Result<T, ApiError>;
