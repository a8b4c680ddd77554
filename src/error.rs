use thiserror::Error;

/// Detail used when a failed response carries no readable `{detail}` body.
pub const UNKNOWN_ERROR_DETAIL: &str = "Unknown error";

/// Coarse classification of an [`ApiError`], for callers that only need to
/// branch on the failure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The service could not be reached (DNS, refused connection, timeout).
    Network,
    /// The service answered with a non-success status.
    Http,
    /// Anything else, including malformed or contract-breaking bodies.
    Unexpected,
}

/// Failure of a single call to the remote statistics/chat service.
///
/// Every transport error is translated into one of these variants at the
/// client boundary, so no `reqwest::Error` reaches the controllers.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Network error: unable to connect to {service} at {base_url}: {reason}")]
    Network {
        service: &'static str,
        base_url: String,
        reason: String,
    },

    #[error("{service} request failed ({status}): {detail}")]
    Http {
        service: &'static str,
        status: u16,
        detail: String,
    },

    #[error("Unexpected error: {detail}")]
    Unexpected { detail: String },
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Http { .. } => ErrorKind::Http,
            Self::Unexpected { .. } => ErrorKind::Unexpected,
        }
    }

    /// HTTP status, only for [`ErrorKind::Http`].
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Http { detail, .. } | Self::Unexpected { detail } => Some(detail),
            Self::Network { .. } => None,
        }
    }

    pub(crate) fn unexpected(detail: impl Into<String>) -> Self {
        Self::Unexpected {
            detail: detail.into(),
        }
    }

    /// Human-readable message for display in controller state.
    ///
    /// HTTP failures surface the server's own detail; network failures carry
    /// guidance about the service being up rather than the raw transport text.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network {
                service, base_url, ..
            } => format!(
                "Network error: unable to connect to {service} at {base_url}. \
                 Make sure the service is running."
            ),
            Self::Http {
                service,
                status,
                detail,
            } => format!("{service} request failed ({status}): {detail}"),
            Self::Unexpected { detail } => format!("Unexpected error: {detail}"),
        }
    }
}
