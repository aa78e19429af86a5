use thiserror::Error;

/// Every failure the client, the session and the bridge can report.
///
/// `Clone` because one login outcome is handed to every caller that waited
/// for it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Missing or invalid configuration for the triggering request.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Login rejected by the vendor, failed in transport, or timed out.
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// The cached token was rejected; the session has already been cleared.
    #[error("session token expired")]
    TokenExpired,

    /// Non-auth HTTP failure or a vendor result code other than "1".
    #[error("API error: {0}")]
    ApiError(String),

    /// The expected data node was absent. Not reported to the view layer.
    #[error("no data: {0}")]
    EmptyResult(String),

    /// Body could not be parsed: (reason, raw body).
    #[error("invalid API response ({0}): {1}")]
    InvalidResponse(String, String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl Error {
    /// Vendor or transport message without the category prefix.
    pub fn message(&self) -> String {
        match self {
            Error::ConfigError(m)
            | Error::AuthError(m)
            | Error::ApiError(m)
            | Error::EmptyResult(m)
            | Error::InternalError(m) => m.clone(),
            Error::InvalidResponse(reason, _) => reason.clone(),
            Error::TokenExpired => String::from("session token expired"),
        }
    }
}
