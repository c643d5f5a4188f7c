use thiserror::Error;

/**
    Errors from upstream API calls.
*/
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no access token available")]
    MissingToken,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// True for failures a fresh credential could fix (expired token, missing scope).
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ApiError::MissingToken | ApiError::Unauthorized(_) | ApiError::Forbidden(_)
        )
    }
}
