/// Core error type for the bot.
///
/// Adapter crates should map their specific errors into this type so the bot
/// core can handle failures consistently (user-facing message vs terminal).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// No usable access/refresh token pair; the user has to authorize again.
    #[error("no usable FIB API credentials, please /login again")]
    CredentialsMissing,

    /// Token exchange rejected/malformed, or the upstream refused our bearer token.
    #[error("FIB API authorization error: {0}")]
    UpstreamAuth(String),

    #[error("invalid FIB API response: {entity} is missing field `{field}`")]
    UpstreamData {
        entity: &'static str,
        field: &'static str,
    },

    #[error("FIB API error: {0}")]
    Upstream(String),

    #[error("credential store error: {0}")]
    Persistence(String),

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Errors that can only be fixed by running the OAuth flow again.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, Error::CredentialsMissing | Error::UpstreamAuth(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
