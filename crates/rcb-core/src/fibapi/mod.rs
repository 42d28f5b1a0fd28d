//! Port for the FIB API (upstream) plus validation of its responses.

use async_trait::async_trait;
use serde::Deserialize;

use crate::Result;

pub mod models;

/// OAuth grant sent to `POST /o/token`. Client credentials are added by the adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode { code: String },
    RefreshToken { refresh_token: String },
}

impl TokenGrant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            TokenGrant::AuthorizationCode { .. } => "authorization_code",
            TokenGrant::RefreshToken { .. } => "refresh_token",
        }
    }
}

/// Raw token endpoint response. Every field is untrusted until the token manager checks it.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Thin HTTP calls to the FIB API.
///
/// Data endpoints return the raw JSON body; callers validate it with [`models`].
#[async_trait]
pub trait FibApi: Send + Sync {
    async fn exchange_token(&self, grant: TokenGrant) -> Result<TokenResponse>;

    /// `POST /o/revoke_token/` for an access or refresh token.
    async fn revoke_token(&self, token: &str) -> Result<()>;

    /// `GET /jo.json`
    async fn user_info(&self, bearer: &str) -> Result<serde_json::Value>;

    /// `GET /jo/avisos.json`
    async fn notices(&self, bearer: &str) -> Result<serde_json::Value>;
}
