use std::sync::Arc;

use tracing::debug;

use crate::{
    fibapi::{
        models::{parse_notices, parse_user_info},
        FibApi,
    },
    notice::{Notice, UserInfo},
    tokens::TokenManager,
    Result,
};

/// FIB API calls authenticated through the [`TokenManager`], returning validated domain types.
pub struct UpstreamClient {
    api: Arc<dyn FibApi>,
    tokens: Arc<TokenManager>,
    login_redirect_base: String,
}

impl UpstreamClient {
    pub fn new(
        api: Arc<dyn FibApi>,
        tokens: Arc<TokenManager>,
        login_redirect_base: impl Into<String>,
    ) -> Self {
        Self {
            api,
            tokens,
            login_redirect_base: login_redirect_base.into(),
        }
    }

    /// Exchange an authorization code and confirm the new token by fetching the profile.
    pub async fn authorize(&self, code: &str) -> Result<UserInfo> {
        let access_token = self.tokens.authorize_with_code(code).await?;
        let body = self.api.user_info(&access_token).await?;
        parse_user_info(&body)
    }

    /// Revoke and forget the stored credentials. Returns whether any were held.
    pub async fn logout(&self) -> Result<bool> {
        self.tokens.logout().await
    }

    pub async fn user_info(&self) -> Result<UserInfo> {
        let bearer = self.tokens.valid_access_token().await?;
        let body = self.api.user_info(&bearer).await?;
        parse_user_info(&body)
    }

    /// The full current notice collection, in upstream order.
    pub async fn notices(&self) -> Result<Vec<Notice>> {
        let bearer = self.tokens.valid_access_token().await?;
        let body = self.api.notices(&bearer).await?;
        let notices = parse_notices(&body, &self.login_redirect_base)?;
        debug!(count = notices.len(), "fetched notices");
        Ok(notices)
    }

    pub async fn notice(&self, id: i64) -> Result<Option<Notice>> {
        Ok(self.notices().await?.into_iter().find(|n| n.id == id))
    }

    /// Most recently published notice, if any.
    pub async fn latest_notice(&self) -> Result<Option<Notice>> {
        Ok(self
            .notices()
            .await?
            .into_iter()
            .max_by_key(|n| n.published_at()))
    }
}
