//! OAuth access/refresh token lifecycle for the FIB API.

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    errors::Error,
    fibapi::{FibApi, TokenGrant, TokenResponse},
    store::{CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY},
    Result,
};

/// FIB API tokens are fixed-length opaque strings.
pub const TOKEN_LEN: usize = 30;

/// Access tokens are treated as expired this long before the declared TTL.
pub const EARLY_EXPIRY: Duration = Duration::from_secs(30);

/// Cheap sanity check before a token ends up in a bearer header.
pub fn is_well_formed(token: &str) -> bool {
    token.chars().count() == TOKEN_LEN
}

#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
}

impl TokenPair {
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now < self.access_expires_at
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("access_expires_at", &self.access_expires_at)
            .finish()
    }
}

/// Owns the token pair and keeps a valid access token available to callers.
///
/// Exchanges are never retried here: authorization codes are single-use and
/// refresh tokens rotate, so a second attempt can only fail the same way or worse.
pub struct TokenManager {
    api: Arc<dyn FibApi>,
    store: Arc<dyn CredentialStore>,
    default_ttl: Duration,
    // Held across exchanges so one process never runs two refreshes at once.
    cached: Mutex<Option<TokenPair>>,
}

impl TokenManager {
    pub fn new(
        api: Arc<dyn FibApi>,
        store: Arc<dyn CredentialStore>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            api,
            store,
            default_ttl,
            cached: Mutex::new(None),
        }
    }

    pub async fn valid_access_token(&self) -> Result<String> {
        self.valid_access_token_at(Utc::now()).await
    }

    pub async fn valid_access_token_at(&self, now: DateTime<Utc>) -> Result<String> {
        let mut cached = self.cached.lock().await;

        match cached.as_ref() {
            Some(pair) if pair.is_usable_at(now) => return Ok(pair.access_token.clone()),
            Some(_) => {}
            None => {
                // Fresh process: the store's TTL makes a stale access token read as absent.
                if let Some(token) = self.store.get(ACCESS_TOKEN_KEY).await? {
                    if is_well_formed(&token) {
                        return Ok(token);
                    }
                    warn!("stored access token is malformed, refreshing");
                }
            }
        }

        // The in-memory refresh token is never older than the stored one (it is
        // written first), and it survives a failed store write.
        let refresh_token = match cached.as_ref() {
            Some(pair) => Some(pair.refresh_token.clone()),
            None => self.store.get(REFRESH_TOKEN_KEY).await?,
        };
        let refresh_token = refresh_token
            .filter(|t| is_well_formed(t))
            .ok_or(Error::CredentialsMissing)?;

        debug!("access token expired or missing, refreshing");
        self.exchange_locked(&mut cached, TokenGrant::RefreshToken { refresh_token }, now)
            .await
    }

    /// Initial `authorization_code` exchange.
    pub async fn authorize_with_code(&self, code: &str) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let token = self
            .exchange_locked(
                &mut cached,
                TokenGrant::AuthorizationCode {
                    code: code.to_string(),
                },
                Utc::now(),
            )
            .await?;
        info!("FIB API authorization completed");
        Ok(token)
    }

    /// `refresh_token` exchange with an explicit refresh token.
    pub async fn refresh(&self, existing_refresh_token: &str) -> Result<String> {
        let mut cached = self.cached.lock().await;
        self.exchange_locked(
            &mut cached,
            TokenGrant::RefreshToken {
                refresh_token: existing_refresh_token.to_string(),
            },
            Utc::now(),
        )
        .await
    }

    async fn exchange_locked(
        &self,
        cached: &mut Option<TokenPair>,
        grant: TokenGrant,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let grant_type = grant.grant_type();
        let resp = self.api.exchange_token(grant).await?;
        let pair = validate_token_response(resp, now, self.default_ttl)?;

        // Keep the pair usable for this process even if persisting it fails below.
        *cached = Some(pair.clone());

        if let Err(e) = self.persist(&pair, now).await {
            warn!(grant_type, error = %e, "token pair obtained but not persisted");
            return Err(e);
        }

        info!(
            grant_type,
            expires_at = %pair.access_expires_at,
            "stored new FIB API token pair"
        );
        Ok(pair.access_token)
    }

    /// Revoke the current token upstream and forget both tokens locally.
    ///
    /// Returns whether any credentials were held. A failed revocation is only
    /// logged; the local tokens are cleared either way.
    pub async fn logout(&self) -> Result<bool> {
        let mut cached = self.cached.lock().await;
        let pair = cached.take();

        let access_token = match &pair {
            Some(p) => Some(p.access_token.clone()),
            None => self.store.get(ACCESS_TOKEN_KEY).await?,
        };
        let refresh_token = match &pair {
            Some(p) => Some(p.refresh_token.clone()),
            None => self.store.get(REFRESH_TOKEN_KEY).await?,
        };
        let Some(token) = access_token
            .filter(|t| is_well_formed(t))
            .or(refresh_token.filter(|t| is_well_formed(t)))
        else {
            debug!("logout without stored credentials");
            return Ok(false);
        };

        if let Err(e) = self.api.revoke_token(&token).await {
            warn!(error = %e, "token revocation failed, clearing local credentials anyway");
        }

        // The store has no delete; an empty value with a zero TTL reads as absent.
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            self.store
                .put(key, "", Some(Duration::ZERO))
                .await
                .map_err(into_persistence)?;
        }
        info!("FIB API credentials revoked");
        Ok(true)
    }

    /// Exactly two writes: the access token with a TTL, the refresh token without.
    async fn persist(&self, pair: &TokenPair, now: DateTime<Utc>) -> Result<()> {
        let ttl = (pair.access_expires_at - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.store
            .put(ACCESS_TOKEN_KEY, &pair.access_token, Some(ttl))
            .await
            .map_err(into_persistence)?;
        self.store
            .put(REFRESH_TOKEN_KEY, &pair.refresh_token, None)
            .await
            .map_err(into_persistence)
    }
}

fn into_persistence(e: Error) -> Error {
    match e {
        Error::Persistence(_) => e,
        other => Error::Persistence(other.to_string()),
    }
}

fn validate_token_response(
    resp: TokenResponse,
    now: DateTime<Utc>,
    default_ttl: Duration,
) -> Result<TokenPair> {
    let access_token = resp
        .access_token
        .ok_or_else(|| Error::UpstreamAuth("token response has no access_token".to_string()))?;
    let refresh_token = resp
        .refresh_token
        .ok_or_else(|| Error::UpstreamAuth("token response has no refresh_token".to_string()))?;

    if !is_well_formed(&access_token) {
        return Err(Error::UpstreamAuth(format!(
            "access_token has unexpected length {}",
            access_token.chars().count()
        )));
    }
    if !is_well_formed(&refresh_token) {
        return Err(Error::UpstreamAuth(format!(
            "refresh_token has unexpected length {}",
            refresh_token.chars().count()
        )));
    }

    let declared = resp
        .expires_in
        .map(Duration::from_secs)
        .unwrap_or(default_ttl);
    if declared.is_zero() {
        return Err(Error::UpstreamAuth(
            "token response declares an already expired access token".to_string(),
        ));
    }
    // Short lifetimes keep half of what was declared instead of dropping to zero.
    let ttl = if declared > EARLY_EXPIRY * 2 {
        declared - EARLY_EXPIRY
    } else {
        declared / 2
    };
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|_| Error::UpstreamAuth("expires_in out of range".to_string()))?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        access_expires_at: now + ttl,
    })
}
