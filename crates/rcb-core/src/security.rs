use sha2::{Digest, Sha256};

use crate::{domain::UserId, errors::Error, tokens::TOKEN_LEN, Result};

// ============== Authorization ==============

/// Only the configured owner may talk to the bot.
pub fn is_authorized(user_id: Option<UserId>, owner: i64) -> bool {
    user_id.is_some_and(|u| u.0 == owner)
}

// ============== OAuth ==============

/// OAuth `state` for a Telegram user: hex SHA-256 of the decimal user id.
pub fn oauth_state(user_id: UserId) -> String {
    use std::fmt::Write;

    let mut h = Sha256::new();
    h.update(user_id.0.to_string().as_bytes());
    let digest = h.finalize();

    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Compare without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `GET {base}/o/authorize/` link the user opens to grant read access.
pub fn authorization_url(
    base_url: &str,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
) -> Result<String> {
    let mut url = url::Url::parse(&format!("{}/o/authorize/", base_url.trim_end_matches('/')))
        .map_err(|e| Error::Config(format!("invalid FIB API base URL: {e}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", "read")
        .append_pair("state", state);
    Ok(url.into())
}

/// Extract the authorization code from what the user pasted after logging in.
///
/// Accepts either the bare code or the full redirect URL. A URL must carry the
/// expected `state`.
pub fn authorization_code(input: &str, expected_state: &str) -> Result<String> {
    let input = input.trim();

    let code = match url::Url::parse(input) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            let param = |name: &str| {
                url.query_pairs()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.into_owned())
            };
            if let Some(err) = param("error") {
                return Err(Error::UpstreamAuth(format!("authorization denied: {err}")));
            }
            let state = param("state").unwrap_or_default();
            if !constant_time_eq(state.as_bytes(), expected_state.as_bytes()) {
                return Err(Error::UpstreamAuth("OAuth state mismatch".to_string()));
            }
            param("code")
                .ok_or_else(|| Error::UpstreamAuth("redirect URL has no code".to_string()))?
        }
        _ => input.to_string(),
    };

    if code.chars().count() != TOKEN_LEN {
        return Err(Error::UpstreamAuth(format!(
            "authorization code must be {TOKEN_LEN} characters"
        )));
    }
    Ok(code)
}
