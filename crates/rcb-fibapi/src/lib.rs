//! FIB API adapter (`api.fib.upc.edu/v2`) over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use rcb_core::{
    config::Config,
    errors::Error,
    fibapi::{FibApi, TokenGrant, TokenResponse},
    Result,
};

#[derive(Clone, Debug)]
pub struct FibApiClient {
    base_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: reqwest::Client,
}

impl FibApiClient {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        user_agent: &str,
        accept_language: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_str(accept_language)
                .map_err(|e| Error::Config(format!("invalid FIBAPI_ACCEPT_LANGUAGE: {e}")))?,
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            http,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            cfg.fibapi_base_url.clone(),
            cfg.fibapi_client_id.clone(),
            cfg.fibapi_client_secret.clone(),
            cfg.fibapi_redirect_uri.clone(),
            &cfg.fibapi_user_agent,
            &cfg.fibapi_accept_language,
            cfg.http_timeout,
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn token_form(&self, grant: &TokenGrant) -> Vec<(&'static str, String)> {
        let mut form = vec![("grant_type", grant.grant_type().to_string())];
        match grant {
            TokenGrant::AuthorizationCode { code } => {
                form.push(("code", code.clone()));
                form.push(("redirect_uri", self.redirect_uri.clone()));
            }
            TokenGrant::RefreshToken { refresh_token } => {
                form.push(("refresh_token", refresh_token.clone()));
            }
        }
        form.push(("client_id", self.client_id.clone()));
        form.push(("client_secret", self.client_secret.clone()));
        form
    }

    fn revoke_form(&self, token: &str) -> [(&'static str, String); 2] {
        [
            ("client_id", self.client_id.clone()),
            ("token", token.to_string()),
        ]
    }

    async fn get_json(&self, path: &str, bearer: &str) -> Result<Value> {
        let url = self.endpoint(path);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("GET {path}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(data_endpoint_error(path, status, &body));
        }

        resp.json()
            .await
            .map_err(|e| Error::Upstream(format!("GET {path}: invalid JSON: {e}")))
    }
}

#[async_trait]
impl FibApi for FibApiClient {
    async fn exchange_token(&self, grant: TokenGrant) -> Result<TokenResponse> {
        debug!(grant_type = grant.grant_type(), "exchanging token");
        let resp = self
            .http
            .post(self.endpoint("o/token"))
            .form(&self.token_form(&grant))
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("token request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Upstream(format!("token response unreadable: {e}")))?;

        if let Some(err) = token_error(status, &body) {
            return Err(err);
        }
        serde_json::from_str(&body)
            .map_err(|e| Error::UpstreamAuth(format!("malformed token response: {e}")))
    }

    async fn revoke_token(&self, token: &str) -> Result<()> {
        debug!("revoking token");
        let resp = self
            .http
            .post(self.endpoint("o/revoke_token/"))
            .bearer_auth(token)
            .form(&self.revoke_form(token))
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("revoke request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(revoke_error(status, &body))
    }

    async fn user_info(&self, bearer: &str) -> Result<Value> {
        self.get_json("jo.json", bearer).await
    }

    async fn notices(&self, bearer: &str) -> Result<Value> {
        self.get_json("jo/avisos.json", bearer).await
    }
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Classify a token endpoint reply. `None` means the body should hold a token pair.
fn token_error(status: StatusCode, body: &str) -> Option<Error> {
    if let Ok(err) = serde_json::from_str::<OAuthErrorBody>(body) {
        if err.error == "invalid_grant" {
            return Some(Error::UpstreamAuth(
                "invalid authorization code or refresh token".to_string(),
            ));
        }
        let detail = err
            .error_description
            .map(|d| format!("{}: {d}", err.error))
            .unwrap_or(err.error);
        return Some(Error::UpstreamAuth(detail));
    }
    if status.is_server_error() {
        return Some(Error::Upstream(format!("token endpoint returned {status}")));
    }
    if !status.is_success() {
        return Some(Error::UpstreamAuth(format!("token endpoint returned {status}")));
    }
    None
}

fn revoke_error(status: StatusCode, body: &str) -> Error {
    if let Ok(err) = serde_json::from_str::<OAuthErrorBody>(body) {
        return Error::Upstream(format!("token revocation rejected: {}", err.error));
    }
    Error::Upstream(format!("token revocation returned {status}"))
}

fn data_endpoint_error(path: &str, status: StatusCode, body: &str) -> Error {
    let snippet: String = body.chars().take(200).collect();
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
            Error::UpstreamAuth(format!("GET {path} rejected the access token ({status})"))
        }
        _ => Error::Upstream(format!("GET {path} failed: {status} {snippet}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> FibApiClient {
        FibApiClient::new(
            "https://api.fib.upc.edu/v2/",
            "cid",
            "secret",
            "https://bot.example/cb",
            "RacoBot/1.0",
            "es-ES",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn endpoints_join_without_double_slashes() {
        let c = client();
        assert_eq!(c.endpoint("o/token"), "https://api.fib.upc.edu/v2/o/token");
        assert_eq!(
            c.endpoint("/jo/avisos.json"),
            "https://api.fib.upc.edu/v2/jo/avisos.json"
        );
    }

    #[test]
    fn code_grant_form_includes_redirect_uri_and_credentials() {
        let form = client().token_form(&TokenGrant::AuthorizationCode {
            code: "c0de".to_string(),
        });
        let keys: Vec<&str> = form.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec!["grant_type", "code", "redirect_uri", "client_id", "client_secret"]
        );
        assert_eq!(form[0].1, "authorization_code");
    }

    #[test]
    fn refresh_grant_form_omits_redirect_uri() {
        let form = client().token_form(&TokenGrant::RefreshToken {
            refresh_token: "r".to_string(),
        });
        assert_eq!(form[0].1, "refresh_token");
        assert!(form.iter().all(|(k, _)| *k != "redirect_uri"));
        assert!(form.contains(&("refresh_token", "r".to_string())));
    }

    #[test]
    fn revoke_form_sends_client_id_and_token_only() {
        let form = client().revoke_form("tok");
        assert_eq!(
            form,
            [("client_id", "cid".to_string()), ("token", "tok".to_string())]
        );
        assert_eq!(
            client().endpoint("o/revoke_token/"),
            "https://api.fib.upc.edu/v2/o/revoke_token/"
        );
    }

    #[test]
    fn revoke_failures_are_upstream_errors() {
        let err = revoke_error(StatusCode::BAD_REQUEST, r#"{"error": "unsupported_token_type"}"#);
        assert!(matches!(err, Error::Upstream(m) if m.contains("unsupported_token_type")));
        assert!(!revoke_error(StatusCode::BAD_GATEWAY, "").requires_reauthorization());
    }

    #[test]
    fn invalid_grant_is_an_auth_error() {
        let err = token_error(StatusCode::BAD_REQUEST, r#"{"error": "invalid_grant"}"#);
        assert!(matches!(err, Some(Error::UpstreamAuth(m)) if m.contains("invalid authorization code")));

        let err = token_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error": "invalid_client", "error_description": "bad secret"}"#,
        );
        assert!(matches!(err, Some(Error::UpstreamAuth(m)) if m == "invalid_client: bad secret"));
    }

    #[test]
    fn token_status_without_error_body() {
        assert!(token_error(StatusCode::OK, r#"{"access_token": "x"}"#).is_none());
        assert!(matches!(
            token_error(StatusCode::BAD_GATEWAY, "<html>"),
            Some(Error::Upstream(_))
        ));
        assert!(matches!(
            token_error(StatusCode::FORBIDDEN, ""),
            Some(Error::UpstreamAuth(_))
        ));
    }

    #[test]
    fn data_endpoint_auth_failures_require_reauthorization() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::UNAUTHORIZED] {
            assert!(data_endpoint_error("jo.json", status, "").requires_reauthorization());
        }
        assert!(matches!(
            data_endpoint_error("jo.json", StatusCode::SERVICE_UNAVAILABLE, "down"),
            Error::Upstream(_)
        ));
    }

    #[test]
    fn bad_accept_language_is_a_config_error() {
        let err = FibApiClient::new("b", "c", "s", "r", "ua", "bad\nvalue", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
