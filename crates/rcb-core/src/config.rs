use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, feed::FeedOptions, Result};

pub const DEFAULT_FIBAPI_BASE_URL: &str = "https://api.fib.upc.edu/v2";
pub const DEFAULT_LOGIN_REDIRECT_URL: &str = "https://api.fib.upc.edu/v2/accounts/login/?next=";
pub const DEFAULT_RACO_BASE_URL: &str = "https://raco.fib.upc.edu";
pub const DEFAULT_RACO_NOTICE_URL: &str = "https://raco.fib.upc.edu/avisos/veure.jsp";

/// Typed configuration, loaded from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    /// The single user the bot serves and pushes notices to.
    pub telegram_user_id: i64,
    pub telegram_message_limit: usize,

    // FIB API OAuth application
    pub fibapi_client_id: String,
    pub fibapi_client_secret: String,
    pub fibapi_redirect_uri: String,
    pub fibapi_base_url: String,
    pub fibapi_user_agent: String,
    pub fibapi_accept_language: String,
    pub http_timeout: Duration,
    /// Used when the token response does not declare `expires_in`.
    pub access_token_ttl: Duration,

    // Links
    pub login_redirect_url: String,
    pub raco_base_url: String,
    pub raco_notice_url: String,

    // Storage
    pub store_path: PathBuf,

    // Push behavior
    pub push_interval: Option<Duration>,
    pub notify_when_empty: bool,
    pub hold_cursor_on_failure: bool,
    pub deliver_backlog_on_first_run: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;
        let telegram_user_id = required("TELEGRAM_USER_ID")?
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::Config("TELEGRAM_USER_ID must be a numeric id".to_string()))?;
        let telegram_message_limit = env_usize("TELEGRAM_MESSAGE_LIMIT").unwrap_or(4096);

        let fibapi_client_id = required("FIBAPI_OAUTH_CLIENT_ID")?;
        let fibapi_client_secret = required("FIBAPI_OAUTH_CLIENT_SECRET")?;
        let fibapi_redirect_uri = required("FIBAPI_REDIRECT_URI")?;
        url::Url::parse(&fibapi_redirect_uri)
            .map_err(|e| Error::Config(format!("invalid FIBAPI_REDIRECT_URI: {e}")))?;

        let fibapi_base_url = env_str("FIBAPI_BASE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_FIBAPI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let fibapi_user_agent = env_str("FIBAPI_USER_AGENT")
            .and_then(non_empty)
            .unwrap_or_else(|| "RacoBot/1.0".to_string());
        let fibapi_accept_language = env_str("FIBAPI_ACCEPT_LANGUAGE")
            .and_then(non_empty)
            .unwrap_or_else(|| "es-ES".to_string());
        let http_timeout = Duration::from_secs(env_u64("HTTP_TIMEOUT_SECS").unwrap_or(20));
        let access_token_ttl =
            Duration::from_secs(env_u64("ACCESS_TOKEN_TTL_SECS").unwrap_or(36_000));

        let login_redirect_url = env_str("FIBAPI_LOGIN_REDIRECT_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_LOGIN_REDIRECT_URL.to_string());
        let raco_base_url = env_str("RACO_BASE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_RACO_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let raco_notice_url = env_str("RACO_NOTICE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_RACO_NOTICE_URL.to_string());

        let store_path = PathBuf::from(
            env_str("STORE_PATH")
                .and_then(non_empty)
                .unwrap_or_else(|| "/tmp/racobot-store.json".to_string()),
        );
        if let Some(parent) = store_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // 0 disables the scheduled push (manual /push still works).
        let push_interval = match env_u64("PUSH_INTERVAL_SECS").unwrap_or(60) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let notify_when_empty = env_bool("NOTIFY_WHEN_EMPTY").unwrap_or(false);
        let hold_cursor_on_failure = env_bool("HOLD_CURSOR_ON_FAILURE").unwrap_or(false);
        let deliver_backlog_on_first_run =
            env_bool("DELIVER_BACKLOG_ON_FIRST_RUN").unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            telegram_user_id,
            telegram_message_limit,
            fibapi_client_id,
            fibapi_client_secret,
            fibapi_redirect_uri,
            fibapi_base_url,
            fibapi_user_agent,
            fibapi_accept_language,
            http_timeout,
            access_token_ttl,
            login_redirect_url,
            raco_base_url,
            raco_notice_url,
            store_path,
            push_interval,
            notify_when_empty,
            hold_cursor_on_failure,
            deliver_backlog_on_first_run,
        })
    }

    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            notify_when_empty: self.notify_when_empty,
            hold_cursor_on_failure: self.hold_cursor_on_failure,
            deliver_backlog_on_first_run: self.deliver_backlog_on_first_run,
        }
    }
}

fn required(key: &str) -> Result<String> {
    env_str(key)
        .and_then(non_empty)
        .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_parsing_strips_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# comment\nTELEGRAM_USER_ID=42\n\nFIBAPI_REDIRECT_URI=\"https://x.test/cb\"\nBROKEN\n =nokey\nA='b c'\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("TELEGRAM_USER_ID".to_string(), "42".to_string()),
                (
                    "FIBAPI_REDIRECT_URI".to_string(),
                    "https://x.test/cb".to_string()
                ),
                ("A".to_string(), "b c".to_string()),
            ]
        );
    }

    #[test]
    fn bool_parsing_accepts_common_truthy_values() {
        for v in ["1", "true", "YES", " on "] {
            assert!(parse_bool(v), "{v}");
        }
        for v in ["0", "false", "no", ""] {
            assert!(!parse_bool(v), "{v}");
        }
    }
}
