//! In-crate fakes for the ports.

use std::{
    collections::VecDeque,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    fibapi::{FibApi, TokenGrant, TokenResponse},
    messaging::port::MessagingPort,
    store::{CredentialStore, MemoryStore},
    Result,
};

/// A well-formed 30-character token made of `c`.
pub fn token(c: char) -> String {
    std::iter::repeat(c).take(crate::tokens::TOKEN_LEN).collect()
}

/// A valid `/jo/avisos` result titled `Notice {id}`.
pub fn notice_json(id: i64, created: &str, modified: &str) -> Value {
    json!({
        "id": id,
        "titol": format!("Notice {id}"),
        "codi_assig": "PROP",
        "text": format!("<p>Body of {id}</p>"),
        "data_insercio": created,
        "data_modificacio": modified,
        "data_caducitat": "2030-01-01T00:00:00",
        "adjunts": []
    })
}

#[derive(Default)]
struct ApiState {
    token_responses: VecDeque<TokenResponse>,
    grants: Vec<TokenGrant>,
    bearers: Vec<String>,
    user_info: Option<Value>,
    notices: Option<Value>,
    fail_notices: bool,
    revoked: Vec<String>,
    fail_revocation: bool,
}

/// Scripted FIB API. Token exchanges pop queued responses; an empty queue is `invalid_grant`.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<ApiState>,
}

impl FakeApi {
    fn state(&self) -> std::sync::MutexGuard<'_, ApiState> {
        self.state.lock().unwrap()
    }

    pub fn push_tokens(&self, access: &str, refresh: &str, expires_in: Option<u64>) {
        self.push_response(TokenResponse {
            access_token: Some(access.to_string()),
            refresh_token: Some(refresh.to_string()),
            expires_in,
        });
    }

    pub fn push_response(&self, resp: TokenResponse) {
        self.state().token_responses.push_back(resp);
    }

    pub fn set_user_info(&self, v: Value) {
        self.state().user_info = Some(v);
    }

    pub fn set_notices(&self, v: Value) {
        self.state().notices = Some(v);
    }

    pub fn fail_notices(&self) {
        self.state().fail_notices = true;
    }

    pub fn fail_revocation(&self) {
        self.state().fail_revocation = true;
    }

    /// Every token passed to `revoke_token`, including failed attempts.
    pub fn revoked(&self) -> Vec<String> {
        self.state().revoked.clone()
    }

    pub fn grants(&self) -> Vec<TokenGrant> {
        self.state().grants.clone()
    }

    pub fn exchange_calls(&self) -> usize {
        self.state().grants.len()
    }

    pub fn bearers(&self) -> Vec<String> {
        self.state().bearers.clone()
    }
}

#[async_trait]
impl FibApi for FakeApi {
    async fn exchange_token(&self, grant: TokenGrant) -> Result<TokenResponse> {
        let mut st = self.state();
        st.grants.push(grant);
        st.token_responses
            .pop_front()
            .ok_or_else(|| Error::UpstreamAuth("invalid_grant".to_string()))
    }

    async fn revoke_token(&self, token: &str) -> Result<()> {
        let mut st = self.state();
        st.revoked.push(token.to_string());
        if st.fail_revocation {
            return Err(Error::Upstream("HTTP 503".to_string()));
        }
        Ok(())
    }

    async fn user_info(&self, bearer: &str) -> Result<Value> {
        let mut st = self.state();
        st.bearers.push(bearer.to_string());
        st.user_info
            .clone()
            .ok_or_else(|| Error::Upstream("no profile scripted".to_string()))
    }

    async fn notices(&self, bearer: &str) -> Result<Value> {
        let mut st = self.state();
        st.bearers.push(bearer.to_string());
        if st.fail_notices {
            return Err(Error::Upstream("HTTP 503".to_string()));
        }
        Ok(st
            .notices
            .clone()
            .unwrap_or_else(|| json!({"count": 0, "results": []})))
    }
}

pub type RecordedPut = (String, String, Option<Duration>);

/// [`MemoryStore`] that records every write and can be told to fail writes for one key.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    puts: Mutex<Vec<RecordedPut>>,
    fail_key: Mutex<Option<String>>,
}

impl RecordingStore {
    /// Write directly, without recording.
    pub fn seed(&self, key: &str, value: &str) {
        self.inner.insert(key, value, None).unwrap();
    }

    pub fn fail_puts_for(&self, key: &str) {
        *self.fail_key.lock().unwrap() = Some(key.to_string());
    }

    pub fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().unwrap().clone()
    }

    pub fn puts_for(&self, key: &str) -> Vec<RecordedPut> {
        self.puts().into_iter().filter(|p| p.0 == key).collect()
    }
}

#[async_trait]
impl CredentialStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        if self.fail_key.lock().unwrap().as_deref() == Some(key) {
            return Err(Error::Persistence(format!("write to {key} refused")));
        }
        self.puts
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_string(), ttl));
        self.inner.put(key, value, ttl).await
    }
}

/// Messenger that records `(chat, body, is_html)` for every successful send.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(ChatId, String, bool)>>,
    fail_when_contains: Mutex<Option<String>>,
}

impl RecordingMessenger {
    pub fn sent(&self) -> Vec<(ChatId, String, bool)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_when_contains(&self, needle: &str) {
        *self.fail_when_contains.lock().unwrap() = Some(needle.to_string());
    }

    fn record(&self, chat_id: ChatId, body: &str, html: bool) -> Result<MessageRef> {
        if let Some(needle) = self.fail_when_contains.lock().unwrap().as_deref() {
            if body.contains(needle) {
                return Err(Error::Delivery("Bad Request: can't parse entities".to_string()));
            }
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((chat_id, body.to_string(), html));
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(sent.len() as i32),
        })
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.record(chat_id, html, true)
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.record(chat_id, text, false)
    }
}
