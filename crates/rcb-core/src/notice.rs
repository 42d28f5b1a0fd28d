//! Notices as delivered by the FIB API, after validation.

use chrono::{DateTime, Utc};

/// A single notice ("avís"). Immutable once built from an API response.
#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    pub id: i64,
    pub title: String,
    pub subject_code: String,
    pub body_html: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
}

impl Notice {
    /// When the notice last became visible: the later of creation and modification.
    ///
    /// Upstream occasionally reports a modification time earlier than the
    /// insertion time, so neither one alone is reliable.
    pub fn published_at(&self) -> DateTime<Utc> {
        self.created_at.max(self.modified_at)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub source_url: String,
    /// Login-redirect link to `source_url`; direct links need a browser session cookie.
    pub redirect_url: String,
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: u64,
        source_url: impl Into<String>,
        login_redirect_base: &str,
    ) -> Self {
        let source_url = source_url.into();
        let redirect_url = format!(
            "{login_redirect_base}{}",
            url::form_urlencoded::byte_serialize(source_url.as_bytes()).collect::<String>()
        );
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size_bytes,
            source_url,
            redirect_url,
        }
    }
}

/// The authorized user's profile (`/jo`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserInfo {
    pub username: Option<String>,
    pub first_name: String,
    pub last_names: String,
    pub email: String,
}
