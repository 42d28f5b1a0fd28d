//! Field-by-field validation of FIB API JSON bodies into domain types.
//!
//! Bodies are first read into raw structs where every field is optional and a
//! field of the wrong type reads as absent. The first absent required field
//! becomes [`Error::UpstreamData`].

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Europe::Madrid;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;

use crate::{
    errors::Error,
    notice::{Attachment, Notice, UserInfo},
    Result,
};

#[derive(Deserialize)]
struct RawNotices {
    #[serde(default, deserialize_with = "lenient")]
    count: Option<Integer>,
    #[serde(default, deserialize_with = "lenient")]
    results: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct RawNotice {
    #[serde(default, deserialize_with = "lenient")]
    id: Option<Integer>,
    #[serde(default, deserialize_with = "lenient")]
    titol: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    codi_assig: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    text: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    data_insercio: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    data_modificacio: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    data_caducitat: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    adjunts: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct RawAttachment {
    #[serde(default, deserialize_with = "lenient")]
    nom: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    tipus_mime: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    data_modificacio: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    mida: Option<Integer>,
}

#[derive(Deserialize)]
struct RawUserInfo {
    #[serde(default, deserialize_with = "lenient")]
    username: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    nom: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    cognoms: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    email: Option<String>,
}

/// Integers sometimes arrive as floats or numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Integer {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Integer {
    fn value(&self) -> Option<i64> {
        match self {
            Integer::Int(i) => Some(*i),
            Integer::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Integer::Float(_) => None,
            Integer::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Any value that does not fit `T` (including `null`) reads as `None`.
fn lenient<'de, D, T>(d: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v = Value::deserialize(d)?;
    Ok(serde_json::from_value(v).ok())
}

fn raw<T: DeserializeOwned>(v: &Value, entity: &'static str) -> Result<T> {
    T::deserialize(v).map_err(|_| Error::UpstreamData {
        entity,
        field: "<object>",
    })
}

fn require<T>(v: Option<T>, entity: &'static str, field: &'static str) -> Result<T> {
    v.ok_or(Error::UpstreamData { entity, field })
}

fn integer(v: Option<Integer>, entity: &'static str, field: &'static str) -> Result<i64> {
    require(v.as_ref().and_then(Integer::value), entity, field)
}

fn timestamp(v: Option<String>, entity: &'static str, field: &'static str) -> Result<DateTime<Utc>> {
    require(v.as_deref().and_then(parse_timestamp), entity, field)
}

/// Parse a `/jo/avisos` body: `{count, results: [...]}`.
pub fn parse_notices(body: &Value, login_redirect_base: &str) -> Result<Vec<Notice>> {
    const E: &str = "Notices";
    let raw: RawNotices = raw(body, E)?;
    // `count` is not used, but its absence means this is not a notices payload.
    integer(raw.count, E, "count")?;
    require(raw.results, E, "results")?
        .iter()
        .map(|n| parse_notice(n, login_redirect_base))
        .collect()
}

pub fn parse_notice(v: &Value, login_redirect_base: &str) -> Result<Notice> {
    const E: &str = "Notice";
    let raw: RawNotice = raw(v, E)?;

    let notice = Notice {
        id: integer(raw.id, E, "id")?,
        title: require(raw.titol, E, "titol")?,
        subject_code: require(raw.codi_assig, E, "codi_assig")?,
        body_html: require(raw.text, E, "text")?,
        created_at: timestamp(raw.data_insercio, E, "data_insercio")?,
        modified_at: timestamp(raw.data_modificacio, E, "data_modificacio")?,
        expires_at: timestamp(raw.data_caducitat, E, "data_caducitat")?,
        attachments: Vec::new(),
    };
    let attachments = require(raw.adjunts, E, "adjunts")?
        .iter()
        .map(|a| parse_attachment(a, login_redirect_base))
        .collect::<Result<Vec<_>>>()?;

    Ok(Notice {
        attachments,
        ..notice
    })
}

pub fn parse_attachment(v: &Value, login_redirect_base: &str) -> Result<Attachment> {
    const E: &str = "Attachment";
    let raw: RawAttachment = raw(v, E)?;
    let name = require(raw.nom, E, "nom")?;
    let mime_type = require(raw.tipus_mime, E, "tipus_mime")?;
    let url = require(raw.url, E, "url")?;
    // Required by the schema even though we don't surface it.
    timestamp(raw.data_modificacio, E, "data_modificacio")?;
    let size = integer(raw.mida, E, "mida")?;

    Ok(Attachment::new(
        name,
        mime_type,
        size.max(0) as u64,
        url,
        login_redirect_base,
    ))
}

/// Parse a `/jo` body.
pub fn parse_user_info(v: &Value) -> Result<UserInfo> {
    const E: &str = "UserInfo";
    let raw: RawUserInfo = raw(v, E)?;
    Ok(UserInfo {
        username: raw.username,
        first_name: require(raw.nom, E, "nom")?,
        last_names: require(raw.cognoms, E, "cognoms")?,
        email: require(raw.email, E, "email")?,
    })
}

/// Parse an upstream timestamp.
///
/// The API sends naive `YYYY-MM-DDTHH:MM:SS` values in Europe/Madrid local time.
/// An ambiguous time (the autumn repeated hour) resolves to its earlier instant;
/// a time inside the spring gap is moved forward an hour. Offsets are honored when present.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())?;
    Madrid
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            Madrid
                .from_local_datetime(&(naive + chrono::Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const REDIRECT: &str = "https://api.fib.upc.edu/v2/accounts/login/?next=";

    fn notice_json() -> Value {
        json!({
            "id": 123522,
            "titol": "Inicio del curso",
            "codi_assig": "PROP",
            "text": "<p>Bienvenidos a PROP.</p>",
            "data_insercio": "2022-02-12T00:00:00",
            "data_modificacio": "2022-02-12T11:29:37",
            "data_caducitat": "2022-07-20T00:00:00",
            "adjunts": [{
                "tipus_mime": "application/pdf",
                "nom": "Normativa-2q2122.pdf",
                "url": "https://api.fib.upc.edu/v2/jo/avisos/adjunt/96612",
                "data_modificacio": "2022-02-12T04:24:35",
                "mida": 121304
            }]
        })
    }

    #[test]
    fn parses_a_complete_notices_payload() {
        let body = json!({"count": 1, "results": [notice_json()]});
        let notices = parse_notices(&body, REDIRECT).unwrap();
        assert_eq!(notices.len(), 1);

        let n = &notices[0];
        assert_eq!(n.id, 123522);
        assert_eq!(n.subject_code, "PROP");
        assert_eq!(
            n.published_at(),
            Utc.with_ymd_and_hms(2022, 2, 12, 10, 29, 37).unwrap()
        );
        assert_eq!(n.attachments[0].size_bytes, 121_304);
        assert!(n.attachments[0].redirect_url.starts_with(REDIRECT));
    }

    #[test]
    fn missing_notice_field_is_named() {
        let mut n = notice_json();
        n.as_object_mut().unwrap().remove("codi_assig");
        let err = parse_notice(&n, REDIRECT).unwrap_err();
        assert!(matches!(
            err,
            Error::UpstreamData {
                entity: "Notice",
                field: "codi_assig"
            }
        ));
    }

    #[test]
    fn missing_attachment_field_is_named() {
        let mut n = notice_json();
        n["adjunts"][0].as_object_mut().unwrap().remove("mida");
        let err = parse_notice(&n, REDIRECT).unwrap_err();
        assert!(matches!(
            err,
            Error::UpstreamData {
                entity: "Attachment",
                field: "mida"
            }
        ));
    }

    #[test]
    fn notices_payload_requires_count_and_results() {
        let err = parse_notices(&json!({"results": []}), REDIRECT).unwrap_err();
        assert!(matches!(err, Error::UpstreamData { field: "count", .. }));
        let err = parse_notices(&json!({"count": 0}), REDIRECT).unwrap_err();
        assert!(matches!(err, Error::UpstreamData { field: "results", .. }));
    }

    #[test]
    fn bad_timestamp_is_a_data_error() {
        let mut n = notice_json();
        n["data_caducitat"] = json!("tomorrow");
        let err = parse_notice(&n, REDIRECT).unwrap_err();
        assert!(matches!(
            err,
            Error::UpstreamData {
                field: "data_caducitat",
                ..
            }
        ));
    }

    #[test]
    fn user_info_requires_email_but_not_username() {
        let info = parse_user_info(&json!({"nom": "Ada", "cognoms": "Lovelace", "email": "a@x"}))
            .unwrap();
        assert_eq!(info.first_name, "Ada");
        assert_eq!(info.username, None);

        let err = parse_user_info(&json!({"nom": "Ada", "cognoms": "Lovelace"})).unwrap_err();
        assert!(matches!(err, Error::UpstreamData { field: "email", .. }));
    }

    #[test]
    fn timestamps_accept_naive_and_rfc3339() {
        let a = parse_timestamp("2022-09-12T09:11:16").unwrap();
        let b = parse_timestamp("2022-09-12T09:11:16+02:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Utc.with_ymd_and_hms(2022, 9, 12, 7, 11, 16).unwrap());
        assert!(parse_timestamp("12/09/2022").is_none());
    }

    #[test]
    fn naive_timestamps_are_madrid_local_time() {
        // CET in winter.
        assert_eq!(
            parse_timestamp("2022-02-12T11:29:37"),
            Some(Utc.with_ymd_and_hms(2022, 2, 12, 10, 29, 37).unwrap())
        );
        // 02:30 happens twice on 2022-10-30; the first one is CEST.
        assert_eq!(
            parse_timestamp("2022-10-30T02:30:00"),
            Some(Utc.with_ymd_and_hms(2022, 10, 30, 0, 30, 0).unwrap())
        );
        // Before and after the repeated hour stay ordered.
        let before = parse_timestamp("2022-10-30T01:59:00").unwrap();
        let after = parse_timestamp("2022-10-30T03:01:00").unwrap();
        assert_eq!(after - before, chrono::Duration::minutes(122));
        // 02:30 does not exist on 2022-03-27.
        assert_eq!(
            parse_timestamp("2022-03-27T02:30:00"),
            Some(Utc.with_ymd_and_hms(2022, 3, 27, 1, 30, 0).unwrap())
        );
    }

    #[test]
    fn ill_typed_field_is_named_like_a_missing_one() {
        let mut n = notice_json();
        n["titol"] = json!(42);
        let err = parse_notice(&n, REDIRECT).unwrap_err();
        assert!(matches!(
            err,
            Error::UpstreamData {
                entity: "Notice",
                field: "titol"
            }
        ));

        n["titol"] = json!("ok");
        n["id"] = json!("123522");
        assert_eq!(parse_notice(&n, REDIRECT).unwrap().id, 123522);

        let err = parse_notices(&json!([1, 2]), REDIRECT).unwrap_err();
        assert!(matches!(
            err,
            Error::UpstreamData {
                entity: "Notices",
                field: "<object>"
            }
        ));
    }
}
