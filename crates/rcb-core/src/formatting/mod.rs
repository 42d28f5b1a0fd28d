//! Telegram message rendering for notices.

pub mod html;

use crate::{config::Config, notice::Notice};

/// Telegram's hard limit for a single text message.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

// Subject codes are short upstream; this bounds the fallback header regardless.
const MAX_FALLBACK_CODE_CHARS: usize = 64;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Human-readable size in binary units, e.g. `1.0 KiB`, `118.5 KiB`, `512 B`.
pub fn byte_count_iec(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!(
        "{:.1} {}iB",
        bytes as f64 / div as f64,
        ['K', 'M', 'G', 'T', 'P', 'E'][exp]
    )
}

/// Clean a notice body: rewrite to the supported subset, then trim surrounding line breaks.
pub fn render_body(body_html: &str, link_base: &str) -> String {
    html::rewrite(body_html, link_base)
        .trim_matches(|c| c == '\n' || c == '\r')
        .to_string()
}

/// Builds the Telegram message for a notice.
#[derive(Clone, Debug)]
pub struct NoticeFormatter {
    max_len: usize,
    raco_base_url: String,
    raco_notice_url: String,
}

impl NoticeFormatter {
    pub fn new(
        max_len: usize,
        raco_base_url: impl Into<String>,
        raco_notice_url: impl Into<String>,
    ) -> Self {
        Self {
            max_len,
            raco_base_url: raco_base_url.into(),
            raco_notice_url: raco_notice_url.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.telegram_message_limit,
            cfg.raco_base_url.clone(),
            cfg.raco_notice_url.clone(),
        )
    }

    /// Full message, or the short deep-link fallback when it would not fit.
    pub fn format(&self, notice: &Notice) -> String {
        let mut msg = header(&notice.subject_code, &notice.title);

        let body = render_body(&notice.body_html, &self.raco_base_url);
        if !body.is_empty() {
            msg.push_str("\n\n");
            msg.push_str(&body);
        }

        if !notice.attachments.is_empty() {
            let n = notice.attachments.len();
            msg.push_str(&format!(
                "\n\n<i>- With {n} {}:</i>",
                if n == 1 { "attachment" } else { "attachments" }
            ));
            for a in &notice.attachments {
                msg.push_str(&format!(
                    "\n<a href=\"{}\">{}</a>  ({})",
                    a.redirect_url.replace('"', "%22"),
                    escape_html(&a.name),
                    byte_count_iec(a.size_bytes)
                ));
            }
        }

        if msg.chars().count() > self.max_len {
            return self.fallback(notice);
        }
        msg
    }

    /// Link to the notice on the Racó web UI.
    pub fn deep_link(&self, notice: &Notice) -> String {
        deep_link(
            &self.raco_notice_url,
            &clip(&notice.subject_code, MAX_FALLBACK_CODE_CHARS),
            notice.id,
        )
    }

    fn fallback(&self, notice: &Notice) -> String {
        let code = escape_html(&clip(&notice.subject_code, MAX_FALLBACK_CODE_CHARS));
        let tail = format!(
            "\n\nSorry, but this message is too long to be sent through Telegram, please view it through <a href=\"{}\">this link</a>.",
            self.deep_link(notice)
        );
        let fixed = format!("[{code}] <b></b>").chars().count() + tail.chars().count();
        let title = fit_escaped(&notice.title, self.max_len.saturating_sub(fixed));
        format!("[{code}] <b>{title}</b>{tail}")
    }
}

fn header(code: &str, title: &str) -> String {
    format!("[{}] <b>{}</b>", escape_html(code), escape_html(title))
}

fn deep_link(base: &str, code: &str, id: i64) -> String {
    let code: String = url::form_urlencoded::byte_serialize(code.as_bytes()).collect();
    format!("{base}?assig=GRAU-{code}&id={id}")
}

fn clip(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Escape `s`, cutting it with an ellipsis so the escaped form fits in `budget` chars.
fn fit_escaped(s: &str, budget: usize) -> String {
    let escaped = escape_html(s);
    if escaped.chars().count() <= budget {
        return escaped;
    }
    let mut out = String::new();
    let mut used = 1; // the ellipsis
    for c in s.chars() {
        let piece = escape_html(c.encode_utf8(&mut [0; 4]));
        let len = piece.chars().count();
        if used + len > budget {
            break;
        }
        used += len;
        out.push_str(&piece);
    }
    if budget > 0 {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notice::Attachment;
    use chrono::{TimeZone, Utc};

    const REDIRECT: &str = "https://api.fib.upc.edu/v2/accounts/login/?next=";

    fn formatter() -> NoticeFormatter {
        NoticeFormatter::new(
            TELEGRAM_MESSAGE_LIMIT,
            "https://raco.fib.upc.edu",
            "https://raco.fib.upc.edu/avisos/veure.jsp",
        )
    }

    fn notice(title: &str, body: &str, attachments: Vec<Attachment>) -> Notice {
        let t = Utc.with_ymd_and_hms(2022, 2, 12, 11, 29, 37).unwrap();
        Notice {
            id: 123522,
            title: title.to_string(),
            subject_code: "PROP".to_string(),
            body_html: body.to_string(),
            created_at: t,
            modified_at: t,
            expires_at: t,
            attachments,
        }
    }

    fn attachment(name: &str, size: u64) -> Attachment {
        Attachment::new(
            name,
            "application/pdf",
            size,
            "https://api.fib.upc.edu/v2/jo/avisos/adjunt/1",
            REDIRECT,
        )
    }

    #[test]
    fn escapes_html() {
        let s = r#"<a href="x&y">"#;
        assert_eq!(escape_html(s), "&lt;a href=&quot;x&amp;y&quot;&gt;");
    }

    #[test]
    fn byte_counts_use_binary_units() {
        assert_eq!(byte_count_iec(0), "0 B");
        assert_eq!(byte_count_iec(1023), "1023 B");
        assert_eq!(byte_count_iec(1024), "1.0 KiB");
        assert_eq!(byte_count_iec(121_304), "118.5 KiB");
        assert_eq!(byte_count_iec(1_048_576), "1.0 MiB");
        assert_eq!(byte_count_iec(5 * 1024 * 1024 * 1024), "5.0 GiB");
        assert_eq!(byte_count_iec(u64::MAX), "16.0 EiB");
    }

    #[test]
    fn body_is_trimmed_of_line_breaks() {
        assert_eq!(render_body("<br>\r\nHola<br><br>", ""), "Hola");
    }

    #[test]
    fn message_has_header_body_and_attachments() {
        let n = notice(
            "Inicio & fin",
            "<p>Bienvenidos<br>a PROP</p>",
            vec![attachment("Normativa.pdf", 121_304)],
        );
        let msg = formatter().format(&n);
        assert_eq!(
            msg,
            format!(
                "[PROP] <b>Inicio &amp; fin</b>\n\nBienvenidos\na PROP\n\n<i>- With 1 attachment:</i>\n<a href=\"{}\">Normativa.pdf</a>  (118.5 KiB)",
                n.attachments[0].redirect_url
            )
        );
    }

    #[test]
    fn attachment_count_is_pluralized() {
        let n = notice(
            "t",
            "b",
            vec![attachment("a.pdf", 10), attachment("b.pdf", 2048)],
        );
        let msg = formatter().format(&n);
        assert!(msg.contains("<i>- With 2 attachments:</i>"));
        assert!(msg.contains(">a.pdf</a>  (10 B)"));
        assert!(msg.contains(">b.pdf</a>  (2.0 KiB)"));
    }

    #[test]
    fn empty_body_and_no_attachments_is_just_the_header() {
        let msg = formatter().format(&notice("Solo título", "<p>\n</p>", vec![]));
        assert_eq!(msg, "[PROP] <b>Solo título</b>");
    }

    #[test]
    fn oversized_message_falls_back_to_deep_link() {
        let n = notice("Larg", &"x".repeat(5000), vec![]);
        let msg = formatter().format(&n);
        assert_eq!(
            msg,
            "[PROP] <b>Larg</b>\n\nSorry, but this message is too long to be sent through Telegram, please view it through <a href=\"https://raco.fib.upc.edu/avisos/veure.jsp?assig=GRAU-PROP&id=123522\">this link</a>."
        );
    }

    #[test]
    fn message_at_the_limit_is_sent_whole() {
        let header_len = "[PROP] <b>t</b>\n\n".chars().count();
        let n = notice("t", &"é".repeat(TELEGRAM_MESSAGE_LIMIT - header_len), vec![]);
        let msg = formatter().format(&n);
        assert_eq!(msg.chars().count(), TELEGRAM_MESSAGE_LIMIT);
        assert!(!msg.contains("Sorry"));
    }

    #[test]
    fn fallback_fits_even_with_huge_title() {
        let mut n = notice(&"<&>".repeat(3000), &"x".repeat(5000), vec![]);
        n.subject_code = "C".repeat(500);
        let msg = formatter().format(&n);
        assert!(msg.chars().count() <= TELEGRAM_MESSAGE_LIMIT);
        assert!(msg.contains("this link</a>."));
        assert!(msg.contains("…</b>"));
        // No entity is cut in half.
        assert!(msg.contains("&lt;&amp;&gt;"));
        assert!(!msg.contains("&l…"));
    }

    #[test]
    fn deep_link_encodes_subject_code() {
        let mut n = notice("t", "", vec![]);
        n.subject_code = "#PREMAT GEI".to_string();
        assert_eq!(
            formatter().deep_link(&n),
            "https://raco.fib.upc.edu/avisos/veure.jsp?assig=GRAU-%23PREMAT+GEI&id=123522"
        );
    }
}
