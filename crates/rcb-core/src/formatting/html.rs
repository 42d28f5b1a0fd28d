//! Streaming rewrite of notice bodies into the HTML subset Telegram accepts.
//!
//! The input is tokenized once and every element is handled as it is
//! encountered: its start tag, its content, and its end tag each produce
//! output immediately. Unsupported elements are unwrapped (their text is kept)
//! and attributes are dropped, except `href` on links.

use std::{borrow::Cow, sync::OnceLock};

use regex::Regex;

/// Tags Telegram renders in HTML parse mode.
pub const SUPPORTED_TAGS: [&str; 12] = [
    "a", "b", "strong", "i", "em", "u", "ins", "s", "strike", "del", "code", "pre",
];

const VOID_TAGS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

// Elements whose content is not readable text.
const RAW_TEXT_TAGS: [&str; 2] = ["script", "style"];

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Text(&'a str),
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    End {
        name: String,
    },
    Comment,
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    let mut text_start = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        let Some((tok, end)) = parse_markup(input, i) else {
            // A stray '<' is plain text.
            i += 1;
            continue;
        };

        if text_start < i {
            out.push(Token::Text(&input[text_start..i]));
        }

        match tok {
            Token::Start {
                ref name,
                self_closing: false,
                ..
            } if RAW_TEXT_TAGS.contains(&name.as_str()) => {
                // Skip to the matching end tag; the end tag itself is ignored later.
                let close = format!("</{name}");
                i = input[end..]
                    .to_ascii_lowercase()
                    .find(&close)
                    .map(|p| end + p)
                    .unwrap_or(input.len());
            }
            tok => {
                out.push(tok);
                i = end;
            }
        }
        text_start = i;
    }

    if text_start < bytes.len() {
        out.push(Token::Text(&input[text_start..]));
    }
    out
}

/// Parse the markup starting at `start` (which holds a `<`).
///
/// Returns the token and the byte offset just past it, or `None` when the
/// `<` does not open a tag.
fn parse_markup(input: &str, start: usize) -> Option<(Token<'_>, usize)> {
    let rest = &input[start..];
    let b = input.as_bytes();

    if let Some(after) = rest.strip_prefix("<!--") {
        let end = after
            .find("-->")
            .map(|p| start + 4 + p + 3)
            .unwrap_or(input.len());
        return Some((Token::Comment, end));
    }
    if rest.starts_with("<!") || rest.starts_with("<?") {
        let end = rest.find('>').map(|p| start + p + 1).unwrap_or(input.len());
        return Some((Token::Comment, end));
    }

    let closing = rest.starts_with("</");
    let mut p = start + if closing { 2 } else { 1 };
    if p >= b.len() || !b[p].is_ascii_alphabetic() {
        return None;
    }
    let name_start = p;
    while p < b.len() && (b[p].is_ascii_alphanumeric() || b[p] == b'-' || b[p] == b':') {
        p += 1;
    }
    let name = input[name_start..p].to_ascii_lowercase();

    if closing {
        let end = input[p..].find('>')? + p + 1;
        return Some((Token::End { name }, end));
    }

    let mut attrs = Vec::new();
    let mut self_closing = false;
    loop {
        while p < b.len() && b[p].is_ascii_whitespace() {
            p += 1;
        }
        if p >= b.len() {
            return None;
        }
        match b[p] {
            b'>' => {
                p += 1;
                break;
            }
            b'/' => {
                p += 1;
                if p < b.len() && b[p] == b'>' {
                    self_closing = true;
                    p += 1;
                    break;
                }
                continue;
            }
            _ => {}
        }

        let attr_start = p;
        while p < b.len()
            && !b[p].is_ascii_whitespace()
            && !matches!(b[p], b'=' | b'>' | b'/')
        {
            p += 1;
        }
        if p == attr_start {
            // Lone '='.
            p += 1;
            continue;
        }
        let attr_name = input[attr_start..p].to_ascii_lowercase();

        while p < b.len() && b[p].is_ascii_whitespace() {
            p += 1;
        }
        let mut value = String::new();
        if p < b.len() && b[p] == b'=' {
            p += 1;
            while p < b.len() && b[p].is_ascii_whitespace() {
                p += 1;
            }
            if p < b.len() && (b[p] == b'"' || b[p] == b'\'') {
                let quote = b[p];
                p += 1;
                let value_start = p;
                while p < b.len() && b[p] != quote {
                    p += 1;
                }
                if p >= b.len() {
                    return None;
                }
                value = input[value_start..p].to_string();
                p += 1;
            } else {
                let value_start = p;
                while p < b.len() && !b[p].is_ascii_whitespace() && b[p] != b'>' {
                    p += 1;
                }
                value = input[value_start..p].to_string();
            }
        }
        attrs.push((attr_name, value));
    }

    Some((
        Token::Start {
            name,
            attrs,
            self_closing,
        },
        p,
    ))
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn has_class(attrs: &[(String, String)], class: &str) -> bool {
    attr(attrs, "class").is_some_and(|v| v.split_ascii_whitespace().any(|c| c == class))
}

fn is_underline_style(style: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*text-decoration\s*:\s*underline\s*;?\s*$").expect("valid regex")
    })
    .is_match(style)
}

/// What to emit around an element.
struct ElementRewrite {
    /// Tag to emit, or `None` to unwrap the element.
    tag: Option<String>,
    before: &'static str,
    prepend: &'static str,
    after: &'static str,
    href: Option<String>,
}

fn rewrite_element(name: &str, attrs: &[(String, String)], link_base: &str) -> ElementRewrite {
    let mut tag = name.to_string();
    let (mut before, mut prepend, mut after) = ("", "", "");

    if name == "li" {
        before = "- ";
        after = "\n";
    } else if name == "div" && has_class(attrs, "extraInfo") {
        before = "\n";
    } else if name == "span" && attr(attrs, "id") == Some("horaExamen") {
        after = "\n";
    } else if name == "span" && has_class(attrs, "label") {
        tag = "i".to_string();
        prepend = "- ";
    } else if name == "span" && attr(attrs, "style").is_some_and(is_underline_style) {
        tag = "u".to_string();
    }

    let href = if tag == "a" {
        attr(attrs, "href")
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(|h| absolutize_href(h, link_base))
    } else {
        None
    };

    // Telegram rejects anchors without a target.
    let keep = SUPPORTED_TAGS.contains(&tag.as_str()) && (tag != "a" || href.is_some());

    ElementRewrite {
        tag: keep.then_some(tag),
        before,
        prepend,
        after,
        href,
    }
}

fn absolutize_href(href: &str, link_base: &str) -> String {
    let href = if href.starts_with('/') && !href.starts_with("//") {
        Cow::Owned(format!("{}{href}", link_base.trim_end_matches('/')))
    } else {
        Cow::Borrowed(href)
    };
    // Entities already in the source stay single-escaped.
    let decoded = html_escape::decode_html_entities(&href);
    html_escape::encode_double_quoted_attribute(&decoded).into_owned()
}

/// Escape text content: `&`, `<`, `>` only (quotes are literal outside attributes).
pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

struct OpenElement {
    name: String,
    tag: Option<String>,
    after: &'static str,
}

struct Rewriter<'a> {
    out: String,
    stack: Vec<OpenElement>,
    link_base: &'a str,
}

impl Rewriter<'_> {
    fn start(&mut self, name: &str, attrs: &[(String, String)], self_closing: bool) {
        if name == "br" {
            self.out.push('\n');
            return;
        }
        if VOID_TAGS.contains(&name) {
            return;
        }

        self.close_implied_by(name);

        let rw = rewrite_element(name, attrs, self.link_base);
        self.out.push_str(rw.before);
        if let Some(tag) = &rw.tag {
            self.out.push('<');
            self.out.push_str(tag);
            if let Some(href) = &rw.href {
                self.out.push_str(" href=\"");
                self.out.push_str(href);
                self.out.push('"');
            }
            self.out.push('>');
        }
        self.out.push_str(rw.prepend);

        let open = OpenElement {
            name: name.to_string(),
            tag: rw.tag,
            after: rw.after,
        };
        if self_closing {
            self.close(open);
        } else {
            self.stack.push(open);
        }
    }

    // A new list item or paragraph ends the previous one when it was left open.
    fn close_implied_by(&mut self, name: &str) {
        let boundary: &[&str] = match name {
            "li" => &["ul", "ol"],
            "p" => &["div", "li", "td", "blockquote"],
            _ => return,
        };
        let found = self
            .stack
            .iter()
            .rposition(|o| o.name == name || boundary.contains(&o.name.as_str()));
        if let Some(pos) = found {
            if self.stack[pos].name == name {
                self.close_down_to(pos);
            }
        }
    }

    fn end(&mut self, name: &str) {
        // End tags with no open element are dropped.
        if let Some(pos) = self.stack.iter().rposition(|o| o.name == name) {
            self.close_down_to(pos);
        }
    }

    fn close_down_to(&mut self, pos: usize) {
        while self.stack.len() > pos {
            if let Some(open) = self.stack.pop() {
                self.close(open);
            }
        }
    }

    fn close(&mut self, open: OpenElement) {
        if let Some(tag) = open.tag {
            self.out.push_str("</");
            self.out.push_str(&tag);
            self.out.push('>');
        }
        self.out.push_str(open.after);
    }

    fn text(&mut self, raw: &str) {
        let decoded = html_escape::decode_html_entities(raw);
        self.out.push_str(&escape_text(&decoded));
    }

    fn finish(mut self) -> String {
        self.close_down_to(0);
        self.out
    }
}

/// Rewrite arbitrary notice HTML into Telegram's supported subset.
///
/// Path-only link targets are resolved against `link_base`.
pub fn rewrite(html: &str, link_base: &str) -> String {
    let mut rw = Rewriter {
        out: String::with_capacity(html.len()),
        stack: Vec::new(),
        link_base,
    };
    for tok in tokenize(html) {
        match tok {
            Token::Text(t) => rw.text(t),
            Token::Start {
                name,
                attrs,
                self_closing,
            } => rw.start(&name, &attrs, self_closing),
            Token::End { name } => rw.end(&name),
            Token::Comment => {}
        }
    }
    rw.finish()
}
