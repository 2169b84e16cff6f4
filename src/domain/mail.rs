use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

pub type MailId = i64;

/// Timestamp layout used by the backend for `received_time`.
pub const RECEIVED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NO_SUBJECT: &str = "(no subject)";

/// One retrieved email as surfaced by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailRecord {
    pub id: MailId,
    #[serde(default)]
    pub email_id: Option<i64>,
    #[serde(default, deserialize_with = "nullable_string")]
    pub recipient_email: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub sender: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "nullable_content")]
    pub content: MailContent,
    #[serde(default, deserialize_with = "flag")]
    pub has_attachments: bool,
    #[serde(default)]
    pub received_time: Option<String>,
}

impl MailRecord {
    pub fn display_subject(&self) -> &str {
        match self.subject.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => NO_SUBJECT,
        }
    }

    pub fn received_at(&self) -> Option<NaiveDateTime> {
        let raw = self.received_time.as_deref()?;
        NaiveDateTime::parse_from_str(raw, RECEIVED_TIME_FORMAT).ok()
    }
}

/// Metadata of one stored attachment; the bytes are fetched separately.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Attachment {
    pub id: i64,
    #[serde(default)]
    pub mail_id: Option<MailId>,
    #[serde(default, deserialize_with = "nullable_string")]
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// Mail body as delivered: either a bare string or an object carrying
/// `content` and/or `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MailContent {
    PlainText(String),
    Structured {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        text: Option<String>,
    },
}

impl Default for MailContent {
    fn default() -> Self {
        MailContent::PlainText(String::new())
    }
}

impl MailContent {
    /// Raw body text. Structured bodies prefer `content` and fall back to `text`.
    pub fn body(&self) -> &str {
        match self {
            MailContent::PlainText(s) => s,
            MailContent::Structured { content, text } => content
                .as_deref()
                .filter(|c| !c.is_empty())
                .or(text.as_deref())
                .unwrap_or(""),
        }
    }

    /// Body reduced to terminal-safe plain text; markup is rendered, never passed through.
    pub fn plain_text(&self, width: usize) -> String {
        let body = self.body();
        if looks_like_html(body) {
            html2text::from_read(body.as_bytes(), width.max(20))
                .unwrap_or_else(|_| body.to_string())
        } else {
            body.to_string()
        }
    }
}

fn looks_like_html(s: &str) -> bool {
    let lower = s.trim_start().to_ascii_lowercase();
    lower.starts_with("<!doctype")
        || lower.starts_with("<html")
        || (lower.contains("</") && lower.contains('>'))
        || lower.contains("<br")
}

fn nullable_content<'de, D>(de: D) -> Result<MailContent, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<MailContent>::deserialize(de)?.unwrap_or_default())
}

fn nullable_string<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(de)?.unwrap_or_default())
}

/// The backend stores flags as 0/1 integers but some paths emit JSON booleans.
pub(crate) fn flag<'de, D>(de: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Flag>::deserialize(de)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(n)) => n != 0,
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_string_content() {
        let r: MailRecord = serde_json::from_str(
            r#"{"id":7,"recipient_email":"a@x.com","sender":"s@y.com","subject":"Hi",
                "content":"hello","has_attachments":1,"received_time":"2026-01-09 12:00:00"}"#,
        )
        .unwrap();
        assert_eq!(r.content, MailContent::PlainText("hello".into()));
        assert!(r.has_attachments);
        assert_eq!(
            r.received_at().unwrap().format("%H:%M").to_string(),
            "12:00"
        );
    }

    #[test]
    fn parses_structured_content_and_prefers_content_field() {
        let r: MailRecord = serde_json::from_str(
            r#"{"id":1,"content":{"content":"","text":"fallback"},"has_attachments":false}"#,
        )
        .unwrap();
        assert_eq!(r.content.body(), "fallback");

        let c = MailContent::Structured {
            content: Some("primary".into()),
            text: Some("fallback".into()),
        };
        assert_eq!(c.body(), "primary");
    }

    #[test]
    fn missing_or_null_content_is_empty() {
        let r: MailRecord = serde_json::from_str(r#"{"id":2,"content":null}"#).unwrap();
        assert_eq!(r.content.body(), "");
        assert!(!r.has_attachments);
        assert!(r.received_at().is_none());
    }

    #[test]
    fn null_sender_and_recipient_decode_as_empty() {
        let r: MailRecord =
            serde_json::from_str(r#"{"id":4,"sender":null,"recipient_email":null}"#).unwrap();
        assert_eq!(r.sender, "");
        assert_eq!(r.recipient_email, "");
    }

    #[test]
    fn one_null_sender_does_not_sink_the_batch() {
        let batch: Vec<MailRecord> = serde_json::from_str(
            r#"[{"id":6,"sender":"a@x.com","subject":"ok"},
                {"id":5,"sender":null,"recipient_email":"b@x.com"}]"#,
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].sender, "");
        assert_eq!(batch[1].recipient_email, "b@x.com");
    }

    #[test]
    fn empty_subject_uses_placeholder() {
        let mut r: MailRecord = serde_json::from_str(r#"{"id":3,"subject":"  "}"#).unwrap();
        assert_eq!(r.display_subject(), "(no subject)");
        r.subject = None;
        assert_eq!(r.display_subject(), "(no subject)");
        r.subject = Some("Welcome".into());
        assert_eq!(r.display_subject(), "Welcome");
    }

    #[test]
    fn html_body_is_rendered_without_tags() {
        let c = MailContent::PlainText(
            "<html><body><p>Your code is <b>4821</b></p><script>x()</script></body></html>".into(),
        );
        let text = c.plain_text(80);
        assert!(text.contains("4821"));
        assert!(!text.contains("<b>"));
        assert!(!text.contains("<script>"));
    }
}
