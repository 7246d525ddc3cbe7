use anyhow::Result;
use serde::Serialize;

use crate::domain::email::MessageSummary;

/// Embed accent colour (#34d399).
pub const EMBED_COLOR: u32 = 0x34d399;

const TITLE_LIMIT: usize = 256;
const DESCRIPTION_LIMIT: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub footer: EmbedFooter,
    pub color: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

impl Embed {
    pub fn for_message(email: &MessageSummary) -> Self {
        Self::build(&email.subject, &email.snippet, &email.received_local())
    }

    pub fn build(subject: &str, snippet: &str, received: &str) -> Self {
        Self {
            title: truncate(subject, TITLE_LIMIT),
            description: truncate(snippet, DESCRIPTION_LIMIT),
            footer: EmbedFooter {
                text: format!("Received at {received}"),
            },
            color: EMBED_COLOR,
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

/// Destination for formatted notifications.
pub trait Notifier {
    fn send(&self, embed: &Embed) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn embed_carries_subject_snippet_and_time() {
        let email = MessageSummary {
            id: "m1".into(),
            subject: "Invoice".into(),
            snippet: "Payment due".into(),
            received_at: Some(chrono::Utc.with_ymd_and_hms(2024, 3, 14, 21, 5, 3).unwrap()),
        };
        let embed = Embed::for_message(&email);
        assert_eq!(embed.title, "Invoice");
        assert_eq!(embed.description, "Payment due");
        assert!(embed.footer.text.starts_with("Received at "));
        assert!(embed.footer.text.contains("2024"));
        assert_eq!(embed.color, EMBED_COLOR);
    }

    #[test]
    fn serializes_to_discord_shape() {
        let embed = Embed::build("Invoice", "Payment due", "3/14/2024, 9:05:03 PM");
        let json = serde_json::to_value(&embed).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "title": "Invoice",
                "description": "Payment due",
                "footer": {"text": "Received at 3/14/2024, 9:05:03 PM"},
                "color": 3462041
            })
        );
    }

    #[test]
    fn long_fields_are_truncated() {
        let subject = "s".repeat(300);
        let snippet = "é".repeat(5000);
        let embed = Embed::build(&subject, &snippet, "now");
        assert_eq!(embed.title.chars().count(), TITLE_LIMIT);
        assert!(embed.title.ends_with('…'));
        assert_eq!(embed.description.chars().count(), DESCRIPTION_LIMIT);
    }
}
