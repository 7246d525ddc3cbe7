use chrono::{DateTime, Local, TimeZone, Utc};

/// Gmail message id (opaque, hex-ish string).
pub type MessageId = String;

pub const NO_SUBJECT: &str = "No Subject";
/// Footer text when the server gave no usable receive time.
pub const UNKNOWN_TIME: &str = "unknown time";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    pub id: MessageId,
    pub subject: String,
    pub snippet: String,
    /// `None` when `internalDate` was missing or unparseable.
    pub received_at: Option<DateTime<Utc>>,
}

impl MessageSummary {
    /// Received time in the machine's local zone, e.g. `3/14/2024, 9:05:03 PM`.
    pub fn received_local(&self) -> String {
        match &self.received_at {
            Some(at) => format_received(&at.with_timezone(&Local)),
            None => UNKNOWN_TIME.to_string(),
        }
    }
}

pub fn format_received<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string()
}

/// Gmail `internalDate` is epoch millis encoded as a string.
pub fn parse_internal_date(raw: &str) -> Option<DateTime<Utc>> {
    let millis = raw.trim().parse::<i64>().ok()?;
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_date_is_epoch_millis() {
        let at = parse_internal_date("1731401723000").unwrap();
        assert_eq!(at.timestamp(), 1731401723);
        assert!(parse_internal_date("not a number").is_none());
        assert!(parse_internal_date("").is_none());
    }

    #[test]
    fn received_time_uses_us_locale_layout() {
        let at = Utc.with_ymd_and_hms(2024, 3, 14, 21, 5, 3).unwrap();
        assert_eq!(format_received(&at), "3/14/2024, 9:05:03 PM");

        let morning = Utc.with_ymd_and_hms(2024, 11, 2, 0, 30, 0).unwrap();
        assert_eq!(format_received(&morning), "11/2/2024, 12:30:00 AM");
    }

    #[test]
    fn missing_receive_time_renders_as_unknown() {
        let summary = MessageSummary {
            id: "m".into(),
            subject: NO_SUBJECT.into(),
            snippet: String::new(),
            received_at: None,
        };
        assert_eq!(summary.received_local(), UNKNOWN_TIME);
    }
}
