pub mod gmail;

use anyhow::Result;

use crate::domain::email::{MessageId, MessageSummary};

/// The three mailbox operations the relay needs.
pub trait Mailbox {
    /// Ids of unread messages from `sender`, newest first, at most `max_results`.
    fn list_unread_from(&self, sender: &str, max_results: u32) -> Result<Vec<MessageId>>;
    fn fetch_summary(&self, id: &str) -> Result<MessageSummary>;
    fn mark_read(&self, id: &str) -> Result<()>;
}
