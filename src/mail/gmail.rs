//! Gmail REST client: list unread by sender, fetch a message, drop the UNREAD label.

use anyhow::{Result, bail};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::json;

use crate::auth::token_manager::TokenSource;
use crate::domain::email::{MessageId, MessageSummary, NO_SUBJECT, parse_internal_date};
use crate::mail::Mailbox;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

#[derive(Debug, Deserialize)]
pub struct MessageRef {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesResponse {
    pub messages: Option<Vec<MessageRef>>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub id: String,
    pub snippet: Option<String>,
    pub payload: Option<MessagePayload>,
    #[serde(rename = "internalDate")]
    pub internal_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagePayload {
    pub headers: Option<Vec<MessageHeader>>,
}

#[derive(Debug, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

impl Message {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .as_ref()?
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// A missing or malformed `internalDate` is logged, never fatal.
    pub fn into_summary(self) -> MessageSummary {
        let subject = self.header("Subject").unwrap_or(NO_SUBJECT).to_string();
        let received_at = match self.internal_date.as_deref() {
            Some(raw) => {
                let parsed = parse_internal_date(raw);
                if parsed.is_none() {
                    log::warn!("Message {} has bad internalDate {raw:?}", self.id);
                }
                parsed
            }
            None => {
                log::warn!("Message {} has no internalDate", self.id);
                None
            }
        };

        MessageSummary {
            id: self.id,
            subject,
            snippet: self.snippet.unwrap_or_default(),
            received_at,
        }
    }
}

pub fn unread_from_query(sender: &str) -> String {
    format!("from:{sender} is:unread")
}

pub struct GmailClient {
    http: Client,
    base_url: String,
    tokens: Box<dyn TokenSource>,
}

impl GmailClient {
    pub fn new(tokens: Box<dyn TokenSource>) -> Self {
        Self {
            http: Client::new(),
            base_url: GMAIL_API_BASE.to_string(),
            tokens,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/users/me/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn check(res: Response, what: &str) -> Result<Response> {
        let status = res.status();
        if !status.is_success() {
            let text = res.text().unwrap_or_default();
            bail!("Gmail {what} failed ({status}): {text}");
        }
        Ok(res)
    }
}

impl Mailbox for GmailClient {
    fn list_unread_from(&self, sender: &str, max_results: u32) -> Result<Vec<MessageId>> {
        let token = self.tokens.access_token()?;
        let res = self
            .http
            .get(self.url("messages"))
            .bearer_auth(token)
            .query(&[
                ("q", unread_from_query(sender)),
                ("maxResults", max_results.to_string()),
            ])
            .send()?;
        let list: ListMessagesResponse = Self::check(res, "list")?.json()?;
        Ok(list
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| m.id)
            .collect())
    }

    fn fetch_summary(&self, id: &str) -> Result<MessageSummary> {
        let token = self.tokens.access_token()?;
        let res = self
            .http
            .get(self.url(&format!("messages/{id}")))
            .bearer_auth(token)
            .send()?;
        let msg: Message = Self::check(res, "get")?.json()?;
        Ok(msg.into_summary())
    }

    fn mark_read(&self, id: &str) -> Result<()> {
        let token = self.tokens.access_token()?;
        let res = self
            .http
            .post(self.url(&format!("messages/{id}/modify")))
            .bearer_auth(token)
            .json(&json!({ "removeLabelIds": ["UNREAD"] }))
            .send()?;
        Self::check(res, "modify")?;
        Ok(())
    }
}
