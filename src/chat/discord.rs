//! Discord REST client used as the relay's notifier.

use anyhow::{Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::daemon::notifier::{Embed, Notifier};

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub discriminator: Option<String>,
}

impl CurrentUser {
    /// `name#1234` for legacy accounts, bare username otherwise.
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if d != "0" => format!("{}#{}", self.username, d),
            _ => self.username.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: Option<String>,
}

pub struct DiscordClient {
    http: Client,
    base_url: String,
    bot_token: String,
    channel_id: String,
}

impl DiscordClient {
    pub fn new(bot_token: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: DISCORD_API_BASE.to_string(),
            bot_token: bot_token.into(),
            channel_id: channel_id.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    /// Verify the bot token; the returned user is who we post as.
    pub fn login(&self) -> Result<CurrentUser> {
        let res = self
            .http
            .get(self.url("users/@me"))
            .header("Authorization", self.auth())
            .send()?;
        Ok(check(res)?.json()?)
    }

    pub fn fetch_channel(&self) -> Result<Channel> {
        let res = self
            .http
            .get(self.url(&format!("channels/{}", self.channel_id)))
            .header("Authorization", self.auth())
            .send()?;
        Ok(check(res)?.json()?)
    }
}

impl Notifier for DiscordClient {
    fn send(&self, embed: &Embed) -> Result<()> {
        let channel = self.fetch_channel()?;
        let res = self
            .http
            .post(self.url(&format!("channels/{}/messages", channel.id)))
            .header("Authorization", self.auth())
            .json(&json!({ "embeds": [embed] }))
            .send()?;
        check(res)?;
        log::info!(
            "Email sent to Discord channel {}",
            channel.name.as_deref().unwrap_or(&channel.id)
        );
        Ok(())
    }
}

fn check(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().unwrap_or_default();
    Err(anyhow!(discord_error(status, &body)))
}

fn discord_error(status: StatusCode, body: &str) -> String {
    if let Ok(error_json) = serde_json::from_str::<Value>(body) {
        let code = error_json.get("code").and_then(|c| c.as_u64()).unwrap_or(0);
        let message = error_json
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error");
        format!("Discord API error ({status}): {message} (code {code})")
    } else {
        format!("Discord API error ({status}): {body}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(server: &mockito::Server) -> DiscordClient {
        DiscordClient::new("bot-token", "1234567890").with_base_url(server.url())
    }

    #[test]
    fn login_returns_bot_user() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/users/@me")
            .match_header("authorization", "Bot bot-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "42", "username": "mailbot", "discriminator": "0", "bot": true}"#)
            .create();

        let me = client(&server).login().unwrap();
        assert_eq!(me.id, "42");
        assert_eq!(me.tag(), "mailbot");
    }

    #[test]
    fn bad_token_is_a_login_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/users/@me")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "401: Unauthorized", "code": 0}"#)
            .create();

        let err = client(&server).login().unwrap_err();
        assert!(err.to_string().contains("401: Unauthorized"));
    }

    #[test]
    fn send_posts_embed_to_resolved_channel() {
        let mut server = mockito::Server::new();
        let lookup = server
            .mock("GET", "/channels/1234567890")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "1234567890", "name": "inbox", "type": 0}"#)
            .create();
        let post = server
            .mock("POST", "/channels/1234567890/messages")
            .match_header("authorization", "Bot bot-token")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "embeds": [{
                    "title": "Invoice",
                    "description": "Payment due",
                    "footer": {"text": "Received at 3/14/2024, 9:05:03 PM"},
                    "color": 3462041
                }]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "999"}"#)
            .create();

        let embed = Embed::build("Invoice", "Payment due", "3/14/2024, 9:05:03 PM");
        client(&server).send(&embed).unwrap();
        lookup.assert();
        post.assert();
    }

    #[test]
    fn unknown_channel_fails_without_posting() {
        let mut server = mockito::Server::new();
        let _lookup = server
            .mock("GET", "/channels/1234567890")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "Unknown Channel", "code": 10003}"#)
            .create();
        let post = server
            .mock("POST", "/channels/1234567890/messages")
            .expect(0)
            .create();

        let err = client(&server)
            .send(&Embed::build("a", "b", "c"))
            .unwrap_err();
        assert!(err.to_string().contains("Unknown Channel"));
        assert!(err.to_string().contains("10003"));
        post.assert();
    }
}
