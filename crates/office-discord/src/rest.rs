//! Discord REST client: channel messages, interaction callbacks, guild commands.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::DiscordError;
use crate::model::{CommandSpec, InteractionResponse, Message, MessagePayload};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Thin authenticated wrapper over the REST API. Every request is bounded by
/// the client timeout.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl RestClient {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self, DiscordError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(
                "DiscordBot (https://github.com/g960059/office-tracker, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()?;
        Ok(Self {
            http,
            token: token.into(),
            base_url: DEFAULT_API_BASE.to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn send_message(
        &self,
        channel_id: &str,
        payload: &MessagePayload,
    ) -> Result<Message, DiscordError> {
        let path = format!("/channels/{channel_id}/messages");
        self.request_json(Method::POST, &path, Some(serde_json::to_value(payload)?))
            .await
    }

    /// Overwrite an existing message in place. `NotFound` if it was deleted.
    pub async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        payload: &MessagePayload,
    ) -> Result<Message, DiscordError> {
        let path = format!("/channels/{channel_id}/messages/{message_id}");
        self.request_json(Method::PATCH, &path, Some(serde_json::to_value(payload)?))
            .await
    }

    pub async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Message, DiscordError> {
        let path = format!("/channels/{channel_id}/messages/{message_id}");
        self.request_json(Method::GET, &path, None).await
    }

    pub async fn respond(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        response: &InteractionResponse,
    ) -> Result<(), DiscordError> {
        let path = format!("/interactions/{interaction_id}/{interaction_token}/callback");
        self.request(Method::POST, &path, Some(response.to_json()))
            .await?;
        Ok(())
    }

    /// Replace the guild's command set.
    pub async fn register_guild_commands(
        &self,
        application_id: &str,
        guild_id: &str,
        commands: &[CommandSpec],
    ) -> Result<(), DiscordError> {
        let path = format!("/applications/{application_id}/guilds/{guild_id}/commands");
        self.request(Method::PUT, &path, Some(serde_json::to_value(commands)?))
            .await?;
        Ok(())
    }

    /// Websocket URL for the bot gateway.
    pub async fn gateway_url(&self) -> Result<String, DiscordError> {
        #[derive(serde::Deserialize)]
        struct GatewayBot {
            url: String,
        }
        let bot: GatewayBot = self.request_json(Method::GET, "/gateway/bot", None).await?;
        Ok(bot.url)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, DiscordError> {
        let text = self.request(method, path, body).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String, DiscordError> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self
            .http
            .request(method.clone(), &url)
            .header("Authorization", format!("Bot {}", self.token));
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        tracing::debug!(%method, path, status = status.as_u16(), "discord request");
        check_status(status, path, text)
    }
}

fn check_status(status: StatusCode, path: &str, body: String) -> Result<String, DiscordError> {
    if status.is_success() {
        Ok(body)
    } else if status == StatusCode::NOT_FOUND {
        Err(DiscordError::NotFound(path.to_string()))
    } else {
        Err(DiscordError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
