//! Chat-platform seam. The bot only needs to post, overwrite and answer;
//! tests substitute a recording fake.

use async_trait::async_trait;

use office_discord::{DiscordError, Interaction, InteractionResponse, MessagePayload, RestClient};

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Post a new message; returns its id.
    async fn post_message(
        &self,
        channel_id: &str,
        payload: &MessagePayload,
    ) -> Result<String, DiscordError>;

    /// Overwrite an existing message in place. Never creates one.
    async fn overwrite_message(
        &self,
        channel_id: &str,
        message_id: &str,
        payload: &MessagePayload,
    ) -> Result<(), DiscordError>;

    async fn respond_to(
        &self,
        interaction: &Interaction,
        response: &InteractionResponse,
    ) -> Result<(), DiscordError>;
}

#[async_trait]
impl ChatPlatform for RestClient {
    async fn post_message(
        &self,
        channel_id: &str,
        payload: &MessagePayload,
    ) -> Result<String, DiscordError> {
        Ok(self.send_message(channel_id, payload).await?.id)
    }

    async fn overwrite_message(
        &self,
        channel_id: &str,
        message_id: &str,
        payload: &MessagePayload,
    ) -> Result<(), DiscordError> {
        self.edit_message(channel_id, message_id, payload).await?;
        Ok(())
    }

    async fn respond_to(
        &self,
        interaction: &Interaction,
        response: &InteractionResponse,
    ) -> Result<(), DiscordError> {
        self.respond(&interaction.id, &interaction.token, response)
            .await
    }
}
