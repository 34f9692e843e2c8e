//! Discord delivery over the REST API.

use crate::config::DiscordConfig;
use crate::delivery::DeliveryChannel;
use crate::error::{BotError, Result};
use async_trait::async_trait;
use serde_json::json;

/// Discord delivery over the REST "create message" endpoint.
pub struct DiscordDelivery {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl DiscordDelivery {
    pub fn new(config: &DiscordConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self, channel: &str) -> String {
        format!("{}/channels/{channel}/messages", self.api_base)
    }
}

#[async_trait]
impl DeliveryChannel for DiscordDelivery {
    async fn send(&self, channel: &str, text: &str) -> Result<()> {
        let body = json!({
            "content": text
        });
        let response = self
            .client
            .post(self.messages_url(channel))
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::Delivery(format!("discord send to {channel}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Delivery(format!(
                "discord send failed ({status}): {body}"
            )));
        }
        Ok(())
    }
}
