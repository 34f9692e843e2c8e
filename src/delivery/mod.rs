//! Outbound message delivery.
//!
//! The scheduler only needs to send text to a named destination channel.
//! [`DiscordDelivery`] does that over the Discord REST API;
//! [`RecordingChannel`] keeps messages in memory for tests and dry runs.

pub mod discord;

pub use discord::DiscordDelivery;

use crate::error::{BotError, Result};
use async_trait::async_trait;
use std::sync::Mutex;

/// Delivery contract consumed by the scheduler.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Send `text` to `channel`.
    async fn send(&self, channel: &str, text: &str) -> Result<()>;
}

/// Wrap text in the fixed-width code block delimiters the chat client renders.
pub fn code_block(text: &str) -> String {
    format!("```{text}```")
}

/// A message captured by [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: String,
    pub text: String,
}

/// In-memory [`DeliveryChannel`] that records what it was asked to send.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<SentMessage>>,
    fail: Mutex<bool>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail without recording anything.
    pub fn set_failing(&self, fail: bool) {
        *self
            .fail
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = fail;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send(&self, channel: &str, text: &str) -> Result<()> {
        let failing = *self
            .fail
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if failing {
            return Err(BotError::Delivery(format!("send to {channel} refused")));
        }
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(SentMessage {
                channel: channel.to_owned(),
                text: text.to_owned(),
            });
        Ok(())
    }
}
