//! Discord adapter (serenity).
//!
//! Implements the `bridge-core` OutboundPort over the Discord HTTP API and turns
//! gateway messages from the bridged channel into normalized relay events.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;

use serenity::{
    builder::{CreateAttachment, CreateMessage},
    http::Http,
    model::id::ChannelId,
};

pub mod handlers;
pub mod router;

use bridge_core::{domain::ChatRef, errors::Error, ports::OutboundPort, Result};

pub use router::{DiscordClient, DiscordRunner};

/// Discord refuses message content longer than this many characters.
const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Clone)]
pub struct DiscordMessenger {
    http: Arc<Http>,
}

impl DiscordMessenger {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    fn ds_channel(chat: ChatRef) -> Result<ChannelId> {
        match chat {
            // ChannelId::new panics on zero.
            ChatRef::Discord(id) if id != 0 => Ok(ChannelId::new(id)),
            other => Err(Error::Platform(format!(
                "discord adapter cannot send to {other}"
            ))),
        }
    }

    fn map_err(e: serenity::Error) -> Error {
        Error::Platform(format!("discord error: {e}"))
    }

    async fn send_attachment(
        &self,
        chat: ChatRef,
        path: &Path,
        filename: &str,
        caption: &str,
    ) -> Result<()> {
        let channel = Self::ds_channel(chat)?;
        let data = tokio::fs::read(path).await?;
        let message = CreateMessage::new()
            .content(caption)
            .add_file(CreateAttachment::bytes(data, filename));
        channel
            .send_message(&*self.http, message)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }
}

#[async_trait]
impl OutboundPort for DiscordMessenger {
    async fn send_text(&self, chat: ChatRef, text: &str) -> Result<()> {
        let channel = Self::ds_channel(chat)?;
        let chars = text.chars().count();
        if chars > MAX_CONTENT_CHARS {
            return Err(Error::Platform(format!(
                "message is {chars} characters, over Discord's {MAX_CONTENT_CHARS} limit"
            )));
        }
        channel
            .say(&self.http, text)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn send_voice(&self, chat: ChatRef, path: &Path, caption: &str) -> Result<()> {
        // Discord has no voice-note upload; an audio attachment plays inline.
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("voice.mp3");
        self.send_attachment(chat, path, filename, caption).await
    }

    async fn send_file(
        &self,
        chat: ChatRef,
        path: &Path,
        filename: &str,
        caption: &str,
    ) -> Result<()> {
        self.send_attachment(chat, path, filename, caption).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_telegram_and_zero_targets() {
        assert_eq!(
            DiscordMessenger::ds_channel(ChatRef::Discord(42)).unwrap(),
            ChannelId::new(42)
        );
        assert!(matches!(
            DiscordMessenger::ds_channel(ChatRef::Telegram(42)),
            Err(Error::Platform(_))
        ));
        assert!(matches!(
            DiscordMessenger::ds_channel(ChatRef::Discord(0)),
            Err(Error::Platform(_))
        ));
    }

    #[tokio::test]
    async fn overlong_text_is_refused_with_the_limit_in_the_error() {
        let messenger = DiscordMessenger::new(Arc::new(Http::new("test-token")));
        let text = format!("[TG] Ann: {}", "x".repeat(MAX_CONTENT_CHARS));

        let err = messenger
            .send_text(ChatRef::Discord(42), &text)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Platform(ref m) if m.contains("2000")), "{err}");
    }
}
