//! Telegram adapter (teloxide).
//!
//! Implements the `bridge-core` OutboundPort over the Telegram Bot API and turns
//! incoming chat messages into normalized relay events.

use std::path::Path;

use async_trait::async_trait;

use teloxide::{prelude::*, types::InputFile};

pub mod handlers;
pub mod router;

use bridge_core::{domain::ChatRef, errors::Error, ports::OutboundPort, Result};

pub use router::{TelegramClient, TelegramRunner};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat: ChatRef) -> Result<teloxide::types::ChatId> {
        match chat {
            ChatRef::Telegram(id) => Ok(teloxide::types::ChatId(id)),
            other => Err(Error::Platform(format!(
                "telegram adapter cannot send to {other}"
            ))),
        }
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Platform(format!("telegram error: {e}"))
    }
}

#[async_trait]
impl OutboundPort for TelegramMessenger {
    async fn send_text(&self, chat: ChatRef, text: &str) -> Result<()> {
        self.bot
            .send_message(Self::tg_chat(chat)?, text.to_string())
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn send_voice(&self, chat: ChatRef, path: &Path, caption: &str) -> Result<()> {
        self.bot
            .send_voice(Self::tg_chat(chat)?, InputFile::file(path.to_path_buf()))
            .caption(caption.to_string())
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn send_file(
        &self,
        chat: ChatRef,
        path: &Path,
        filename: &str,
        caption: &str,
    ) -> Result<()> {
        let file = InputFile::file(path.to_path_buf()).file_name(filename.to_string());
        self.bot
            .send_document(Self::tg_chat(chat)?, file)
            .caption(caption.to_string())
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }
}
