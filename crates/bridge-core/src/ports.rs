use std::path::Path;

use async_trait::async_trait;

use crate::{domain::ChatRef, Result};

/// Outbound primitives of one chat platform.
///
/// Telegram and Discord both implement this; the dispatcher only ever talks to
/// the opposite platform through it, so tests substitute a recording fake.
/// Each call is a single attempt.
#[async_trait]
pub trait OutboundPort: Send + Sync {
    async fn send_text(&self, chat: ChatRef, text: &str) -> Result<()>;

    /// Send an audio file as a voice message / voice attachment.
    async fn send_voice(&self, chat: ChatRef, path: &Path, caption: &str) -> Result<()>;

    async fn send_file(
        &self,
        chat: ChatRef,
        path: &Path,
        filename: &str,
        caption: &str,
    ) -> Result<()>;
}
