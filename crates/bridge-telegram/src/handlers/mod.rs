//! Telegram update handlers.
//!
//! Each message from the bridged chat becomes at most one `NormalizedEvent`:
//! - text -> Text
//! - voice / audio -> VoiceNote
//! - document -> GenericFile
//!
//! Media file ids are resolved to download links here; the relay itself runs on
//! the shared intake.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::{debug, info, warn};

use bridge_core::{
    domain::{Author, ChatRef, MediaKind, MediaRef, NormalizedEvent},
    utils::{redact_url, truncate_text},
};

use crate::router::BridgeState;

/// Inbound media before its file id is resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PendingMedia {
    kind: MediaKind,
    file_id: String,
    suggested_name: String,
    mime_hint: Option<String>,
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<BridgeState>) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;
    debug!(chat_id, "telegram message received");

    if chat_id != state.chat_id {
        debug!(chat_id, "message is not from the bridged chat");
        return Ok(());
    }
    if state.intake.is_shutting_down() {
        return Ok(());
    }

    let Some(user) = msg.from() else {
        return Ok(());
    };
    let author = Author {
        id: user.id.0.to_string(),
        label: author_label(&user.first_name, user.last_name.as_deref()),
    };
    let chat = ChatRef::Telegram(chat_id);

    if let Some(text) = msg.text() {
        debug!(preview = %truncate_text(text, 64), "telegram text received");
        state
            .intake
            .submit(NormalizedEvent::text(chat, author, text));
        return Ok(());
    }

    let Some(pending) = pending_media(&msg) else {
        debug!("unsupported telegram message type, skipping");
        return Ok(());
    };

    let source_url = match resolve_file_url(&bot, &pending.file_id).await {
        Ok(url) => url,
        Err(e) => {
            warn!(file_id = %pending.file_id, "failed to resolve telegram file: {e}");
            return Ok(());
        }
    };
    info!(kind = pending.kind.label(), url = %redact_url(&source_url), "telegram media received");

    let media = MediaRef {
        source_url,
        suggested_name: pending.suggested_name,
        mime_hint: pending.mime_hint,
    };
    state
        .intake
        .submit(NormalizedEvent::media(chat, author, pending.kind, media));
    Ok(())
}

fn pending_media(msg: &Message) -> Option<PendingMedia> {
    if let Some(voice) = msg.voice() {
        if voice.mime_type.is_none() {
            warn!(file_id = %voice.file.id, "voice message without mime type, assuming ogg");
        }
        return Some(PendingMedia {
            kind: MediaKind::Voice,
            file_id: voice.file.id.clone(),
            suggested_name: fallback_name("voice", &voice.file.unique_id, Some("ogg")),
            mime_hint: voice.mime_type.as_ref().map(|m| m.to_string()),
        });
    }

    if let Some(audio) = msg.audio() {
        return Some(PendingMedia {
            kind: MediaKind::Voice,
            file_id: audio.file.id.clone(),
            suggested_name: audio
                .file_name
                .clone()
                .unwrap_or_else(|| fallback_name("audio", &audio.file.unique_id, None)),
            mime_hint: audio.mime_type.as_ref().map(|m| m.to_string()),
        });
    }

    if let Some(doc) = msg.document() {
        return Some(PendingMedia {
            kind: MediaKind::File,
            file_id: doc.file.id.clone(),
            suggested_name: doc
                .file_name
                .clone()
                .unwrap_or_else(|| fallback_name("document", &doc.file.unique_id, None)),
            mime_hint: doc.mime_type.as_ref().map(|m| m.to_string()),
        });
    }

    None
}

async fn resolve_file_url(bot: &Bot, file_id: &str) -> anyhow::Result<String> {
    let file = bot.get_file(file_id.to_string()).await?;
    Ok(file_download_url(
        bot.api_url().as_str(),
        bot.token(),
        &file.path,
    ))
}

/// `<api>/file/bot<token>/<path>`, the Bot API download link for a file.
fn file_download_url(api_url: &str, token: &str, file_path: &str) -> String {
    format!(
        "{}/file/bot{}/{}",
        api_url.trim_end_matches('/'),
        token,
        file_path.trim_start_matches('/')
    )
}

/// `first [last]`, as shown in the attribution prefix.
fn author_label(first_name: &str, last_name: Option<&str>) -> String {
    let first = first_name.trim();
    match last_name.map(str::trim).filter(|s| !s.is_empty()) {
        Some(last) if !first.is_empty() => format!("{first} {last}"),
        Some(last) => last.to_string(),
        None => first.to_string(),
    }
}

fn fallback_name(prefix: &str, unique_id: &str, ext: Option<&str>) -> String {
    match ext {
        Some(ext) => format!("{prefix}_{unique_id}.{ext}"),
        None => format!("{prefix}_{unique_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_label_joins_names() {
        assert_eq!(author_label("Ann", None), "Ann");
        assert_eq!(author_label("Ann", Some("")), "Ann");
        assert_eq!(author_label("Ann", Some("Lee")), "Ann Lee");
        assert_eq!(author_label(" ", Some("Lee")), "Lee");
    }

    #[test]
    fn download_url_shape() {
        assert_eq!(
            file_download_url("https://api.telegram.org/", "123:abc", "voice/file_1.oga"),
            "https://api.telegram.org/file/bot123:abc/voice/file_1.oga"
        );
        assert_eq!(
            redact_url(&file_download_url("https://api.telegram.org", "123:abc", "/a.ogg")),
            "https://api.telegram.org/file/bot<redacted>/a.ogg"
        );
    }

    #[test]
    fn fallback_names() {
        assert_eq!(fallback_name("voice", "AQAD", Some("ogg")), "voice_AQAD.ogg");
        assert_eq!(fallback_name("document", "AQAD", None), "document_AQAD");
    }
}
