//! Discord gateway handler.
//!
//! A message from the bridged channel becomes one Text event (if it has
//! content) followed by one media event per attachment.

use async_trait::async_trait;
use serenity::{
    client::{Context, EventHandler},
    model::{channel::Message, gateway::Ready},
};
use tracing::{debug, info};

use bridge_core::{
    domain::{Author, ChatRef, MediaRef, NormalizedEvent},
    lifecycle::Intake,
    policy::classify_discord_attachment,
    utils::truncate_text,
};

/// Attachment fields the relay needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub url: String,
    pub filename: String,
    pub content_type: Option<String>,
}

/// The parts of a gateway message that matter to the bridge.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub channel_id: u64,
    pub author_id: u64,
    pub author_label: String,
    pub is_bot: bool,
    pub content: String,
    pub attachments: Vec<AttachmentInfo>,
}

impl InboundMessage {
    fn from_gateway(msg: &Message) -> Self {
        let author_label = msg
            .member
            .as_ref()
            .and_then(|m| m.nick.clone())
            .or_else(|| msg.author.global_name.clone())
            .unwrap_or_else(|| msg.author.name.clone());

        Self {
            channel_id: msg.channel_id.get(),
            author_id: msg.author.id.get(),
            author_label,
            is_bot: msg.author.bot,
            content: msg.content.clone(),
            attachments: msg
                .attachments
                .iter()
                .map(|a| AttachmentInfo {
                    url: a.url.clone(),
                    filename: a.filename.clone(),
                    content_type: a.content_type.clone(),
                })
                .collect(),
        }
    }
}

/// Normalized events for a message seen in `bridged_channel`, in relay order.
pub fn events_from(msg: InboundMessage, bridged_channel: u64) -> Vec<NormalizedEvent> {
    if msg.channel_id != bridged_channel || msg.is_bot {
        return Vec::new();
    }

    let chat = ChatRef::Discord(msg.channel_id);
    let author = Author {
        id: msg.author_id.to_string(),
        label: msg.author_label,
    };

    let mut events = Vec::with_capacity(msg.attachments.len() + 1);
    if !msg.content.trim().is_empty() {
        events.push(NormalizedEvent::text(chat, author.clone(), msg.content));
    }
    for att in msg.attachments {
        let kind = classify_discord_attachment(&att.filename);
        let media = MediaRef {
            source_url: att.url,
            suggested_name: att.filename,
            mime_hint: att.content_type,
        };
        events.push(NormalizedEvent::media(chat, author.clone(), kind, media));
    }
    events
}

pub struct Handler {
    channel_id: u64,
    intake: Intake,
}

impl Handler {
    pub fn new(channel_id: u64, intake: Intake) -> Self {
        Self { channel_id, intake }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "discord gateway ready");
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if self.intake.is_shutting_down() {
            return;
        }

        let events = events_from(InboundMessage::from_gateway(&msg), self.channel_id);
        if events.is_empty() {
            debug!(channel_id = msg.channel_id.get(), "discord message skipped");
            return;
        }
        debug!(preview = %truncate_text(&msg.content, 64), "discord message received");
        for event in events {
            info!(kind = ?event.kind(), author = %event.author.label, "discord event queued");
            self.intake.submit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use bridge_core::domain::{EventKind, MediaKind, Payload, Platform};

    use super::*;

    fn message(content: &str, attachments: &[(&str, Option<&str>)]) -> InboundMessage {
        InboundMessage {
            channel_id: 77,
            author_id: 5,
            author_label: "Bob".to_string(),
            is_bot: false,
            content: content.to_string(),
            attachments: attachments
                .iter()
                .map(|(name, mime)| AttachmentInfo {
                    url: format!("https://cdn.discordapp.com/attachments/1/2/{name}"),
                    filename: name.to_string(),
                    content_type: mime.map(str::to_string),
                })
                .collect(),
        }
    }

    #[test]
    fn text_message_becomes_one_event() {
        let events = events_from(message("hi there", &[]), 77);
        assert_eq!(events.len(), 1);
        let ev = &events[0];
        assert_eq!(ev.origin, Platform::Discord);
        assert_eq!(ev.chat, ChatRef::Discord(77));
        assert_eq!(ev.author.id, "5");
        assert_eq!(ev.kind(), EventKind::Text);
        assert_eq!(ev.attribution(), "[DS] Bob");
    }

    #[test]
    fn other_channels_and_bots_are_ignored() {
        assert!(events_from(message("hi", &[]), 78).is_empty());

        let mut from_bot = message("hi", &[]);
        from_bot.is_bot = true;
        assert!(events_from(from_bot, 77).is_empty());
    }

    #[test]
    fn blank_content_without_attachments_is_skipped() {
        assert!(events_from(message("   ", &[]), 77).is_empty());
    }

    #[test]
    fn every_attachment_is_relayed_after_the_text() {
        let events = events_from(
            message("look", &[("clip.wav", Some("audio/wav")), ("report.pdf", None)]),
            77,
        );
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Text, EventKind::VoiceNote, EventKind::GenericFile]
        );

        match &events[1].payload {
            Payload::Media { kind, media } => {
                assert_eq!(*kind, MediaKind::Voice);
                assert_eq!(media.suggested_name, "clip.wav");
                assert_eq!(media.mime_hint.as_deref(), Some("audio/wav"));
            }
            other => panic!("expected media payload, got {other:?}"),
        }
    }
}
