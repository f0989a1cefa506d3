use std::fmt;

/// One side of the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Platform {
    Telegram,
    Discord,
}

impl Platform {
    /// Short attribution tag used in relayed text (`[TG]`, `[DS]`).
    pub fn tag(self) -> &'static str {
        match self {
            Platform::Telegram => "TG",
            Platform::Discord => "DS",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Platform::Telegram => "Telegram",
            Platform::Discord => "Discord",
        }
    }

    pub fn opposite(self) -> Platform {
        match self {
            Platform::Telegram => Platform::Discord,
            Platform::Discord => Platform::Telegram,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A chat (Telegram) or channel (Discord) on one side of the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatRef {
    Telegram(i64),
    Discord(u64),
}

impl ChatRef {
    pub fn platform(self) -> Platform {
        match self {
            ChatRef::Telegram(_) => Platform::Telegram,
            ChatRef::Discord(_) => Platform::Discord,
        }
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRef::Telegram(id) => write!(f, "tg:{id}"),
            ChatRef::Discord(id) => write!(f, "ds:{id}"),
        }
    }
}

/// Who posted the inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Author {
    /// Platform user id, stringified.
    pub id: String,
    /// Display name used in the attribution prefix.
    pub label: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Text,
    VoiceNote,
    GenericFile,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Voice,
    File,
}

impl MediaKind {
    /// Label used in captions and notices: `(Voice)` / `(File)`.
    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Voice => "Voice",
            MediaKind::File => "File",
        }
    }
}

/// Remote media attached to an inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRef {
    pub source_url: String,
    pub suggested_name: String,
    pub mime_hint: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Media { kind: MediaKind, media: MediaRef },
}

/// Platform-neutral inbound message; the only input of the relay dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub origin: Platform,
    pub chat: ChatRef,
    pub author: Author,
    pub payload: Payload,
}

impl NormalizedEvent {
    pub fn text(chat: ChatRef, author: Author, text: impl Into<String>) -> Self {
        Self {
            origin: chat.platform(),
            chat,
            author,
            payload: Payload::Text(text.into()),
        }
    }

    pub fn media(chat: ChatRef, author: Author, kind: MediaKind, media: MediaRef) -> Self {
        Self {
            origin: chat.platform(),
            chat,
            author,
            payload: Payload::Media { kind, media },
        }
    }

    pub fn kind(&self) -> EventKind {
        match &self.payload {
            Payload::Text(_) => EventKind::Text,
            Payload::Media {
                kind: MediaKind::Voice,
                ..
            } => EventKind::VoiceNote,
            Payload::Media {
                kind: MediaKind::File,
                ..
            } => EventKind::GenericFile,
        }
    }

    /// `[TG] Ann` style attribution, without trailing punctuation.
    pub fn attribution(&self) -> String {
        format!("[{}] {}", self.origin.tag(), self.author.label)
    }
}
