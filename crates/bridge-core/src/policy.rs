//! Per-destination media policy: preferred voice format, upload ceiling, and
//! how inbound attachments are classified and named.

use std::path::Path;

use crate::{
    config::Config,
    domain::{MediaKind, MediaRef, Platform},
};

/// Discord attachments with these extensions are treated as voice notes.
const DISCORD_VOICE_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a"];

/// Target voice format for one destination platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceFormat {
    pub container: &'static str,
    pub codec: &'static str,
    pub extension: &'static str,
    pub bitrate_kbps: u32,
}

impl VoiceFormat {
    /// Voice format a destination prefers.
    ///
    /// Discord plays mp3 attachments inline; Telegram voice messages must be
    /// OGG/Opus.
    pub fn for_destination(dest: Platform, bitrate_kbps: u32) -> Self {
        match dest {
            Platform::Discord => Self {
                container: "mp3",
                codec: "libmp3lame",
                extension: "mp3",
                bitrate_kbps,
            },
            Platform::Telegram => Self {
                container: "ogg",
                codec: "libopus",
                extension: "ogg",
                bitrate_kbps,
            },
        }
    }
}

/// What a destination accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestinationPolicy {
    pub platform: Platform,
    pub max_upload_bytes: u64,
    pub voice: VoiceFormat,
}

impl DestinationPolicy {
    pub fn from_config(dest: Platform, cfg: &Config) -> Self {
        let max_upload_bytes = match dest {
            Platform::Telegram => cfg.telegram_max_upload_bytes,
            Platform::Discord => cfg.discord_max_upload_bytes,
        };
        Self {
            platform: dest,
            max_upload_bytes,
            voice: VoiceFormat::for_destination(dest, cfg.voice_bitrate_kbps),
        }
    }

    /// `File size exceeds Discord's limit.`
    pub fn limit_notice(&self) -> String {
        format!("File size exceeds {}'s limit.", self.platform.display_name())
    }
}

/// Voice note or plain file, for a Discord attachment name.
pub fn classify_discord_attachment(filename: &str) -> MediaKind {
    match extension_of(filename) {
        Some(ext) if DISCORD_VOICE_EXTENSIONS.contains(&ext.as_str()) => MediaKind::Voice,
        _ => MediaKind::File,
    }
}

/// Extension for the scratch copy of downloaded media.
///
/// Order: the mime hint, then the origin platform's default for the kind,
/// then the suggested file name, then `bin`.
pub fn temp_extension(origin: Platform, kind: MediaKind, media: &MediaRef) -> String {
    media
        .mime_hint
        .as_deref()
        .and_then(extension_from_mime)
        .or_else(|| default_extension(origin, kind).map(str::to_string))
        .or_else(|| extension_of(&media.suggested_name))
        .unwrap_or_else(|| "bin".to_string())
}

fn default_extension(origin: Platform, kind: MediaKind) -> Option<&'static str> {
    match (origin, kind) {
        // Telegram voice messages are OGG/Opus even when no mime type is sent.
        (Platform::Telegram, MediaKind::Voice) => Some("ogg"),
        _ => None,
    }
}

fn extension_from_mime(mime: &str) -> Option<String> {
    let essence = mime.split(';').next()?.trim().to_ascii_lowercase();
    let ext = match essence.as_str() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => "m4a",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" | "audio/opus" => "ogg",
        other => other.rsplit('/').next().filter(|s| is_safe_extension(s))?,
    };
    Some(ext.to_string())
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| is_safe_extension(e))
}

fn is_safe_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(name: &str, mime: Option<&str>) -> MediaRef {
        MediaRef {
            source_url: "https://example.invalid/x".to_string(),
            suggested_name: name.to_string(),
            mime_hint: mime.map(str::to_string),
        }
    }

    #[test]
    fn direction_table() {
        let to_discord = VoiceFormat::for_destination(Platform::Discord, 64);
        assert_eq!(
            (to_discord.container, to_discord.codec, to_discord.extension),
            ("mp3", "libmp3lame", "mp3")
        );
        let to_telegram = VoiceFormat::for_destination(Platform::Telegram, 64);
        assert_eq!(
            (to_telegram.container, to_telegram.codec, to_telegram.extension),
            ("ogg", "libopus", "ogg")
        );
        assert_eq!(to_telegram.bitrate_kbps, 64);
    }

    #[test]
    fn discord_voice_extensions() {
        for name in ["clip.wav", "a.MP3", "x.ogg", "memo.m4a"] {
            assert_eq!(classify_discord_attachment(name), MediaKind::Voice, "{name}");
        }
        for name in ["report.pdf", "song.flac", "noext", "clip.wav.zip"] {
            assert_eq!(classify_discord_attachment(name), MediaKind::File, "{name}");
        }
    }

    #[test]
    fn temp_extension_prefers_mime_then_default_then_name() {
        assert_eq!(
            temp_extension(Platform::Telegram, MediaKind::Voice, &media("v", Some("audio/ogg"))),
            "ogg"
        );
        assert_eq!(
            temp_extension(Platform::Telegram, MediaKind::Voice, &media("v.x", Some("audio/mpeg"))),
            "mp3"
        );
        assert_eq!(
            temp_extension(Platform::Telegram, MediaKind::Voice, &media("v.m4a", None)),
            "ogg"
        );
        assert_eq!(
            temp_extension(Platform::Discord, MediaKind::Voice, &media("clip.WAV", None)),
            "wav"
        );
        assert_eq!(
            temp_extension(Platform::Discord, MediaKind::File, &media("README", None)),
            "bin"
        );
        assert_eq!(
            temp_extension(
                Platform::Telegram,
                MediaKind::File,
                &media("doc.pdf", Some("application/pdf; charset=binary"))
            ),
            "pdf"
        );
        // Unusable mime subtypes fall through to the name.
        assert_eq!(
            temp_extension(
                Platform::Telegram,
                MediaKind::File,
                &media("sheet.xlsx", Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"))
            ),
            "xlsx"
        );
    }

    #[test]
    fn limit_notice_names_destination() {
        let p = DestinationPolicy {
            platform: Platform::Discord,
            max_upload_bytes: 1,
            voice: VoiceFormat::for_destination(Platform::Discord, 64),
        };
        assert_eq!(p.limit_notice(), "File size exceeds Discord's limit.");
    }
}
