use std::{path::PathBuf, sync::Arc};

use tracing::{debug, error, info, warn, Instrument};

use crate::{
    domain::{ChatRef, MediaKind, MediaRef, NormalizedEvent, Payload, Platform},
    errors::Error,
    fetcher::MediaFetcher,
    policy::{self, DestinationPolicy},
    ports::OutboundPort,
    size_guard,
    temp_store::{ArtifactScope, TempStore},
    transcoder::{AudioTranscoder, TranscodeRequest},
    Result,
};

/// One side of the bridge, as seen by the dispatcher.
#[derive(Clone)]
pub struct Endpoint {
    /// The bridged chat (Telegram) or channel (Discord).
    pub chat: ChatRef,
    /// The bridge bot's own user id on this platform, if known.
    pub self_id: Option<String>,
    pub outbound: Arc<dyn OutboundPort>,
    /// Limits and formats used when this endpoint is the destination.
    pub policy: DestinationPolicy,
}

impl Endpoint {
    pub fn platform(&self) -> Platform {
        self.chat.platform()
    }
}

/// Per-event pipeline stages, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Fetched,
    Transcoded,
    SizeChecked,
    Dispatched,
    Rejected,
    Cleaned,
}

/// How one event ended. Artifacts are always cleaned up afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Not from the bridged chat, or an echo of our own message.
    Ignored,
    Dispatched,
    /// Media over the destination ceiling; a text notice was sent instead.
    Rejected,
    /// `stage` is the stage that could not be completed.
    Failed { stage: Stage },
}

#[derive(Debug)]
struct StageError {
    stage: Stage,
    source: Error,
}

impl StageError {
    fn at(stage: Stage) -> impl FnOnce(Error) -> StageError {
        move |source| StageError { stage, source }
    }
}

/// The artifact that will actually be uploaded.
#[derive(Debug)]
struct Outgoing {
    kind: MediaKind,
    path: PathBuf,
    filename: String,
    byte_size: u64,
}

/// Relays normalized events from one platform to the other.
pub struct RelayDispatcher {
    telegram: Endpoint,
    discord: Endpoint,
    temp: Arc<TempStore>,
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Arc<dyn AudioTranscoder>,
}

impl RelayDispatcher {
    pub fn new(
        telegram: Endpoint,
        discord: Endpoint,
        temp: Arc<TempStore>,
        fetcher: Arc<dyn MediaFetcher>,
        transcoder: Arc<dyn AudioTranscoder>,
    ) -> Result<Self> {
        if telegram.platform() != Platform::Telegram || telegram.policy.platform != Platform::Telegram
        {
            return Err(Error::Config(format!(
                "telegram endpoint configured with {}",
                telegram.chat
            )));
        }
        if discord.platform() != Platform::Discord || discord.policy.platform != Platform::Discord {
            return Err(Error::Config(format!(
                "discord endpoint configured with {}",
                discord.chat
            )));
        }

        Ok(Self {
            telegram,
            discord,
            temp,
            fetcher,
            transcoder,
        })
    }

    fn endpoint(&self, platform: Platform) -> &Endpoint {
        match platform {
            Platform::Telegram => &self.telegram,
            Platform::Discord => &self.discord,
        }
    }

    /// Relay one inbound event. Never fails: every problem is logged and ends
    /// processing of this event only.
    pub async fn handle(&self, event: NormalizedEvent) -> Outcome {
        let span = tracing::info_span!(
            "relay",
            origin = %event.origin,
            kind = ?event.kind(),
            author = %event.author.label,
        );
        self.handle_inner(event).instrument(span).await
    }

    async fn handle_inner(&self, event: NormalizedEvent) -> Outcome {
        debug!(stage = ?Stage::Received, chat = %event.chat, "event received");

        if let Some(reason) = self.ignore_reason(&event) {
            debug!(reason, "event ignored");
            return Outcome::Ignored;
        }
        debug!(stage = ?Stage::Validated, "event accepted");

        let mut scope = ArtifactScope::new(self.temp.clone());
        let outcome = match self.relay(&event, &mut scope).await {
            Ok(outcome) => outcome,
            Err(StageError { stage, source }) => {
                error!(stage = ?stage, "relay abandoned: {source}");
                Outcome::Failed { stage }
            }
        };

        let artifacts = scope.len();
        scope.release_all().await;
        debug!(stage = ?Stage::Cleaned, artifacts, ?outcome, "event finished");
        outcome
    }

    fn ignore_reason(&self, event: &NormalizedEvent) -> Option<&'static str> {
        let origin = self.endpoint(event.origin);
        if event.chat != origin.chat {
            return Some("not the bridged chat");
        }
        if origin.self_id.as_deref() == Some(event.author.id.as_str()) {
            return Some("authored by the bridge itself");
        }
        None
    }

    async fn relay(
        &self,
        event: &NormalizedEvent,
        scope: &mut ArtifactScope,
    ) -> std::result::Result<Outcome, StageError> {
        let dest = self.endpoint(event.origin.opposite());

        match &event.payload {
            Payload::Text(text) => {
                let content = format!("{}: {}", event.attribution(), text);
                dest.outbound
                    .send_text(dest.chat, &content)
                    .await
                    .map_err(StageError::at(Stage::Dispatched))?;
                info!(to = %dest.platform(), "text relayed");
                Ok(Outcome::Dispatched)
            }
            Payload::Media { kind, media } => {
                self.relay_media(event, *kind, media, dest, scope).await
            }
        }
    }

    async fn relay_media(
        &self,
        event: &NormalizedEvent,
        kind: MediaKind,
        media: &MediaRef,
        dest: &Endpoint,
        scope: &mut ArtifactScope,
    ) -> std::result::Result<Outcome, StageError> {
        let original = scope.reserve(&policy::temp_extension(event.origin, kind, media));

        let fetched_bytes = self
            .fetcher
            .fetch(&media.source_url, &original)
            .await
            .map_err(|e| StageError::at(Stage::Fetched)(e.into()))?;
        debug!(stage = ?Stage::Fetched, path = %original.display(), bytes = fetched_bytes, "media downloaded");

        let as_file = |path: PathBuf| Outgoing {
            kind: MediaKind::File,
            path,
            filename: media.suggested_name.clone(),
            byte_size: fetched_bytes,
        };

        let outgoing = match kind {
            MediaKind::File => as_file(original),
            MediaKind::Voice => {
                let voice = &dest.policy.voice;
                let converted = scope.reserve(voice.extension);
                let req = TranscodeRequest {
                    input_path: original.clone(),
                    output_path: converted,
                    container: voice.container.to_string(),
                    codec: voice.codec.to_string(),
                    bitrate_kbps: voice.bitrate_kbps,
                };

                match self.transcoder.convert(req).await {
                    Ok(out) => {
                        debug!(stage = ?Stage::Transcoded, bytes = out.byte_size, "voice converted");
                        let filename = out
                            .output_path
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_else(|| format!("voice.{}", voice.extension));
                        Outgoing {
                            kind: MediaKind::Voice,
                            path: out.output_path,
                            filename,
                            byte_size: out.byte_size,
                        }
                    }
                    Err(e) => {
                        warn!(stage = ?Stage::Transcoded, "conversion failed, relaying original as a file: {e}");
                        as_file(original)
                    }
                }
            }
        };

        let label = format!("{} ({})", event.attribution(), outgoing.kind.label());

        if !size_guard::fits(outgoing.byte_size, dest.policy.max_upload_bytes) {
            warn!(
                stage = ?Stage::SizeChecked,
                bytes = outgoing.byte_size,
                ceiling = dest.policy.max_upload_bytes,
                "artifact exceeds {}'s limit",
                dest.platform()
            );
            let notice = format!("{label}: {}", dest.policy.limit_notice());
            dest.outbound
                .send_text(dest.chat, &notice)
                .await
                .map_err(StageError::at(Stage::Rejected))?;
            return Ok(Outcome::Rejected);
        }

        let caption = format!("{label}:");
        let sent = match outgoing.kind {
            MediaKind::Voice => {
                dest.outbound
                    .send_voice(dest.chat, &outgoing.path, &caption)
                    .await
            }
            MediaKind::File => {
                dest.outbound
                    .send_file(dest.chat, &outgoing.path, &outgoing.filename, &caption)
                    .await
            }
        };
        sent.map_err(StageError::at(Stage::Dispatched))?;

        info!(
            to = %dest.platform(),
            kind = outgoing.kind.label(),
            bytes = outgoing.byte_size,
            "media relayed"
        );
        Ok(Outcome::Dispatched)
    }
}
