use std::{process::ExitCode, sync::Arc};

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use bridge_core::{
    config::Config,
    dispatcher::{Endpoint, RelayDispatcher},
    domain::Platform,
    fetcher::HttpFetcher,
    lifecycle::Intake,
    policy::DestinationPolicy,
    temp_store::TempStore,
    transcoder::FfmpegTranscoder,
};
use bridge_discord::DiscordClient;
use bridge_telegram::TelegramClient;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = bridge_core::logging::init("bridge") {
        eprintln!("failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("bridge stopped with an error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cfg = Config::load().context("invalid configuration")?;

    let temp = Arc::new(TempStore::new(&cfg.temp_dir).context("failed to prepare temp dir")?);
    let transcoder = Arc::new(FfmpegTranscoder::new(&cfg.ffmpeg_path));
    match transcoder.probe().await {
        Ok(version) => info!(ffmpeg = %transcoder.binary().display(), "{version}"),
        // Text and file relays still work without ffmpeg.
        Err(e) => warn!(ffmpeg = %transcoder.binary().display(), "ffmpeg unavailable: {e}"),
    }
    let fetcher = Arc::new(HttpFetcher::new()?);

    let telegram = TelegramClient::connect(&cfg.telegram_token)
        .await
        .context("failed to connect to telegram")?;
    let discord = DiscordClient::connect(&cfg.discord_token)
        .await
        .context("failed to connect to discord")?;

    let dispatcher = RelayDispatcher::new(
        Endpoint {
            chat: cfg.telegram_chat(),
            self_id: Some(telegram.self_id().to_string()),
            outbound: Arc::new(telegram.messenger()),
            policy: DestinationPolicy::from_config(Platform::Telegram, &cfg),
        },
        Endpoint {
            chat: cfg.discord_channel(),
            self_id: Some(discord.self_id().to_string()),
            outbound: Arc::new(discord.messenger()),
            policy: DestinationPolicy::from_config(Platform::Discord, &cfg),
        },
        temp,
        fetcher,
        transcoder,
    )?;

    let shutdown = CancellationToken::new();
    let intake = Intake::new(Arc::new(dispatcher), shutdown.clone());

    let mut telegram = telegram.start(cfg.telegram_chat_id, intake.clone());
    let mut discord = match discord.start(cfg.discord_channel_id, intake.clone()).await {
        Ok(runner) => runner,
        Err(e) => {
            shutdown.cancel();
            telegram.stop().await?;
            return Err(e);
        }
    };
    info!(
        telegram_chat = cfg.telegram_chat_id,
        discord_channel = cfg.discord_channel_id,
        "bridge running"
    );

    let cause = tokio::select! {
        _ = shutdown_signal() => StopCause::Signal,
        res = telegram.stopped() => StopCause::adapter(Platform::Telegram, res),
        res = discord.stopped() => StopCause::adapter(Platform::Discord, res),
    };
    match &cause {
        StopCause::Signal => info!("shutdown signal received"),
        StopCause::AdapterExited { platform, .. } => warn!("{platform} adapter exited"),
    }

    shutdown.cancel();
    let telegram_stop = telegram.stop().await;
    let discord_stop = discord.stop().await;
    info!(in_flight = intake.in_flight(), "waiting for in-flight relays");
    intake.drain().await;
    info!("all in-flight relays finished");

    exit_status(&cause)?;
    telegram_stop?;
    discord_stop?;
    Ok(())
}

/// What ended the main wait.
#[derive(Debug)]
enum StopCause {
    Signal,
    AdapterExited {
        platform: Platform,
        error: Option<String>,
    },
}

impl StopCause {
    fn adapter(platform: Platform, res: anyhow::Result<()>) -> Self {
        StopCause::AdapterExited {
            platform,
            error: res.err().map(|e| format!("{e:#}")),
        }
    }
}

/// Only a shutdown signal is a clean exit; an adapter stopping by itself means
/// half the bridge is gone.
fn exit_status(cause: &StopCause) -> anyhow::Result<()> {
    match cause {
        StopCause::Signal => Ok(()),
        StopCause::AdapterExited {
            platform,
            error: Some(e),
        } => Err(anyhow::anyhow!("{platform} adapter failed: {e}")),
        StopCause::AdapterExited {
            platform,
            error: None,
        } => Err(anyhow::anyhow!("{platform} adapter exited unexpectedly")),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_is_the_only_clean_exit() {
        assert!(exit_status(&StopCause::Signal).is_ok());
    }

    #[test]
    fn adapter_failure_is_fatal_and_keeps_the_cause() {
        let cause = StopCause::adapter(
            Platform::Discord,
            Err(anyhow::anyhow!("discord gateway failed: Disallowed gateway intents")),
        );
        let err = exit_status(&cause).unwrap_err().to_string();
        assert!(err.contains("Discord adapter failed"), "{err}");
        assert!(err.contains("Disallowed gateway intents"), "{err}");
    }

    #[test]
    fn adapter_exiting_cleanly_is_still_fatal() {
        let cause = StopCause::adapter(Platform::Telegram, Ok(()));
        let err = exit_status(&cause).unwrap_err().to_string();
        assert_eq!(err, "Telegram adapter exited unexpectedly");
    }
}
