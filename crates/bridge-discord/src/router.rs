use std::sync::Arc;

use anyhow::Context;
use serenity::{gateway::ShardManager, http::Http, model::gateway::GatewayIntents, Client};
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use bridge_core::lifecycle::Intake;

use crate::handlers::Handler;
use crate::DiscordMessenger;

fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
}

/// An authenticated HTTP client whose own identity is known, not yet on the
/// gateway.
pub struct DiscordClient {
    token: String,
    http: Arc<Http>,
    self_id: String,
}

impl DiscordClient {
    pub async fn connect(token: &str) -> anyhow::Result<Self> {
        let http = Arc::new(Http::new(token));
        let me = http
            .get_current_user()
            .await
            .context("discord get_current_user failed")?;
        info!(user = %me.name, "discord bot authenticated");

        Ok(Self {
            token: token.to_string(),
            http,
            self_id: me.id.get().to_string(),
        })
    }

    /// Author id the bridge itself posts under.
    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn messenger(&self) -> DiscordMessenger {
        DiscordMessenger::new(self.http.clone())
    }

    /// Connect to the gateway, feeding messages from `channel_id` into `intake`.
    pub async fn start(self, channel_id: u64, intake: Intake) -> anyhow::Result<DiscordRunner> {
        let mut client = Client::builder(&self.token, intents())
            .event_handler(Handler::new(channel_id, intake))
            .await
            .context("failed to build discord client")?;
        let shards = client.shard_manager.clone();

        // Gateway login happens in here, so its error is kept for the runner.
        let handle = tokio::spawn(async move {
            let res = client.start().await;
            match &res {
                Ok(()) => info!("discord gateway stopped"),
                Err(e) => warn!("discord gateway stopped: {e}"),
            }
            res
        });

        Ok(DiscordRunner {
            handle: Some(handle),
            shards,
        })
    }
}

pub struct DiscordRunner {
    handle: Option<JoinHandle<serenity::Result<()>>>,
    shards: Arc<ShardManager>,
}

impl DiscordRunner {
    /// Resolves when the gateway connection ends on its own, with the error
    /// that ended it, if any.
    pub async fn stopped(&mut self) -> anyhow::Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        let res = handle.await;
        self.handle = None;
        gateway_result(res)
    }

    /// Shut down every shard and wait for the client task to exit.
    pub async fn stop(mut self) -> anyhow::Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        self.shards.shutdown_all().await;
        gateway_result(handle.await)
    }
}

fn gateway_result(res: Result<serenity::Result<()>, JoinError>) -> anyhow::Result<()> {
    match res {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(anyhow::anyhow!("discord gateway failed: {e}")),
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(anyhow::anyhow!("discord gateway task failed: {e}")),
    }
}
