use std::{sync::Arc, time::Duration};

use anyhow::Context;
use teloxide::{
    dispatching::{Dispatcher, ShutdownToken},
    dptree,
    prelude::*,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use bridge_core::lifecycle::Intake;

use crate::handlers;
use crate::TelegramMessenger;

/// Long polling holds requests open, so the client timeout has to exceed the
/// polling timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Shared by every update handler.
pub struct BridgeState {
    pub chat_id: i64,
    pub intake: Intake,
}

/// A connected bot whose own identity is known, not yet polling.
pub struct TelegramClient {
    bot: Bot,
    self_id: String,
}

impl TelegramClient {
    pub async fn connect(token: &str) -> anyhow::Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build telegram http client")?;
        let bot = Bot::with_client(token, client);

        let me = bot.get_me().await.context("telegram getMe failed")?;
        info!(username = %me.username(), "telegram bot authenticated");

        Ok(Self {
            bot,
            self_id: me.user.id.0.to_string(),
        })
    }

    /// Author id the bridge itself posts under.
    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn messenger(&self) -> TelegramMessenger {
        TelegramMessenger::new(self.bot.clone())
    }

    /// Start long polling, feeding messages from `chat_id` into `intake`.
    pub fn start(self, chat_id: i64, intake: Intake) -> TelegramRunner {
        let state = Arc::new(BridgeState { chat_id, intake });

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(handlers::handle_message));

        let mut dispatcher = Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![state])
            .default_handler(|upd| async move {
                debug!(update_id = ?upd.id, "unhandled telegram update");
            })
            .build();
        let shutdown = dispatcher.shutdown_token();

        let handle = tokio::spawn(async move {
            dispatcher.dispatch().await;
            info!("telegram dispatcher stopped");
        });

        TelegramRunner {
            handle: Some(handle),
            shutdown,
        }
    }
}

pub struct TelegramRunner {
    handle: Option<JoinHandle<()>>,
    shutdown: ShutdownToken,
}

impl TelegramRunner {
    /// Resolves when polling ends on its own. An error means the dispatcher
    /// task itself failed.
    pub async fn stopped(&mut self) -> anyhow::Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        let res = handle.await;
        self.handle = None;
        res.map_err(|e| {
            warn!("telegram dispatcher task failed: {e}");
            anyhow::anyhow!("telegram dispatcher task failed: {e}")
        })
    }

    /// Stop polling and wait for the dispatcher to exit.
    pub async fn stop(mut self) -> anyhow::Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match self.shutdown.shutdown() {
            Ok(done) => done.await,
            Err(_) => {
                // Not dispatching yet (or anymore); nothing to drain.
                handle.abort();
            }
        }

        match handle.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(anyhow::anyhow!("telegram dispatcher task failed: {e}")),
        }
    }
}
