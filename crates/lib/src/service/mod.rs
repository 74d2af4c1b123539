//! Process wiring: build the relay and broadcaster from config, run them, tear them down.
//!
//! [`startup`] takes already-constructed collaborators and never touches the network itself, so
//! tests can drive the whole service with fakes. [`run`] wires the real Telegram and OpenAI
//! clients and blocks until SIGINT/SIGTERM.

mod dispatch;

use crate::broadcast::Broadcaster;
use crate::channels::{ChannelHandle, InboundMessage, TelegramChannel};
use crate::config::RelayConfig;
use crate::filter::ChannelFilter;
use crate::generator::ResponseGenerator;
use crate::llm::{LlmBackend, OpenAiClient};
use crate::relay::InboundRelay;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const INBOUND_CAPACITY: usize = 64;

/// Running relay tasks. Dropping this without [`RunningHandle::shutdown`] leaves them running.
pub struct RunningHandle {
    shutdown: CancellationToken,
    dispatcher: JoinHandle<()>,
    broadcaster: Option<JoinHandle<u64>>,
}

impl RunningHandle {
    pub fn is_broadcasting(&self) -> bool {
        self.broadcaster.is_some()
    }

    /// Cancel the broadcaster and the dispatcher, abandon in-flight generations, and wait for every task.
    pub async fn shutdown(self) {
        log::info!("relay: shutting down");
        self.shutdown.cancel();
        if let Err(e) = self.dispatcher.await {
            log::error!("relay: dispatcher task failed: {}", e);
        }
        if let Some(handle) = self.broadcaster {
            match handle.await {
                Ok(cycles) => log::info!("relay: broadcaster ran {} cycles", cycles),
                Err(e) => log::error!("relay: broadcaster task failed: {}", e),
            }
        }
        log::info!("relay: stopped");
    }
}

/// Spawn the inbound dispatcher and, when configured, the broadcaster. Must run inside a Tokio runtime.
pub fn startup(
    config: &RelayConfig,
    outbound: Arc<dyn ChannelHandle>,
    backend: Arc<dyn LlmBackend>,
    inbound_rx: mpsc::Receiver<InboundMessage>,
) -> RunningHandle {
    let shutdown = CancellationToken::new();
    let relay = InboundRelay::new(
        ChannelFilter::new(config.allowed_conversation_id.clone()),
        ResponseGenerator::new(backend, config.request_timeout),
        outbound.clone(),
        config.persona.clone(),
        config.fallback_reply.clone(),
    );
    let dispatcher = tokio::spawn(dispatch::run_dispatcher(relay, inbound_rx, shutdown.clone()));
    let broadcaster = config
        .broadcast
        .as_ref()
        .map(|b| Broadcaster::new(outbound, b).start(shutdown.child_token()));
    match config.allowed_conversation_id {
        Some(ref id) => log::info!("relay: answering messages in {}", id),
        None => log::info!("relay: answering messages in all conversations"),
    }
    RunningHandle {
        shutdown,
        dispatcher,
        broadcaster,
    }
}

/// Run the relay against Telegram and the OpenAI API until a shutdown signal arrives.
pub async fn run(config: RelayConfig) -> Result<()> {
    let telegram = Arc::new(TelegramChannel::new(Some(config.bot_token.clone())));
    let bot_name = telegram
        .get_me()
        .await
        .context("verifying telegram bot token")?;
    log::info!("telegram: authenticated as {}", bot_name);

    let backend = Arc::new(OpenAiClient::new(
        config.base_url.clone(),
        config.api_key.clone(),
        config.model.clone(),
    ));
    log::info!("llm: using model {}", backend.model());

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
    let handle = startup(&config, telegram.clone(), backend, inbound_rx);
    let poller = telegram.clone().start_inbound(inbound_tx);

    shutdown_signal().await;
    log::info!("shutdown signal received, stopping relay");
    telegram.stop();
    handle.shutdown().await;
    // A getUpdates long poll may still be pending; nothing it returns would be processed now.
    poller.abort();
    let _ = poller.await;
    log::info!("telegram channel stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
