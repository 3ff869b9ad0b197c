//! muxgramd, the bridge daemon binary.
//!
//! Bootstraps configuration, store, IPC server, Telegram adapter and
//! router; runs the event loop until a signal or fatal store error; then
//! shuts down in order: stop accepting IPC, stop the long-poll, flush
//! in-flight work best-effort, unlink the socket, release the PID lock,
//! close the store.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use anyhow::Context;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use muxgram_config::BridgeConfig;
use muxgram_daemon::{reaper, Router};
use muxgram_inject::{Multiplexer, TmuxMultiplexer};
use muxgram_ipc::IpcServer;
use muxgram_store::SessionStore;
use muxgram_telegram::{TelegramChat, TelegramListener};

fn init_tracing(config: &BridgeConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "warn,muxgram_core=info,muxgram_config=info,muxgram_store=info,\
             muxgram_ipc=info,muxgram_inject=info,muxgram_telegram=info,\
             muxgram_daemon=info,muxgramd=info",
        )
    });
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    if config.debug_log {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.paths.debug_log)
            .with_context(|| format!("open {}", config.paths.debug_log.display()))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BridgeConfig::from_env().context("configuration")?;
    config.paths.ensure_dirs().context("runtime directory")?;
    init_tracing(&config)?;

    let store = Arc::new(
        SessionStore::open(&config.paths.store)
            .with_context(|| format!("open store {}", config.paths.store.display()))?,
    );

    let shutdown = CancellationToken::new();
    let (events_tx, mut events_rx) = mpsc::channel(256);
    let server = IpcServer::bind(
        &config.paths.socket,
        &config.paths.pid_file,
        events_tx,
        shutdown.clone(),
    )
    .await
    .context("bind ipc server")?;
    let broadcaster = server.broadcaster();

    let bot = teloxide::Bot::new(config.bot_token.clone());
    let chat = Arc::new(TelegramChat::new(bot.clone(), config.chat_id));
    let mux: Arc<dyn Multiplexer> = Arc::new(TmuxMultiplexer::new());

    // Best-effort: note a CLI pane on the default server. The
    // authoritative mapping always comes from event metadata.
    if let Ok(Some(target)) = mux.discover().await {
        info!(target = %target, "discovered a CLI pane on the default server");
    }

    let (chat_tx, mut chat_rx) = mpsc::channel(64);
    let listener = TelegramListener::spawn(bot, config.chat_id, chat_tx);

    let router = Router::new(config.clone(), store, chat, mux, broadcaster);
    router.recover().await.context("recover sessions")?;
    let ipc_task = tokio::spawn(server.run());
    let reaper_task = tokio::spawn(reaper::run(
        router.clone(),
        reaper::REAPER_PERIOD,
        shutdown.clone(),
    ));

    info!(
        socket = %config.paths.socket.display(),
        store = %config.paths.store.display(),
        chat_id = config.chat_id,
        use_threads = config.use_threads,
        "bridge daemon running"
    );

    let mut sigterm = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "signal handler failed");
                }
                info!("interrupt received; shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received; shutting down");
                break;
            }
            () = shutdown.cancelled() => {
                // A fatal error elsewhere (reaper store failure) cancelled us.
                break;
            }
            envelope = events_rx.recv() => match envelope {
                Some(envelope) => {
                    if let Err(e) = router.handle_event(envelope).await {
                        error!(error = %e, "fatal store error in event handler");
                        break;
                    }
                }
                None => break,
            },
            update = chat_rx.recv() => match update {
                Some(update) => {
                    if let Err(e) = router.handle_chat(update).await {
                        error!(error = %e, "fatal store error in chat handler");
                        break;
                    }
                }
                None => break,
            },
        }
    }

    // Shutdown order: stop accepting IPC, stop the long-poll, then wait
    // for the workers. Socket unlink and PID release happen as the server
    // task finishes; the store closes when its last Arc drops.
    shutdown.cancel();
    listener.stop().await;
    let _ = ipc_task.await;
    let _ = reaper_task.await;
    info!("shutdown complete");
    Ok(())
}
