//! Supervisor: accept loop, session lifecycle, heartbeat, shutdown.
//!
//! Owns the listening socket and the session registry. Every loop iteration
//! that accepts a connection also reaps finished sessions; a periodic tick
//! reaps even when no connections arrive. Shutdown (SIGINT/SIGTERM) stops
//! accepting, joins every remaining worker, and releases the backing file.

use crate::config::ServerConfig;
use crate::device::CommandDevice;
use crate::registry::{SessionHandle, SessionRegistry};
use crate::ring::Entry;
use crate::session;
use crate::store::BackingStore;
use anyhow::{Context, Result};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Seconds between reap passes when no connections arrive.
const REAP_INTERVAL_SECS: u64 = 5;

/// Everything the supervisor and the session workers share. Constructed once
/// at startup, torn down at shutdown drain; there is no global state.
pub struct ServerContext {
    pub config: ServerConfig,
    pub device: CommandDevice,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let store = match &config.log_file {
            Some(path) => Some(BackingStore::create(path)?),
            None => None,
        };
        let device = CommandDevice::new(config.capacity, config.max_line_bytes, store);
        Ok(Self { config, device })
    }
}

/// Binds the listener and serves until a termination signal arrives.
pub async fn run(ctx: Arc<ServerContext>) -> Result<()> {
    let listener = TcpListener::bind((ctx.config.bind_addr.as_str(), ctx.config.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                ctx.config.bind_addr, ctx.config.port
            )
        })?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });

    serve_until_shutdown(ctx, listener, shutdown_rx).await
}

/// Accept/reap loop. Split from [`run`] so tests can drive it with their own
/// listener and shutdown channel.
pub async fn serve_until_shutdown(
    ctx: Arc<ServerContext>,
    listener: TcpListener,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let local_addr = listener.local_addr().context("Listener has no local address")?;
    tracing::info!(%local_addr, "listening");

    let mut registry = SessionRegistry::new();
    // Workers select on this alongside their reads so shutdown drain never
    // blocks on a client that stays connected.
    let (session_shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut reap_tick = tokio::time::interval(Duration::from_secs(REAP_INTERVAL_SECS));
    let mut heartbeat_tick = tokio::time::interval(Duration::from_secs(
        ctx.config.heartbeat.interval_secs.max(1),
    ));

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tracing::info!(%peer, "accepted connection");
                        let completed = Arc::new(AtomicBool::new(false));
                        let handle = tokio::spawn(session::run(
                            ctx.clone(),
                            stream,
                            peer,
                            completed.clone(),
                            session_shutdown_tx.subscribe(),
                        ));
                        registry.insert(Uuid::new_v4(), SessionHandle { completed, handle });
                    }
                    Err(error) => tracing::warn!(%error, "accept failed"),
                }
                registry.reap().await;
            }
            _ = reap_tick.tick() => {
                registry.reap().await;
            }
            _ = heartbeat_tick.tick(), if ctx.config.heartbeat.enabled => {
                registry.reap().await;
                // The heartbeat only runs while at least one session is live.
                if !registry.is_empty() {
                    append_heartbeat(&ctx).await;
                }
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("caught termination signal, exiting");
                break;
            }
        }
    }

    let _ = session_shutdown_tx.send(());
    registry.drain().await;
    ctx.device.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Appends a timestamped line to the log like any other write.
async fn append_heartbeat(ctx: &ServerContext) {
    let line = format!(
        "timestamp:{}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    if let Err(error) = ctx.device.append(Entry::new(line.into_bytes())).await {
        tracing::warn!(%error, "heartbeat append failed");
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to create SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
