//! `run`: gateway session, interaction workers, sweep loop and health
//! endpoint in one process, until ctrl-c or SIGTERM.

use std::sync::Arc;

use tokio::sync::mpsc;

use office_core::Engine;
use office_discord::{Gateway, INTENT_GUILDS, RestClient};

use crate::config::Settings;
use crate::context::AppContext;
use crate::handlers::handle_interaction;
use crate::notify::Notifier;
use crate::server::run_server;
use crate::sweep::run_sweep_loop;

const INTERACTION_QUEUE: usize = 64;

pub async fn run_bot(settings: &Settings) -> anyhow::Result<()> {
    let token = settings.token()?;

    let store = {
        let settings = settings.clone();
        tokio::task::spawn_blocking(move || settings.open_store()).await??
    };
    let rest = RestClient::new(token, settings.store_timeout)?;

    let ctx = Arc::new(AppContext::new(
        Arc::new(store),
        Engine::new(settings.zone, settings.policy),
        Arc::new(rest.clone()),
        Notifier::new(settings.notify_channel.clone(), settings.zone),
        settings.feedback,
        settings.store_timeout,
    ));
    tracing::info!(
        policy = %settings.policy,
        feedback = ?settings.feedback,
        notify = ctx.notifier.is_enabled(),
        "office tracker starting"
    );

    let gateway = match rest.gateway_url().await {
        Ok(url) => Gateway::new(token, INTENT_GUILDS).with_url(url),
        Err(e) => {
            tracing::warn!("gateway url lookup failed, using default: {e}");
            Gateway::new(token, INTENT_GUILDS)
        }
    };

    let (tx, mut rx) = mpsc::channel(INTERACTION_QUEUE);
    let gateway_handle = tokio::spawn(async move { gateway.run(tx).await });

    let worker_ctx = Arc::clone(&ctx);
    let dispatch_handle = tokio::spawn(async move {
        while let Some(interaction) = rx.recv().await {
            let ctx = Arc::clone(&worker_ctx);
            tokio::spawn(async move { handle_interaction(&ctx, interaction).await });
        }
    });

    let sweep_handle = tokio::spawn(run_sweep_loop(Arc::clone(&ctx), settings.sweep_interval));

    let server_ctx = Arc::clone(&ctx);
    let port = settings.port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = run_server(port, server_ctx).await {
            tracing::error!("health endpoint error: {e}");
        }
    });

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => tokio::select! {
                    _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                },
                Err(e) => {
                    tracing::warn!("SIGTERM handler unavailable: {e}");
                    ctrl_c.await.ok();
                    tracing::info!("received ctrl-c, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            tracing::info!("received ctrl-c, shutting down");
        }
    };

    tokio::select! {
        () = shutdown => {}
        _ = gateway_handle => tracing::warn!("gateway exited unexpectedly"),
        _ = dispatch_handle => tracing::warn!("interaction dispatch exited unexpectedly"),
        _ = sweep_handle => tracing::warn!("sweep loop exited unexpectedly"),
        _ = server_handle => tracing::warn!("health endpoint exited unexpectedly"),
    }

    tracing::info!("office tracker stopped");
    Ok(())
}
