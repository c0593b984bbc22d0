//! Panel lifecycle: post, bind, refresh and unbind.

use office_core::{OccupancyStore, PanelBinding, PanelView, StoreError, render};

use crate::context::AppContext;
use crate::panel::panel_message;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    pub updated: usize,
    /// Bound messages that no longer exist. Left bound; nothing is re-posted.
    pub missing: usize,
    pub failed: usize,
}

/// Fresh read of the active set rendered at the context clock.
pub async fn current_view(ctx: &AppContext) -> Result<PanelView, StoreError> {
    let now = ctx.now();
    let zone = ctx.engine.zone();
    ctx.with_store(move |store| Ok(render(&store.entries()?, now, zone)))
        .await
}

/// Overwrite every bound panel with the current state. One render is
/// shared by all panels; a failure on one panel does not stop the others.
pub async fn refresh_panels(ctx: &AppContext) -> Result<RefreshSummary, StoreError> {
    let (view, bindings) = {
        let now = ctx.now();
        let zone = ctx.engine.zone();
        ctx.with_store(move |store| {
            let view = render(&store.entries()?, now, zone);
            Ok::<_, StoreError>((view, store.panels()?))
        })
        .await?
    };

    let payload = panel_message(&view);
    let mut summary = RefreshSummary::default();
    for binding in &bindings {
        match ctx
            .platform
            .overwrite_message(&binding.channel_id, &binding.message_id, &payload)
            .await
        {
            Ok(()) => summary.updated += 1,
            Err(e) if e.is_not_found() => {
                tracing::debug!(
                    channel_id = %binding.channel_id,
                    message_id = %binding.message_id,
                    "panel message is gone, skipping"
                );
                summary.missing += 1;
            }
            Err(e) => {
                tracing::warn!(channel_id = %binding.channel_id, "panel refresh failed: {e}");
                summary.failed += 1;
            }
        }
    }
    Ok(summary)
}

/// Post a new panel in `channel_id` and bind it, replacing any previous
/// binding for that channel. Returns the new binding.
pub async fn setup_panel(ctx: &AppContext, channel_id: &str) -> anyhow::Result<PanelBinding> {
    let view = current_view(ctx).await?;
    let message_id = ctx
        .platform
        .post_message(channel_id, &panel_message(&view))
        .await?;
    let binding = PanelBinding {
        channel_id: channel_id.to_string(),
        message_id,
    };
    let stored = binding.clone();
    ctx.with_store(move |store| store.bind_panel(&stored)).await?;
    tracing::info!(channel_id, message_id = %binding.message_id, "panel bound");
    Ok(binding)
}

/// Forget the channel's panel. The posted message itself is left alone.
pub async fn remove_panel(ctx: &AppContext, channel_id: &str) -> Result<bool, StoreError> {
    let channel = channel_id.to_string();
    let removed = ctx
        .with_store(move |store| store.unbind_panel(&channel))
        .await?;
    if removed {
        tracing::info!(channel_id, "panel unbound");
    }
    Ok(removed)
}
