//! Periodic reconciliation: advance due starts, close due ends, notify
//! when something changed, and refresh panels on every tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};

use office_core::TickReport;

use crate::context::AppContext;
use crate::sync::refresh_panels;

/// Run ticks forever. A failed or panicking tick is logged and the loop
/// waits for the next period; ticks never overlap.
pub async fn run_sweep_loop(ctx: Arc<AppContext>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let tick_ctx = Arc::clone(&ctx);
        match tokio::spawn(async move { sweep_tick(&tick_ctx).await }).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!("sweep tick failed: {e:#}"),
            Err(e) => tracing::error!("sweep tick panicked: {e}"),
        }
    }
}

/// One reconciliation pass. Errors only when the active set cannot be read;
/// per-entry failures are logged and the rest of the tick proceeds.
pub async fn sweep_tick(ctx: &AppContext) -> anyhow::Result<TickReport> {
    let tick_start = std::time::Instant::now();
    let engine = ctx.engine;
    let now = ctx.now();

    let report: TickReport = ctx
        .with_store(move |store| engine.reconcile(store, now))
        .await?;

    for failure in &report.failures {
        tracing::warn!(
            user_id = %failure.user_id,
            phase = ?failure.phase,
            "reconcile failed for entry: {}",
            failure.error
        );
    }

    if !report.is_quiet() {
        ctx.notifier.emit(&*ctx.platform, &report.transitions()).await;
    }
    // Unconditional, so a panel missed by an earlier refresh catches up.
    match refresh_panels(ctx).await {
        Ok(summary) => tracing::debug!(
            updated = summary.updated,
            missing = summary.missing,
            failed = summary.failed,
            "panels refreshed"
        ),
        Err(e) => tracing::warn!("panel refresh during sweep failed: {e}"),
    }

    tracing::debug!(
        started = report.started.len(),
        ended = report.ended.len(),
        failures = report.failures.len(),
        elapsed_ms = tick_start.elapsed().as_millis() as u64,
        "sweep tick complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use office_core::{ConflictPolicy, OccupancyStore, RegisterRequest};

    use super::*;
    use crate::cli::Feedback;
    use crate::context::testing::{Harness, at};
    use crate::sync::setup_panel;

    fn join(h: &Harness, user: &str, start: Option<&str>, end: Option<&str>) {
        let req = RegisterRequest {
            user_id: user.to_string(),
            display_name: user.to_string(),
            planned_start: start.map(ToString::to_string),
            expected_end: end.map(ToString::to_string),
            note: None,
        };
        h.ctx
            .engine
            .register(&*h.store, &req, h.ctx.now())
            .unwrap();
    }

    #[tokio::test]
    async fn quiet_tick_refreshes_panels_without_notifying() {
        let h = Harness::new(ConflictPolicy::Reject, Feedback::Quiet);
        setup_panel(&h.ctx, "c1").await.unwrap();
        // Stored without the refresh an interaction would trigger.
        join(&h, "hana", None, Some("18:00"));
        assert!(h.platform.overwrites().is_empty());

        let report = sweep_tick(&h.ctx).await.unwrap();
        assert!(report.is_quiet());
        assert!(h.platform.posts_to("notify").is_empty());
        let overwrites = h.platform.overwrites();
        assert_eq!(overwrites.len(), 1);
        assert!(overwrites[0].2.embeds[0].description.contains("hana"));
    }

    #[tokio::test]
    async fn tick_starts_and_ends_due_entries() {
        let h = Harness::new(ConflictPolicy::Reject, Feedback::Quiet);
        setup_panel(&h.ctx, "c1").await.unwrap();
        join(&h, "early", None, Some("12:00"));
        join(&h, "late", Some("10:00"), None);

        h.set_now(at("2026-03-02T03:30:00Z"));
        let report = sweep_tick(&h.ctx).await.unwrap();

        assert_eq!(report.started.len(), 1);
        assert_eq!(report.started[0].user_id, "late");
        assert_eq!(report.ended.len(), 1);
        assert_eq!(report.ended[0].user_id, "early");
        assert_eq!(report.ended[0].ended_at, at("2026-03-02T03:00:00Z"));

        let notes = h.platform.posts_to("notify");
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].content.as_deref().unwrap().lines().count(), 2);
        assert_eq!(h.platform.overwrites().len(), 1);

        let remaining = h.store.entries().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].planned_start, None);
    }

    #[tokio::test]
    async fn second_tick_is_idempotent() {
        let h = Harness::new(ConflictPolicy::Reject, Feedback::Quiet);
        join(&h, "a", None, Some("10:00"));
        h.set_now(at("2026-03-02T02:00:00Z"));
        assert_eq!(sweep_tick(&h.ctx).await.unwrap().ended.len(), 1);
        assert!(sweep_tick(&h.ctx).await.unwrap().is_quiet());
        assert_eq!(h.store.history_len().unwrap(), 1);
    }

    #[tokio::test]
    async fn deleted_panel_does_not_fail_the_tick() {
        let h = Harness::new(ConflictPolicy::Reject, Feedback::Quiet);
        let binding = setup_panel(&h.ctx, "c1").await.unwrap();
        h.platform
            .deleted
            .lock()
            .unwrap()
            .insert(binding.message_id);
        join(&h, "a", None, Some("10:00"));
        h.set_now(at("2026-03-02T02:00:00Z"));

        let report = sweep_tick(&h.ctx).await.unwrap();
        assert_eq!(report.ended.len(), 1);
        assert!(h.platform.overwrites().is_empty());
    }
}
