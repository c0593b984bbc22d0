//! `office-tracker status`: print the panel as it would render right now.

use chrono::Utc;

use office_core::{OccupancyStore, PanelView, render};

use crate::config::Settings;

pub async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let settings = settings.clone();
    let view = tokio::task::spawn_blocking(move || -> anyhow::Result<PanelView> {
        let store = settings.open_store()?;
        Ok(render(&store.entries()?, Utc::now(), settings.zone))
    })
    .await??;

    println!("{}", format_status(&view));
    Ok(())
}

pub(crate) fn format_status(view: &PanelView) -> String {
    format!(
        "{}\n\n{}\n\n{} active, {} scheduled",
        view.title,
        view.description(),
        view.active_count(),
        view.lines.len() - view.active_count()
    )
}
