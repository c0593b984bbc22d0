//! `office-tracker history`: most recent closed entries, newest first.

use office_core::{HistoryEntry, OccupancyStore, ReferenceZone};

use crate::config::Settings;

pub async fn cmd_history(settings: &Settings, limit: usize) -> anyhow::Result<()> {
    let settings = settings.clone();
    let zone = settings.zone;
    let history = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<HistoryEntry>> {
        Ok(settings.open_store()?.recent_history(limit)?)
    })
    .await??;

    if history.is_empty() {
        println!("no closed entries");
    } else {
        println!("{}", format_history(&history, zone));
    }
    Ok(())
}

pub(crate) fn format_history(history: &[HistoryEntry], zone: ReferenceZone) -> String {
    history
        .iter()
        .map(|h| {
            let mut line = format!(
                "{} → {}  {}",
                zone.format(h.start),
                zone.format(h.ended_at),
                h.display_name
            );
            if let Some(note) = &h.note {
                line.push_str(&format!("  ({note})"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
