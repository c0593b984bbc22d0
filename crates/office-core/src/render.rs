//! Panel rendering: active entries → display payload.
//!
//! Deterministic for a given `(entries, now, zone)`; no clock reads.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::ReferenceZone;
use crate::types::{EntryState, OccupancyEntry, Transition};

pub const PANEL_TITLE: &str = "📌 Office occupancy (now)";
pub const PANEL_FOOTER: &str = "Press \"Join\" to register. Press \"Leave\" when you go.";
pub const EMPTY_MESSAGE: &str = "No one is in the office right now.";
pub const UNSET: &str = "unset";

const ACTIVE_MARKER: &str = "🟢";
const PENDING_MARKER: &str = "🕒";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelLine {
    pub user_id: String,
    pub state: EntryState,
    pub text: String,
}

/// Everything a chat platform needs to draw the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelView {
    pub title: String,
    pub lines: Vec<PanelLine>,
    pub footer: String,
    pub rendered_at: DateTime<Utc>,
}

impl PanelView {
    /// Body text: one line per entry, or the empty-state message.
    pub fn description(&self) -> String {
        if self.lines.is_empty() {
            return EMPTY_MESSAGE.to_string();
        }
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn active_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.state == EntryState::Active)
            .count()
    }
}

/// Render entries sorted ascending by effective start.
#[must_use]
pub fn render(entries: &[OccupancyEntry], now: DateTime<Utc>, zone: ReferenceZone) -> PanelView {
    let mut sorted: Vec<&OccupancyEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.user_id.cmp(&b.user_id)));

    let lines = sorted
        .into_iter()
        .map(|entry| {
            let state = entry.state(now);
            PanelLine {
                user_id: entry.user_id.clone(),
                state,
                text: format_line(entry, state, zone),
            }
        })
        .collect();

    PanelView {
        title: PANEL_TITLE.to_string(),
        lines,
        footer: PANEL_FOOTER.to_string(),
        rendered_at: now,
    }
}

fn format_line(entry: &OccupancyEntry, state: EntryState, zone: ReferenceZone) -> String {
    let marker = match state {
        EntryState::Active => ACTIVE_MARKER.to_string(),
        EntryState::Pending => format!("{PENDING_MARKER} (scheduled)"),
    };
    let end = entry
        .expected_end
        .map_or_else(|| UNSET.to_string(), |end| zone.format(end));
    let mut line = format!(
        "{marker} {} — start: {} / expected end: {end}",
        entry.display_name,
        zone.format(entry.start),
    );
    if let Some(note) = entry.note.as_deref() {
        line.push_str(" / ");
        line.push_str(note);
    }
    line
}

/// One-line log message for the notification channel.
#[must_use]
pub fn describe_transition(transition: &Transition, zone: ReferenceZone) -> String {
    match transition {
        Transition::Joined { entry } => format!(
            "🟢 {} joined at {}{}",
            entry.display_name,
            zone.format(entry.start),
            until(entry, zone),
        ),
        Transition::Scheduled { entry } => format!(
            "🕒 {} scheduled to arrive at {}{}",
            entry.display_name,
            zone.format(entry.start),
            until(entry, zone),
        ),
        Transition::Replaced { entry } => format!(
            "✏️ {} updated registration: start {}{}",
            entry.display_name,
            zone.format(entry.start),
            until(entry, zone),
        ),
        Transition::Started { entry } => format!(
            "▶️ {} is now in the office (scheduled start {})",
            entry.display_name,
            zone.format(entry.start),
        ),
        Transition::Left { history } => format!(
            "🔴 {} left ({} → {})",
            history.display_name,
            zone.format(history.start),
            zone.format(history.ended_at),
        ),
        Transition::AutoEnded { history } => format!(
            "⏹️ {} auto-ended at expected end ({} → {})",
            history.display_name,
            zone.format(history.start),
            zone.format(history.ended_at),
        ),
    }
}

fn until(entry: &OccupancyEntry, zone: ReferenceZone) -> String {
    entry
        .expected_end
        .map(|end| format!(", until {}", zone.format(end)))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
