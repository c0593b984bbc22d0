use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Occupancy ────────────────────────────────────────────────────

/// Lifecycle state of an occupancy entry relative to a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// Start is scheduled in the future.
    Pending,
    /// Holder is considered present.
    Active,
}

impl EntryState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user's presence record. At most one exists per `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyEntry {
    pub user_id: String,
    /// Display name captured at registration time.
    pub display_name: String,
    /// Effective start: the planned start when scheduled, else registration time.
    pub start: DateTime<Utc>,
    pub planned_start: Option<DateTime<Utc>>,
    pub expected_end: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl OccupancyEntry {
    /// Pending while `planned_start` is set and still in the future.
    #[must_use]
    pub fn state(&self, now: DateTime<Utc>) -> EntryState {
        match self.planned_start {
            Some(planned) if planned > now => EntryState::Pending,
            _ => EntryState::Active,
        }
    }

    /// `planned_start` is set and has elapsed; the sweep should clear it.
    #[must_use]
    pub fn is_due_to_start(&self, now: DateTime<Utc>) -> bool {
        self.planned_start.is_some_and(|planned| planned <= now)
    }

    /// `expected_end` is set and has elapsed; the sweep should close the entry.
    #[must_use]
    pub fn is_due_to_end(&self, now: DateTime<Utc>) -> bool {
        self.expected_end.is_some_and(|end| end <= now)
    }

    /// Closed record for this entry, ending at `ended_at`.
    #[must_use]
    pub fn close(&self, ended_at: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            start: self.start,
            ended_at,
            note: self.note.clone(),
        }
    }
}

/// Write-once record of a closed occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_id: String,
    pub display_name: String,
    pub start: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Channel → panel message association. Holds no rendered content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PanelBinding {
    pub channel_id: String,
    pub message_id: String,
}

// ─── Transitions ──────────────────────────────────────────────────

/// A state change emitted by the engine, consumed by the notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    /// Registered and immediately active.
    Joined { entry: OccupancyEntry },
    /// Registered with a future start.
    Scheduled { entry: OccupancyEntry },
    /// An existing entry was overwritten by a re-registration.
    Replaced { entry: OccupancyEntry },
    /// Manual leave.
    Left { history: HistoryEntry },
    /// Scheduled start elapsed.
    Started { entry: OccupancyEntry },
    /// Expected end elapsed.
    AutoEnded { history: HistoryEntry },
}

impl Transition {
    pub fn user_id(&self) -> &str {
        match self {
            Self::Joined { entry }
            | Self::Scheduled { entry }
            | Self::Replaced { entry }
            | Self::Started { entry } => &entry.user_id,
            Self::Left { history } | Self::AutoEnded { history } => &history.user_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Joined { .. } => "joined",
            Self::Scheduled { .. } => "scheduled",
            Self::Replaced { .. } => "replaced",
            Self::Left { .. } => "left",
            Self::Started { .. } => "started",
            Self::AutoEnded { .. } => "auto_ended",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
