//! Occupancy engine: registration, deregistration and the reconciliation tick.
//!
//! Stateless over an [`OccupancyStore`]. Each operation returns the
//! transitions it caused so the caller can notify and re-render.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{ReferenceZone, whole_seconds};
use crate::store::{OccupancyStore, StoreError};
use crate::types::{HistoryEntry, OccupancyEntry, Transition};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown conflict policy: {0}")]
    UnknownPolicy(String),

    /// A stale entry was closed, then storing the new one failed. The close
    /// is durable, so its transitions are still owed to the caller.
    #[error("registration interrupted after closing a stale entry: {source}")]
    Interrupted {
        source: StoreError,
        transitions: Vec<Transition>,
    },
}

impl EngineError {
    /// Transitions that were persisted before the error.
    pub fn transitions(&self) -> &[Transition] {
        match self {
            Self::Interrupted { transitions, .. } => transitions,
            _ => &[],
        }
    }
}

// ─── Policy ───────────────────────────────────────────────────────

/// What to do when a user registers while already holding an entry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Leave the existing entry untouched and report `AlreadyActive`.
    #[default]
    Reject,
    /// Overwrite every field of the existing entry.
    Replace,
}

impl ConflictPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Replace => "replace",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "replace" | "upsert" => Ok(Self::Replace),
            other => Err(EngineError::UnknownPolicy(other.to_string())),
        }
    }
}

// ─── Requests & outcomes ──────────────────────────────────────────

/// Raw join request as submitted by the user. Time fields are unparsed text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterRequest {
    pub user_id: String,
    pub display_name: String,
    pub planned_start: Option<String>,
    pub expected_end: Option<String>,
    pub note: Option<String>,
}

/// A time field that was supplied but could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeField {
    PlannedStart,
    ExpectedEnd,
}

impl TimeField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlannedStart => "planned start",
            Self::ExpectedEnd => "expected end",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered { entry: OccupancyEntry, replaced: bool },
    AlreadyActive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub outcome: RegisterOutcome,
    /// Fields dropped as malformed. The registration still proceeds without them.
    pub ignored: Vec<TimeField>,
    pub transitions: Vec<Transition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deregistration {
    Left { history: HistoryEntry },
    NotRegistered,
}

/// Which pass of the tick a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    Start,
    End,
}

#[derive(Debug)]
pub struct EntryFailure {
    pub user_id: String,
    pub phase: TickPhase,
    pub error: StoreError,
}

/// Result of one reconciliation tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub started: Vec<OccupancyEntry>,
    pub ended: Vec<HistoryEntry>,
    pub failures: Vec<EntryFailure>,
}

impl TickReport {
    /// Nothing changed; there is nothing to announce.
    pub fn is_quiet(&self) -> bool {
        self.started.is_empty() && self.ended.is_empty()
    }

    /// Starts first, then auto-ends, in processing order.
    pub fn transitions(&self) -> Vec<Transition> {
        self.started
            .iter()
            .map(|entry| Transition::Started {
                entry: entry.clone(),
            })
            .chain(self.ended.iter().map(|history| Transition::AutoEnded {
                history: history.clone(),
            }))
            .collect()
    }
}

// ─── Engine ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct Engine {
    zone: ReferenceZone,
    policy: ConflictPolicy,
}

impl Engine {
    pub fn new(zone: ReferenceZone, policy: ConflictPolicy) -> Self {
        Self { zone, policy }
    }

    pub fn zone(&self) -> ReferenceZone {
        self.zone
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Register a user's presence.
    ///
    /// A prior entry already past its expected end is closed first (as an
    /// auto-end) so a stale record never blocks a fresh join.
    pub fn register<S: OccupancyStore + ?Sized>(
        &self,
        store: &S,
        request: &RegisterRequest,
        now: DateTime<Utc>,
    ) -> Result<Registration, EngineError> {
        let now = whole_seconds(now);
        let mut ignored = Vec::new();
        let mut transitions = Vec::new();

        let planned_start = self.resolve_field(
            request.planned_start.as_deref(),
            TimeField::PlannedStart,
            now,
            &mut ignored,
        );
        let expected_end = self.resolve_field(
            request.expected_end.as_deref(),
            TimeField::ExpectedEnd,
            now,
            &mut ignored,
        );

        let mut existing = store.entry(&request.user_id)?;
        if existing.as_ref().is_some_and(|e| e.is_due_to_end(now)) {
            existing = match store.expire_entry(&request.user_id, now)? {
                Some(history) => {
                    transitions.push(Transition::AutoEnded { history });
                    None
                }
                // Changed under us; take whatever is stored now.
                None => store.entry(&request.user_id)?,
            };
        }

        let entry = match planned_start {
            Some(planned) if planned > now => OccupancyEntry {
                user_id: request.user_id.clone(),
                display_name: request.display_name.clone(),
                start: planned,
                planned_start: Some(planned),
                expected_end,
                note: normalize_note(request.note.as_deref()),
            },
            _ => OccupancyEntry {
                user_id: request.user_id.clone(),
                display_name: request.display_name.clone(),
                start: now,
                planned_start: None,
                expected_end,
                note: normalize_note(request.note.as_deref()),
            },
        };

        let replaced = match self.write_entry(store, &entry, existing.is_some()) {
            Ok(Some(replaced)) => replaced,
            Ok(None) => {
                return Ok(Registration {
                    outcome: RegisterOutcome::AlreadyActive,
                    ignored,
                    transitions,
                });
            }
            Err(source) if !transitions.is_empty() => {
                return Err(EngineError::Interrupted {
                    source,
                    transitions,
                });
            }
            Err(source) => return Err(source.into()),
        };

        transitions.push(if replaced {
            Transition::Replaced {
                entry: entry.clone(),
            }
        } else if entry.planned_start.is_some() {
            Transition::Scheduled {
                entry: entry.clone(),
            }
        } else {
            Transition::Joined {
                entry: entry.clone(),
            }
        });

        Ok(Registration {
            outcome: RegisterOutcome::Registered { entry, replaced },
            ignored,
            transitions,
        })
    }

    /// Store `entry` under the conflict policy. `Some(replaced)` when written,
    /// `None` when an existing entry was kept.
    fn write_entry<S: OccupancyStore + ?Sized>(
        &self,
        store: &S,
        entry: &OccupancyEntry,
        exists: bool,
    ) -> Result<Option<bool>, StoreError> {
        match (exists, self.policy) {
            (true, ConflictPolicy::Reject) => Ok(None),
            (true, ConflictPolicy::Replace) => {
                store.upsert_entry(entry)?;
                Ok(Some(true))
            }
            (false, _) => {
                if store.insert_entry(entry)? {
                    Ok(Some(false))
                } else if self.policy == ConflictPolicy::Replace {
                    // Lost a race with a concurrent join.
                    store.upsert_entry(entry)?;
                    Ok(Some(true))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Close the user's entry with `ended_at = now`.
    pub fn deregister<S: OccupancyStore + ?Sized>(
        &self,
        store: &S,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Deregistration, EngineError> {
        match store.archive_entry(user_id, whole_seconds(now))? {
            Some(history) => Ok(Deregistration::Left { history }),
            None => Ok(Deregistration::NotRegistered),
        }
    }

    /// Advance elapsed starts, then close elapsed ends.
    ///
    /// Fails only when the active set cannot be listed. A failure on a single
    /// entry is recorded in the report and the remaining entries are processed.
    pub fn reconcile<S: OccupancyStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
    ) -> Result<TickReport, EngineError> {
        let entries = store.entries()?;
        let mut report = TickReport::default();

        for entry in entries.iter().filter(|e| e.is_due_to_start(now)) {
            match store.activate_entry(&entry.user_id, now) {
                Ok(true) => report.started.push(OccupancyEntry {
                    planned_start: None,
                    ..entry.clone()
                }),
                Ok(false) => {}
                Err(error) => report.failures.push(EntryFailure {
                    user_id: entry.user_id.clone(),
                    phase: TickPhase::Start,
                    error,
                }),
            }
        }

        // The store re-checks each end against the row it holds, so an entry
        // re-registered since the snapshot is not closed.
        for entry in entries.iter().filter(|e| e.is_due_to_end(now)) {
            match store.expire_entry(&entry.user_id, now) {
                Ok(Some(history)) => report.ended.push(history),
                Ok(None) => {}
                Err(error) => report.failures.push(EntryFailure {
                    user_id: entry.user_id.clone(),
                    phase: TickPhase::End,
                    error,
                }),
            }
        }

        Ok(report)
    }

    fn resolve_field(
        &self,
        text: Option<&str>,
        field: TimeField,
        now: DateTime<Utc>,
        ignored: &mut Vec<TimeField>,
    ) -> Option<DateTime<Utc>> {
        let text = text.map(str::trim).filter(|t| !t.is_empty())?;
        let resolved = self.zone.resolve_time_of_day(text, now);
        if resolved.is_none() {
            ignored.push(field);
        }
        resolved
    }
}

fn normalize_note(note: Option<&str>) -> Option<String> {
    note.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(ToString::to_string)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
