//! Persistence contract for occupancy entries, history and panel bindings.
//!
//! The engine relies on the store, not in-process locking, for consistency:
//! every method is a single atomic operation. [`MemoryStore`] is the
//! reference implementation used by tests and dry runs.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{HistoryEntry, OccupancyEntry, PanelBinding};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("corrupt record {key}: {detail}")]
    Corrupt { key: String, detail: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Record sets: active entries keyed by user, panel bindings keyed by
/// channel, append-only history.
pub trait OccupancyStore: Send + Sync {
    fn entry(&self, user_id: &str) -> StoreResult<Option<OccupancyEntry>>;

    /// All active-set entries, ascending by `start`.
    fn entries(&self) -> StoreResult<Vec<OccupancyEntry>>;

    /// Insert if no entry exists for the user. Returns `false` on conflict.
    fn insert_entry(&self, entry: &OccupancyEntry) -> StoreResult<bool>;

    /// Insert or overwrite every field of the user's entry.
    fn upsert_entry(&self, entry: &OccupancyEntry) -> StoreResult<()>;

    /// Clear `planned_start` if it is at or before `now`. Returns `false` when
    /// nothing was cleared.
    fn activate_entry(&self, user_id: &str, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Append a history record ending at `ended_at` and delete the entry, atomically.
    /// Returns `None` when there was nothing to close.
    fn archive_entry(
        &self,
        user_id: &str,
        ended_at: DateTime<Utc>,
    ) -> StoreResult<Option<HistoryEntry>>;

    /// Archive the entry at its own `expected_end`, only if that end is at or
    /// before `now`. The check and the move are one atomic step, so an entry
    /// re-registered since the caller last read it is left alone.
    fn expire_entry(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<HistoryEntry>>;

    /// Most recent closures first.
    fn recent_history(&self, limit: usize) -> StoreResult<Vec<HistoryEntry>>;

    fn history_len(&self) -> StoreResult<usize>;

    /// Create or replace the binding for `binding.channel_id`.
    fn bind_panel(&self, binding: &PanelBinding) -> StoreResult<()>;

    /// Returns `false` if the channel had no binding.
    fn unbind_panel(&self, channel_id: &str) -> StoreResult<bool>;

    fn panel(&self, channel_id: &str) -> StoreResult<Option<PanelBinding>>;

    fn panels(&self) -> StoreResult<Vec<PanelBinding>>;
}

macro_rules! delegate_store {
    ($ty:ty) => {
        impl<T: OccupancyStore + ?Sized> OccupancyStore for $ty {
            fn entry(&self, user_id: &str) -> StoreResult<Option<OccupancyEntry>> {
                (**self).entry(user_id)
            }
            fn entries(&self) -> StoreResult<Vec<OccupancyEntry>> {
                (**self).entries()
            }
            fn insert_entry(&self, entry: &OccupancyEntry) -> StoreResult<bool> {
                (**self).insert_entry(entry)
            }
            fn upsert_entry(&self, entry: &OccupancyEntry) -> StoreResult<()> {
                (**self).upsert_entry(entry)
            }
            fn activate_entry(&self, user_id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
                (**self).activate_entry(user_id, now)
            }
            fn archive_entry(
                &self,
                user_id: &str,
                ended_at: DateTime<Utc>,
            ) -> StoreResult<Option<HistoryEntry>> {
                (**self).archive_entry(user_id, ended_at)
            }
            fn expire_entry(
                &self,
                user_id: &str,
                now: DateTime<Utc>,
            ) -> StoreResult<Option<HistoryEntry>> {
                (**self).expire_entry(user_id, now)
            }
            fn recent_history(&self, limit: usize) -> StoreResult<Vec<HistoryEntry>> {
                (**self).recent_history(limit)
            }
            fn history_len(&self) -> StoreResult<usize> {
                (**self).history_len()
            }
            fn bind_panel(&self, binding: &PanelBinding) -> StoreResult<()> {
                (**self).bind_panel(binding)
            }
            fn unbind_panel(&self, channel_id: &str) -> StoreResult<bool> {
                (**self).unbind_panel(channel_id)
            }
            fn panel(&self, channel_id: &str) -> StoreResult<Option<PanelBinding>> {
                (**self).panel(channel_id)
            }
            fn panels(&self) -> StoreResult<Vec<PanelBinding>> {
                (**self).panels()
            }
        }
    };
}

delegate_store!(&T);
delegate_store!(Arc<T>);

/// Sort entries the way every store must return them.
pub fn sort_entries(entries: &mut [OccupancyEntry]) {
    entries.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.user_id.cmp(&b.user_id)));
}

// ─── In-memory store ──────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryInner {
    entries: BTreeMap<String, OccupancyEntry>,
    history: Vec<HistoryEntry>,
    panels: BTreeMap<String, PanelBinding>,
}

/// Mutex-guarded in-process store. Not persistent.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl OccupancyStore for MemoryStore {
    fn entry(&self, user_id: &str) -> StoreResult<Option<OccupancyEntry>> {
        Ok(self.lock()?.entries.get(user_id).cloned())
    }

    fn entries(&self) -> StoreResult<Vec<OccupancyEntry>> {
        let mut entries: Vec<_> = self.lock()?.entries.values().cloned().collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn insert_entry(&self, entry: &OccupancyEntry) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        if inner.entries.contains_key(&entry.user_id) {
            return Ok(false);
        }
        inner.entries.insert(entry.user_id.clone(), entry.clone());
        Ok(true)
    }

    fn upsert_entry(&self, entry: &OccupancyEntry) -> StoreResult<()> {
        self.lock()?
            .entries
            .insert(entry.user_id.clone(), entry.clone());
        Ok(())
    }

    fn activate_entry(&self, user_id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        Ok(match inner.entries.get_mut(user_id) {
            Some(entry) if entry.planned_start.is_some_and(|planned| planned <= now) => {
                entry.planned_start = None;
                true
            }
            _ => false,
        })
    }

    fn archive_entry(
        &self,
        user_id: &str,
        ended_at: DateTime<Utc>,
    ) -> StoreResult<Option<HistoryEntry>> {
        let mut inner = self.lock()?;
        let Some(entry) = inner.entries.remove(user_id) else {
            return Ok(None);
        };
        let closed = entry.close(ended_at);
        inner.history.push(closed.clone());
        Ok(Some(closed))
    }

    fn expire_entry(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<HistoryEntry>> {
        let mut inner = self.lock()?;
        let Some(end) = inner
            .entries
            .get(user_id)
            .and_then(|entry| entry.expected_end)
            .filter(|end| *end <= now)
        else {
            return Ok(None);
        };
        let Some(entry) = inner.entries.remove(user_id) else {
            return Ok(None);
        };
        let closed = entry.close(end);
        inner.history.push(closed.clone());
        Ok(Some(closed))
    }

    fn recent_history(&self, limit: usize) -> StoreResult<Vec<HistoryEntry>> {
        Ok(self
            .lock()?
            .history
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    fn history_len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.history.len())
    }

    fn bind_panel(&self, binding: &PanelBinding) -> StoreResult<()> {
        self.lock()?
            .panels
            .insert(binding.channel_id.clone(), binding.clone());
        Ok(())
    }

    fn unbind_panel(&self, channel_id: &str) -> StoreResult<bool> {
        Ok(self.lock()?.panels.remove(channel_id).is_some())
    }

    fn panel(&self, channel_id: &str) -> StoreResult<Option<PanelBinding>> {
        Ok(self.lock()?.panels.get(channel_id).cloned())
    }

    fn panels(&self) -> StoreResult<Vec<PanelBinding>> {
        Ok(self.lock()?.panels.values().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
