//! Shared handles for interaction handlers, the sweep loop and the health
//! endpoint.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use office_core::{Engine, OccupancyStore, StoreError};

use crate::cli::Feedback;
use crate::notify::Notifier;
use crate::platform::ChatPlatform;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn OccupancyStore>,
    pub engine: Engine,
    pub platform: Arc<dyn ChatPlatform>,
    pub notifier: Notifier,
    pub feedback: Feedback,
    pub store_timeout: Duration,
    clock: Clock,
}

impl AppContext {
    pub fn new(
        store: Arc<dyn OccupancyStore>,
        engine: Engine,
        platform: Arc<dyn ChatPlatform>,
        notifier: Notifier,
        feedback: Feedback,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            engine,
            platform,
            notifier,
            feedback,
            store_timeout,
            clock: Arc::new(Utc::now),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Run a store operation on the blocking pool, bounded by `store_timeout`.
    /// An overrun surfaces as [`StoreError::Timeout`]; the blocking call itself
    /// is left to finish in the background.
    pub async fn with_store<T, E, F>(&self, op: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
        F: FnOnce(&dyn OccupancyStore) -> Result<T, E> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let handle = tokio::task::spawn_blocking(move || op(&*store));
        match tokio::time::timeout(self.store_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(StoreError::Unavailable(format!(
                "store task failed: {join_err}"
            ))
            .into()),
            Err(_elapsed) => Err(StoreError::Timeout(self.store_timeout).into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use office_core::{ConflictPolicy, MemoryStore, ReferenceZone};

    use super::*;
    use crate::platform::fake::FakePlatform;

    /// Test harness: in-memory store, recording platform and a settable clock.
    pub struct Harness {
        pub ctx: AppContext,
        pub store: Arc<MemoryStore>,
        pub platform: Arc<FakePlatform>,
        now: Arc<Mutex<DateTime<Utc>>>,
    }

    pub fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    impl Harness {
        pub fn new(policy: ConflictPolicy, feedback: Feedback) -> Self {
            Self::with_store(Arc::new(MemoryStore::new()), policy, feedback)
        }

        pub fn with_store(
            store: Arc<MemoryStore>,
            policy: ConflictPolicy,
            feedback: Feedback,
        ) -> Self {
            let platform = Arc::new(FakePlatform::default());
            let zone = ReferenceZone::default();
            let now = Arc::new(Mutex::new(at("2026-03-02T00:00:00Z")));
            let clock_now = Arc::clone(&now);
            let ctx = AppContext::new(
                store.clone(),
                Engine::new(zone, policy),
                platform.clone(),
                Notifier::new(Some("notify".to_string()), zone),
                feedback,
                Duration::from_secs(5),
            )
            .with_clock(Arc::new(move || *clock_now.lock().unwrap()));
            Self {
                ctx,
                store,
                platform,
                now,
            }
        }

        pub fn set_now(&self, ts: DateTime<Utc>) {
            *self.now.lock().unwrap() = ts;
        }
    }
}
