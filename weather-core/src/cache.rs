//! In-memory, per-city memoization of normalized series with single-flight fetches.
//!
//! Each city owns a slot guarded by its own lock, so unrelated cities never
//! contend. A slot holds at most one cached entry and at most one in-flight
//! fetch; every caller that arrives while a fetch is running awaits that same
//! fetch and receives the same result, success or failure.
//!
//! The fetch itself runs as a detached task. A caller that gives up waiting
//! does not abort it, so the slot is either updated whole or left untouched.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{
    error::FetchError,
    model::{CityQuery, FetchResult, UnitSystem, WeatherSeries},
    normalize::normalize,
    provider::WeatherProvider,
};

type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// A successfully fetched series and when it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub series: Arc<WeatherSeries>,
    pub fetched_at: DateTime<Utc>,
    pub ttl: Duration,
    stored_at: Instant,
}

impl CacheEntry {
    fn new(series: Arc<WeatherSeries>, ttl: Duration) -> Self {
        Self {
            series,
            fetched_at: Utc::now(),
            ttl,
            stored_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    /// Fresh while younger than `ttl`; a zero ttl is never fresh.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

#[derive(Default)]
struct Slot {
    entry: Option<CacheEntry>,
    inflight: Option<SharedFetch>,
}

pub struct FetchCache {
    provider: Arc<dyn WeatherProvider>,
    unit_system: UnitSystem,
    slots: Mutex<HashMap<CityQuery, Arc<Mutex<Slot>>>>,
}

impl fmt::Debug for FetchCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchCache")
            .field("provider", &self.provider)
            .field("unit_system", &self.unit_system)
            .field("entries", &self.len())
            .finish()
    }
}

impl FetchCache {
    pub fn new(provider: Arc<dyn WeatherProvider>, unit_system: UnitSystem) -> Self {
        Self {
            provider,
            unit_system,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, query: &CityQuery) -> Arc<Mutex<Slot>> {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(query.clone()).or_default())
    }

    /// Return the cached series when younger than `ttl`, otherwise fetch,
    /// normalize and install a new entry. Failures are never cached.
    pub async fn get_or_fetch(&self, query: &CityQuery, ttl: Duration) -> FetchResult {
        let fetch = {
            let slot_ref = self.slot(query);
            let mut slot = slot_ref.lock();

            if let Some(entry) = slot.entry.as_ref().filter(|e| e.is_fresh(ttl)) {
                tracing::debug!(city = %query, age = ?entry.age(), "cache hit");
                return Ok(Arc::clone(&entry.series));
            }

            match slot.inflight.clone() {
                Some(inflight) => {
                    tracing::debug!(city = %query, "joining in-flight fetch");
                    inflight
                }
                None => {
                    tracing::debug!(city = %query, "cache miss, fetching");
                    let inflight = self.start_fetch(query.clone(), ttl, Arc::clone(&slot_ref));
                    slot.inflight = Some(inflight.clone());
                    inflight
                }
            }
        };

        fetch.await
    }

    fn start_fetch(&self, query: CityQuery, ttl: Duration, slot: Arc<Mutex<Slot>>) -> SharedFetch {
        let provider = Arc::clone(&self.provider);
        let units = self.unit_system;
        let task_slot = Arc::clone(&slot);

        let handle = tokio::spawn(async move {
            let result = fetch_series(provider.as_ref(), &query, units).await;

            let mut slot = task_slot.lock();
            slot.inflight = None;
            if let Ok(series) = &result {
                slot.entry = Some(CacheEntry::new(Arc::clone(series), ttl));
            }
            result
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => {
                    slot.lock().inflight = None;
                    if err.is_cancelled() {
                        Err(FetchError::Cancelled)
                    } else {
                        Err(FetchError::Network(format!("fetch task failed: {err}")))
                    }
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Peek at the stored entry without fetching, regardless of age.
    pub fn entry(&self, query: &CityQuery) -> Option<CacheEntry> {
        let slot = self.slots.lock().get(query).cloned()?;
        let entry = slot.lock().entry.clone();
        entry
    }

    /// Drop the stored entry. An in-flight fetch is left to finish.
    pub fn invalidate(&self, query: &CityQuery) {
        let mut slots = self.slots.lock();
        let idle = match slots.get(query) {
            Some(slot) => {
                slot.lock().entry = None;
                is_idle(slot)
            }
            None => false,
        };
        if idle {
            slots.remove(query);
        }
    }

    pub fn clear(&self) {
        self.slots.lock().retain(|_, slot| {
            slot.lock().entry = None;
            !is_idle(slot)
        });
    }

    /// Number of cities with a stored entry.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.lock().entry.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }
}

/// No entry, no fetch running and no caller holding the slot. Only valid while
/// the slot map is locked, since that is the only way to obtain a new handle.
fn is_idle(slot: &Arc<Mutex<Slot>>) -> bool {
    if Arc::strong_count(slot) > 1 {
        return false;
    }
    let slot = slot.lock();
    slot.entry.is_none() && slot.inflight.is_none()
}

async fn fetch_series(
    provider: &dyn WeatherProvider,
    query: &CityQuery,
    units: UnitSystem,
) -> FetchResult {
    let raw = provider.fetch(query).await?;
    let series = normalize(query, units, &raw)?;
    Ok(Arc::new(series))
}
