//! In-process response cache with TTL and calendar-day invalidation.

use crate::time::calendar::CalendarZone;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug, Clone)]
pub struct FixedClock {
    millis: Arc<AtomicI64>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(at.timestamp_millis())),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Brand, date range, the caller's zone and current calendar day in that zone.
pub fn metrics_cache_key(
    brand_id: &str,
    from: NaiveDate,
    to: NaiveDate,
    zone: &CalendarZone,
    day: NaiveDate,
    scope: Option<&str>,
) -> String {
    format!(
        "metrics:{brand_id}:{from}:{to}:{zone}:{day}:{}",
        scope.unwrap_or("all")
    )
}

struct Entry<V> {
    value: V,
    stored_at: DateTime<Utc>,
    ttl: Duration,
    boundary: CalendarZone,
    stored_day: NaiveDate,
}

impl<V> Entry<V> {
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let elapsed = (now - self.stored_at).to_std().unwrap_or_default();
        elapsed >= self.ttl || self.boundary.local_date(now) != self.stored_day
    }
}

pub struct ResponseCache<V> {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone + Send> ResponseCache<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| !e.is_stale(now))
            .map(|e| e.value.clone())
    }

    pub async fn insert(&self, key: impl Into<String>, value: V, ttl: Duration, boundary: CalendarZone) {
        let now = self.clock.now();
        let entry = Entry {
            value,
            stored_at: now,
            ttl,
            boundary,
            stored_day: boundary.local_date(now),
        };
        self.entries.lock().await.insert(key.into(), entry);
    }

    /// Cached value unless the TTL elapsed or `boundary`'s calendar day changed since it was
    /// stored. Errors from `compute` are returned and not cached.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        compute: F,
        ttl: Duration,
        boundary: CalendarZone,
    ) -> anyhow::Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        if let Some(hit) = self.get(key).await {
            tracing::debug!(key, "response cache hit");
            return Ok(hit);
        }
        let value = compute().await?;
        self.insert(key, value.clone(), ttl, boundary).await;
        Ok(value)
    }

    /// Drops stale entries; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_stale(now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;

    const TTL: Duration = Duration::from_secs(300);

    fn utc() -> CalendarZone {
        CalendarZone::Named(chrono_tz::UTC)
    }

    async fn counted(
        cache: &ResponseCache<usize>,
        calls: &AtomicUsize,
        zone: CalendarZone,
    ) -> usize {
        cache
            .get_or_compute(
                "k",
                || async { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) },
                TTL,
                zone,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn reuses_until_ttl_elapses() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        let cache = ResponseCache::new(Arc::new(clock.clone()));
        let calls = AtomicUsize::new(0);

        assert_eq!(counted(&cache, &calls, utc()).await, 1);
        clock.advance(Duration::from_secs(299));
        assert_eq!(counted(&cache, &calls, utc()).await, 1);
        clock.advance(Duration::from_secs(1));
        assert_eq!(counted(&cache, &calls, utc()).await, 2);
    }

    #[tokio::test]
    async fn invalidates_at_calendar_boundary_before_ttl() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 23, 58, 0).unwrap());
        let cache = ResponseCache::new(Arc::new(clock.clone()));
        let calls = AtomicUsize::new(0);

        assert_eq!(counted(&cache, &calls, utc()).await, 1);
        clock.advance(Duration::from_secs(180));
        assert_eq!(counted(&cache, &calls, utc()).await, 2);
    }

    #[tokio::test]
    async fn boundary_is_the_callers_zone() {
        // 23:58 UTC is 19:58 in New York; crossing UTC midnight is not a New York day change.
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 23, 58, 0).unwrap());
        let cache = ResponseCache::new(Arc::new(clock.clone()));
        let calls = AtomicUsize::new(0);
        let ny = CalendarZone::Named(chrono_tz::America::New_York);

        assert_eq!(counted(&cache, &calls, ny).await, 1);
        clock.advance(Duration::from_secs(180));
        assert_eq!(counted(&cache, &calls, ny).await, 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        let cache: ResponseCache<usize> = ResponseCache::new(Arc::new(clock));
        let err = cache
            .get_or_compute("k", || async { Err(anyhow::anyhow!("store down")) }, TTL, utc())
            .await;
        assert!(err.is_err());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn purge_drops_only_stale_entries() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        let cache = ResponseCache::new(Arc::new(clock.clone()));
        cache.insert("short", 1, Duration::from_secs(10), utc()).await;
        cache.insert("long", 2, Duration::from_secs(600), utc()).await;

        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.get("long").await, Some(2));
        assert_eq!(cache.get("short").await, None);
    }

    #[test]
    fn key_includes_zone_day_and_scope() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 5, day).unwrap();
        let utc = CalendarZone::Named(chrono_tz::UTC);
        let ny = CalendarZone::Named(chrono_tz::America::New_York);
        let a = metrics_cache_key("b1", d(1), d(7), &utc, d(7), None);
        let b = metrics_cache_key("b1", d(1), d(7), &utc, d(8), None);
        let c = metrics_cache_key("b1", d(1), d(7), &utc, d(7), Some("c9"));
        let e = metrics_cache_key("b1", d(1), d(7), &ny, d(7), None);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, e);
    }
}
