/// Content cache: keeps the last good snapshot and decides when to go back to the source.
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::content::{ContentSnapshot, ContentSource, FetchError};

/// What the cache currently holds
#[derive(Debug, Clone, Default)]
pub enum CacheEntry {
    /// No fetch has ever succeeded
    #[default]
    Empty,
    Filled {
        snapshot: Arc<ContentSnapshot>,
        fetched_at: Instant,
    },
}

impl CacheEntry {
    /// Time since the last successful fetch. Never negative.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        match self {
            CacheEntry::Empty => None,
            CacheEntry::Filled { fetched_at, .. } => Some(now.saturating_duration_since(*fetched_at)),
        }
    }

    pub fn snapshot(&self) -> Option<&Arc<ContentSnapshot>> {
        match self {
            CacheEntry::Empty => None,
            CacheEntry::Filled { snapshot, .. } => Some(snapshot),
        }
    }
}

pub struct ContentCache<S> {
    source: S,
    ttl: Duration,
    fetch_timeout: Duration,
    entry: CacheEntry,
    /// Credential rejection hidden behind the fallback snapshot
    rejection: Option<FetchError>,
    /// Consecutive fetches rejected for credentials
    rejected_streak: u32,
}

impl<S: ContentSource> ContentCache<S> {
    /// `ttl` of zero refetches on every call
    pub fn new(source: S, ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            source,
            ttl,
            fetch_timeout,
            entry: CacheEntry::Empty,
            rejection: None,
            rejected_streak: 0,
        }
    }

    /// Return fresh content, going to the source only when the entry is missing, stale or
    /// `force` is set. A failed fetch falls back to the previous snapshot when there is one;
    /// a credential rejection behind that fallback is kept for [`Self::take_rejection`].
    pub async fn get(&mut self, force: bool) -> Result<Arc<ContentSnapshot>, FetchError> {
        if !force {
            if let CacheEntry::Filled { snapshot, fetched_at } = &self.entry {
                let age = Instant::now().saturating_duration_since(*fetched_at);
                if age < self.ttl {
                    debug!(
                        "Serving cached {} content captured {} ({}s old)",
                        self.source.name(),
                        snapshot.captured_at().format("%H:%M"),
                        age.as_secs()
                    );
                    return Ok(snapshot.clone());
                }
            }
        }

        let fetched = match time::timeout(self.fetch_timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.fetch_timeout)),
        };

        match fetched {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.entry = CacheEntry::Filled {
                    snapshot: snapshot.clone(),
                    fetched_at: Instant::now(),
                };
                self.rejection = None;
                self.rejected_streak = 0;
                info!("Fetched fresh {} content", self.source.name());
                Ok(snapshot)
            }
            Err(e) => {
                if e.is_auth() {
                    self.rejected_streak += 1;
                } else {
                    self.rejected_streak = 0;
                }
                match self.entry.snapshot().cloned() {
                    Some(previous) => {
                        warn!(
                            "Fetch from {} failed ({}), keeping last good content",
                            self.source.name(),
                            e
                        );
                        self.rejection = e.is_auth().then_some(e);
                        Ok(previous)
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Credential rejection from the last `get`, if it was hidden behind old content
    pub fn take_rejection(&mut self) -> Option<FetchError> {
        self.rejection.take()
    }

    /// Fetches rejected for credentials in a row, reset by any other outcome
    pub fn rejected_streak(&self) -> u32 {
        self.rejected_streak
    }

    /// Reload the source's credentials, bounded like a fetch
    pub async fn reauthenticate(&mut self) -> Result<(), FetchError> {
        match time::timeout(self.fetch_timeout, self.source.authenticate()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.fetch_timeout)),
        }
    }

    /// Last good snapshot, without touching the source
    pub fn current(&self) -> Option<Arc<ContentSnapshot>> {
        self.entry.snapshot().cloned()
    }

    pub fn entry(&self) -> &CacheEntry {
        &self.entry
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Give the source back, dropping the cached content
    pub fn into_source(self) -> S {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::mock::ScriptedSource;
    use chrono::NaiveDate;
    use std::sync::atomic::Ordering;

    fn snapshot(temp: &str) -> ContentSnapshot {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        ContentSnapshot::new(at).with_field("temperature", temp)
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_within_ttl_fetches_once() {
        let source = ScriptedSource::new(|n| Ok(snapshot(&format!("{n}"))));
        let fetches = source.fetch_counter();
        let mut cache = ContentCache::new(source, 60 * MINUTE, 30 * MINUTE);

        let first = cache.get(false).await.unwrap();
        time::advance(59 * MINUTE).await;
        let second = cache.get(false).await.unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_refetches() {
        let source = ScriptedSource::new(|n| Ok(snapshot(&format!("{n}"))));
        let fetches = source.fetch_counter();
        let mut cache = ContentCache::new(source, 60 * MINUTE, MINUTE);

        cache.get(false).await.unwrap();
        time::advance(60 * MINUTE).await;
        let second = cache.get(false).await.unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert_eq!(second.field("temperature").unwrap().to_string(), "1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_always_fetches() {
        let source = ScriptedSource::new(|_| Ok(snapshot("20")));
        let fetches = source.fetch_counter();
        let mut cache = ContentCache::new(source, Duration::ZERO, MINUTE);

        for _ in 0..3 {
            cache.get(false).await.unwrap();
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_bypasses_ttl() {
        let source = ScriptedSource::new(|_| Ok(snapshot("20")));
        let fetches = source.fetch_counter();
        let mut cache = ContentCache::new(source, 60 * MINUTE, MINUTE);

        cache.get(false).await.unwrap();
        cache.get(true).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_falls_back_to_previous() {
        let source = ScriptedSource::new(|n| match n {
            0 => Ok(snapshot("18")),
            _ => Err(FetchError::Auth("server answered 401".into())),
        });
        let mut cache = ContentCache::new(source, Duration::ZERO, MINUTE);

        let good = cache.get(false).await.unwrap();
        assert!(cache.take_rejection().is_none());
        let fallback = cache.get(false).await.unwrap();
        assert!(Arc::ptr_eq(&good, &fallback));
        assert!(matches!(cache.take_rejection(), Some(FetchError::Auth(_))));
        assert!(cache.take_rejection().is_none());
        assert_eq!(cache.rejected_streak(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_streak_resets() {
        let source = ScriptedSource::new(|n| match n {
            1 | 2 | 4 => Err(FetchError::Auth("server answered 401".into())),
            3 => Err(FetchError::Network("unreachable".into())),
            _ => Ok(snapshot("18")),
        });
        let mut cache = ContentCache::new(source, Duration::ZERO, MINUTE);

        let mut streaks = Vec::new();
        for _ in 0..6 {
            cache.get(false).await.unwrap();
            streaks.push(cache.rejected_streak());
        }
        assert_eq!(streaks, vec![0, 1, 2, 0, 1, 0]);
        assert!(cache.take_rejection().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reauthenticate_reaches_source() {
        let source = ScriptedSource::new(|_| Ok(snapshot("18")))
            .with_auth(|n| match n {
                0 => Err(FetchError::NotConfigured("token file missing".into())),
                _ => Ok(()),
            });
        let auths = source.auth_counter();
        let mut cache = ContentCache::new(source, Duration::ZERO, MINUTE);

        assert!(cache.reauthenticate().await.unwrap_err().is_auth());
        assert!(cache.reauthenticate().await.is_ok());
        assert_eq!(auths.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_without_history_is_error() {
        let source = ScriptedSource::new(|_| Err(FetchError::Status(500)));
        let mut cache = ContentCache::new(source, Duration::ZERO, MINUTE);

        assert!(matches!(cache.get(false).await, Err(FetchError::Status(500))));
        assert!(cache.current().is_none());
        assert!(cache.entry().age(Instant::now()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_times_out() {
        let source = ScriptedSource::new(|_| Ok(snapshot("20"))).with_delay(2 * MINUTE);
        let mut cache = ContentCache::new(source, Duration::ZERO, MINUTE);

        assert!(matches!(cache.get(false).await, Err(FetchError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_does_not_reset_age() {
        let source = ScriptedSource::new(|n| match n {
            0 => Ok(snapshot("18")),
            _ => Err(FetchError::Network("unreachable".into())),
        });
        let fetches = source.fetch_counter();
        let mut cache = ContentCache::new(source, 10 * MINUTE, MINUTE);

        cache.get(false).await.unwrap();
        time::advance(10 * MINUTE).await;
        cache.get(false).await.unwrap();
        cache.get(false).await.unwrap();

        // both post-expiry calls went back to the source
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
        assert!(cache.entry().age(Instant::now()).unwrap() >= 10 * MINUTE);
    }
}
