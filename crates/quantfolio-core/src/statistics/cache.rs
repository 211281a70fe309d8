use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;
use tracing::debug;

use crate::QuantfolioResult;

use super::covariance::CovarianceMatrix;
use super::moments::ReturnFrequency;

/// Identifies the data a cached covariance matrix was estimated from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CovarianceKey {
    pub universe: Vec<String>,
    pub lookback: usize,
    pub window_end: Option<NaiveDate>,
    /// Annualisation applied to historical returns, when there is one.
    pub frequency: Option<ReturnFrequency>,
}

impl CovarianceKey {
    pub fn new(universe: Vec<String>, lookback: usize, window_end: Option<NaiveDate>) -> Self {
        CovarianceKey {
            universe,
            lookback,
            window_end,
            frequency: None,
        }
    }

    pub fn with_frequency(mut self, frequency: ReturnFrequency) -> Self {
        self.frequency = Some(frequency);
        self
    }
}

/// Covariance cache shared between readers, one entry per key.
///
/// Entries are immutable `Arc` snapshots. A miss builds the matrix outside
/// the lock and installs it in one write, so a reader sees a whole matrix or
/// none. When two writers race on the same key the first installed matrix
/// wins and both callers get it.
#[derive(Debug, Default)]
pub struct CovarianceCache {
    entries: RwLock<HashMap<CovarianceKey, Arc<CovarianceMatrix>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CovarianceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached matrix for `key`.
    pub fn get(&self, key: &CovarianceKey) -> Option<Arc<CovarianceMatrix>> {
        // Entries are immutable, so a poisoned lock still holds valid ones
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        guard.get(key).map(Arc::clone)
    }

    /// Return the cached matrix for `key`, or compute and install it.
    pub fn get_or_compute<F>(
        &self,
        key: CovarianceKey,
        compute: F,
    ) -> QuantfolioResult<Arc<CovarianceMatrix>>
    where
        F: FnOnce() -> QuantfolioResult<CovarianceMatrix>,
    {
        if let Some(matrix) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(lookback = key.lookback, window_end = ?key.window_end, "covariance cache hit");
            return Ok(matrix);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(
            assets = key.universe.len(),
            lookback = key.lookback,
            window_end = ?key.window_end,
            "covariance cache miss"
        );
        let matrix = Arc::new(compute()?);
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(guard.entry(key).or_insert(matrix)))
    }

    pub fn invalidate(&self) {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        guard.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuantfolioError;
    use std::thread;

    fn key(end_day: u32) -> CovarianceKey {
        CovarianceKey::new(
            vec!["AAA".into(), "BBB".into()],
            20,
            NaiveDate::from_ymd_opt(2024, 1, end_day),
        )
    }

    fn matrix(scale: f64) -> QuantfolioResult<CovarianceMatrix> {
        CovarianceMatrix::diagonal(&[0.1 * scale, 0.2 * scale])
    }

    #[test]
    fn test_hit_after_miss() {
        let cache = CovarianceCache::new();
        let first = cache.get_or_compute(key(5), || matrix(1.0)).unwrap();
        let second = cache
            .get_or_compute(key(5), || panic!("should be cached"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_distinct_keys_coexist() {
        let cache = CovarianceCache::new();
        cache.get_or_compute(key(5), || matrix(1.0)).unwrap();
        let next = cache.get_or_compute(key(6), || matrix(2.0)).unwrap();
        assert!((next.variance(0) - 0.04).abs() < 1e-15);
        let earlier = cache.get(&key(5)).unwrap();
        assert!((earlier.variance(0) - 0.01).abs() < 1e-15);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.misses(), 2);
    }

    #[test]
    fn test_frequency_is_part_of_key() {
        let cache = CovarianceCache::new();
        cache
            .get_or_compute(key(5).with_frequency(ReturnFrequency::Daily), || matrix(1.0))
            .unwrap();
        let weekly = cache
            .get_or_compute(key(5).with_frequency(ReturnFrequency::Weekly), || matrix(2.0))
            .unwrap();
        assert!((weekly.variance(0) - 0.04).abs() < 1e-15);
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn test_failed_compute_keeps_previous() {
        let cache = CovarianceCache::new();
        cache.get_or_compute(key(5), || matrix(1.0)).unwrap();
        let err = cache.get_or_compute(key(6), || {
            Err(QuantfolioError::InsufficientData("no data".into()))
        });
        assert!(err.is_err());
        assert!(cache.get(&key(5)).is_some());
        assert!(cache.get(&key(6)).is_none());
    }

    #[test]
    fn test_invalidate() {
        let cache = CovarianceCache::new();
        cache.get_or_compute(key(5), || matrix(1.0)).unwrap();
        cache.invalidate();
        assert!(cache.get(&key(5)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_readers_see_whole_matrices() {
        let cache = Arc::new(CovarianceCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let scale = if i % 2 == 0 { 1.0 } else { 2.0 };
                    let m = cache
                        .get_or_compute(key(if i % 2 == 0 { 5 } else { 6 }), || matrix(scale))
                        .unwrap();
                    // Both entries always come from the same build
                    let ratio = m.variance(1) / m.variance(0);
                    assert!((ratio - 4.0).abs() < 1e-12);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.hits() + cache.misses(), 8);
    }
}
