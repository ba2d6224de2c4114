//! Per-caller sliding-window request limiting.
//!
//! Each caller owns a bucket holding at most `limit` timestamps. Entries
//! older than `bucket_time` are evicted whenever the bucket is read, so no
//! background sweep is needed and memory stays O(distinct callers).

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Sliding-window admission limiter keyed by caller.
#[derive(Debug)]
pub struct RateLimiter<K> {
    limit: usize,
    bucket_time: Duration,
    buckets: Mutex<HashMap<K, VecDeque<Instant>>>,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    /// Create a limiter allowing `limit` actions per `bucket_time`.
    pub fn new(limit: usize, bucket_time: Duration) -> Self {
        Self {
            limit,
            bucket_time,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Build a limiter from configuration.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.limit, config.bucket_time())
    }

    /// Record an action for `caller`.
    ///
    /// Returns `false` and records nothing if the caller is already limited.
    pub fn add(&self, caller: &K) -> bool {
        let now = Instant::now();
        let mut buckets = self.lock();

        if let Some(bucket) = buckets.get_mut(caller) {
            self.evict(bucket, now);
            if bucket.len() >= self.limit {
                return false;
            }
            bucket.push_back(now);
            return true;
        }

        if self.limit == 0 {
            return false;
        }
        let mut bucket = VecDeque::with_capacity(self.limit);
        bucket.push_back(now);
        buckets.insert(caller.clone(), bucket);
        true
    }

    /// Whether `caller` has used up its window.
    pub fn is_limited(&self, caller: &K) -> bool {
        if self.limit == 0 {
            return true;
        }
        let now = Instant::now();
        let mut buckets = self.lock();
        match buckets.get_mut(caller) {
            Some(bucket) => {
                self.evict(bucket, now);
                bucket.len() >= self.limit
            }
            None => false,
        }
    }

    /// Time until `caller` may act again, or `None` if it is not limited.
    pub fn retry_after(&self, caller: &K) -> Option<Duration> {
        if self.limit == 0 {
            return None;
        }
        let now = Instant::now();
        let mut buckets = self.lock();
        let bucket = buckets.get_mut(caller)?;
        self.evict(bucket, now);
        if bucket.len() < self.limit {
            return None;
        }
        bucket
            .front()
            .map(|oldest| (*oldest + self.bucket_time).saturating_duration_since(now))
    }

    /// Actions allowed per window.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Window length.
    pub fn bucket_time(&self) -> Duration {
        self.bucket_time
    }

    fn evict(&self, bucket: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = bucket.front() {
            if now.duration_since(*oldest) >= self.bucket_time {
                bucket.pop_front();
            } else {
                break;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, VecDeque<Instant>>> {
        // A panic while holding the lock cannot leave a bucket half-updated.
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
