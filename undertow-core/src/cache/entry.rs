//! Cached session with its access and speed bookkeeping

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::session::Session;

#[derive(Debug)]
struct Bookkeeping {
    last_accessed_at: Instant,
    prev_bytes_completed: u64,
    prev_sample_at: Instant,
    last_speed: f64,
}

/// A session held by the cache.
///
/// Bookkeeping sits behind its own lock so touching or sampling one session
/// never contends with another.
#[derive(Debug)]
pub struct CacheEntry {
    session: Arc<Session>,
    bookkeeping: Mutex<Bookkeeping>,
}

impl CacheEntry {
    pub fn new(session: Arc<Session>) -> Self {
        Self::new_at(session, Instant::now())
    }

    pub fn new_at(session: Arc<Session>, now: Instant) -> Self {
        let bytes_completed = session.progress().bytes_completed;
        Self {
            session,
            bookkeeping: Mutex::new(Bookkeeping {
                last_accessed_at: now,
                prev_bytes_completed: bytes_completed,
                prev_sample_at: now,
                last_speed: 0.0,
            }),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    pub fn touch_at(&self, now: Instant) {
        let mut bookkeeping = self.bookkeeping.lock();
        if now > bookkeeping.last_accessed_at {
            bookkeeping.last_accessed_at = now;
        }
    }

    pub fn last_accessed_at(&self) -> Instant {
        self.bookkeeping.lock().last_accessed_at
    }

    /// Time since the last access, zero if `now` precedes it.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.bookkeeping.lock().last_accessed_at)
    }

    /// Computes download speed in bytes per second.
    ///
    /// A new sample is taken only once `min_interval` has passed since the
    /// previous one; until then the last computed speed is returned.
    pub fn sample_speed(&self, bytes_completed: u64, now: Instant, min_interval: Duration) -> f64 {
        let mut bookkeeping = self.bookkeeping.lock();
        let elapsed = now.saturating_duration_since(bookkeeping.prev_sample_at);

        if elapsed >= min_interval && !elapsed.is_zero() {
            let delta = bytes_completed.saturating_sub(bookkeeping.prev_bytes_completed);
            bookkeeping.last_speed = delta as f64 / elapsed.as_secs_f64();
            bookkeeping.prev_bytes_completed = bytes_completed;
            bookkeeping.prev_sample_at = now;
        }

        bookkeeping.last_speed
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::session::test_support;

    fn entry_at(now: Instant) -> CacheEntry {
        let session = test_support::session(1, vec![("movie.mkv", Bytes::from_static(b"0123"))]);
        CacheEntry::new_at(session, now)
    }

    #[test]
    fn test_touch_moves_access_time_forward_only() {
        let start = Instant::now();
        let entry = entry_at(start);

        entry.touch_at(start + Duration::from_secs(10));
        assert_eq!(entry.idle_for(start + Duration::from_secs(15)), Duration::from_secs(5));

        entry.touch_at(start + Duration::from_secs(1));
        assert_eq!(entry.last_accessed_at(), start + Duration::from_secs(10));
        assert_eq!(entry.idle_for(start), Duration::ZERO);
    }

    #[test]
    fn test_speed_sampling_respects_interval() {
        let start = Instant::now();
        let entry = entry_at(start);
        let interval = Duration::from_millis(500);

        // initial sample picks up progress reported at construction (4 bytes)
        let speed = entry.sample_speed(4 + 1000, start + Duration::from_secs(1), interval);
        assert!((speed - 1000.0).abs() < f64::EPSILON);

        // too soon: previous speed is kept
        let speed = entry.sample_speed(
            4 + 5000,
            start + Duration::from_millis(1200),
            interval,
        );
        assert!((speed - 1000.0).abs() < f64::EPSILON);

        let speed = entry.sample_speed(4 + 3000, start + Duration::from_secs(2), interval);
        assert!((speed - 2000.0).abs() < f64::EPSILON);
    }
}
