//! Token bucket limiter for one (credential, quota bucket) pair
//!
//! Holds up to `capacity` tokens and gains one every `refill_interval`. The
//! upstream's fixed 15-minute quota window is collapsed into this per-token
//! cadence (`window / quota`), which never bursts past the window quota.
//!
//! Refill is applied lazily whenever the state is read. `last_refill` only
//! advances by whole intervals (or is re-anchored to now while the bucket is
//! full), so repeated reads never double count.
//!
//! The state mutex is held only for synchronous bookkeeping, never across an
//! `.await`. A token is consumed inside that critical section, so dropping an
//! `acquire()` or `ready()` future at any point leaks nothing.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::time::{Duration, Instant};
use tracing::trace;

use crate::error::{Error, Result};

/// Longest accepted refill interval. Keeps every refill deadline well inside
/// the range `Instant` can represent.
pub const MAX_REFILL_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant, capacity: u32, interval: Duration) {
        if self.tokens >= capacity {
            self.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill);
        let owed = elapsed.as_nanos() / interval.as_nanos();
        if owed == 0 {
            return;
        }

        let missing = capacity - self.tokens;
        let added = owed.min(u128::from(missing)) as u32;
        self.tokens += added;
        if self.tokens == capacity {
            self.last_refill = now;
        } else {
            self.last_refill += interval * added;
        }
    }

    /// When the next token is due. Only meaningful while the bucket is not full.
    fn next_refill(&self, interval: Duration) -> Instant {
        self.last_refill + interval
    }
}

/// Per-bucket token bucket. Starts full.
#[derive(Debug)]
pub struct TokenBucket {
    label: String,
    capacity: u32,
    refill_interval: Duration,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// A zero capacity would make `acquire()` wait forever, so it is rejected
    /// here along with a zero refill interval or one above
    /// `MAX_REFILL_INTERVAL`.
    pub fn new(label: impl Into<String>, capacity: u32, refill_interval: Duration) -> Result<Self> {
        let label = label.into();
        if capacity == 0 {
            return Err(Error::ZeroQuota(label));
        }
        if refill_interval.is_zero() || refill_interval > MAX_REFILL_INTERVAL {
            return Err(Error::InvalidRefillInterval(label));
        }
        Ok(Self {
            label,
            capacity,
            refill_interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Bucket sized for `quota` requests per `window`.
    pub fn per_window(label: impl Into<String>, quota: u32, window: Duration) -> Result<Self> {
        let label = label.into();
        if quota == 0 {
            return Err(Error::ZeroQuota(label));
        }
        Self::new(label, quota, window / quota)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Tokens available right now, after any owed refill. Consumes nothing.
    pub fn tokens_remaining(&self) -> u32 {
        let mut state = self.lock();
        state.refill(Instant::now(), self.capacity, self.refill_interval);
        state.tokens
    }

    /// Claim one token without waiting.
    ///
    /// On failure returns the instant the next token is due. Another caller
    /// may still claim that token first.
    pub fn try_acquire(&self) -> std::result::Result<(), Instant> {
        let mut state = self.lock();
        state.refill(Instant::now(), self.capacity, self.refill_interval);
        if state.tokens > 0 {
            state.tokens -= 1;
            trace!(limiter = %self.label, remaining = state.tokens, "token consumed");
            Ok(())
        } else {
            Err(state.next_refill(self.refill_interval))
        }
    }

    /// Wait until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(due) => tokio::time::sleep_until(due).await,
            }
        }
    }

    /// Resolve once a token is available, without consuming it.
    ///
    /// Used to wait on many buckets at once; the winner still has to claim
    /// its token through `try_acquire()`.
    pub async fn ready(&self) {
        loop {
            let due = {
                let mut state = self.lock();
                state.refill(Instant::now(), self.capacity, self.refill_interval);
                if state.tokens > 0 {
                    return;
                }
                state.next_refill(self.refill_interval)
            };
            tokio::time::sleep_until(due).await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        // Bookkeeping cannot panic mid-update, so a poisoned state is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
