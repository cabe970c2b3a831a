use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Mutable state of a single bucket, guarded by the bucket's mutex.
struct TokenBucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucketState {
    /// Lazily top the bucket up for the time elapsed since the last refill.
    fn refill(&mut self, now: Instant, capacity: f64, rate: f64) {
        // `saturating_duration_since` keeps a stale `now` from refilling backwards.
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }
}

/// A token bucket for a single rate-limited flow.
///
/// The bucket starts full and refills continuously at `rate` tokens per
/// second, up to `capacity`. There is no background timer: the refill is
/// computed on every [`consume`](TokenBucket::consume) and
/// [`remaining`](TokenBucket::remaining) call, under the bucket's own lock, so
/// refill-check-subtract is atomic with respect to other callers.
pub struct TokenBucket {
    capacity: f64,
    rate: f64,
    state: Mutex<TokenBucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// * `capacity` - maximum number of tokens; must be positive
    /// * `rate`     - tokens refilled per second; zero means never refill
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a positive finite number or `rate` is
    /// negative or not finite.
    pub fn new(capacity: f64, rate: f64) -> Self {
        assert!(
            capacity.is_finite() && capacity > 0.0,
            "token bucket capacity must be positive, got {}",
            capacity
        );
        assert!(
            rate.is_finite() && rate >= 0.0,
            "token bucket rate must be non-negative, got {}",
            rate
        );

        Self {
            capacity,
            rate,
            state: Mutex::new(TokenBucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Try to take `n` tokens. Returns `false`, leaving the token count
    /// untouched, if fewer than `n` are available.
    pub fn consume(&self, n: f64) -> bool {
        self.consume_at(n, Instant::now())
    }

    /// Tokens available right now.
    pub fn remaining(&self) -> f64 {
        self.remaining_at(Instant::now())
    }

    /// True if not even a single token is available.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() < 1.0
    }

    /// Seconds until at least one whole token is available, given `remaining`
    /// tokens now. Zero-rate buckets never refill, so the estimate is infinite.
    pub fn wait_time_for(&self, remaining: f64) -> f64 {
        if remaining >= 1.0 {
            return 0.0;
        }
        if self.rate <= 0.0 {
            return f64::INFINITY;
        }
        (1.0 - remaining) / self.rate
    }

    pub(crate) fn consume_at(&self, n: f64, now: Instant) -> bool {
        let mut state = self.lock();
        state.refill(now, self.capacity, self.rate);

        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    pub(crate) fn remaining_at(&self, now: Instant) -> f64 {
        let mut state = self.lock();
        state.refill(now, self.capacity, self.rate);
        state.tokens
    }

    fn lock(&self) -> MutexGuard<'_, TokenBucketState> {
        // The state is plain arithmetic; a panic mid-update cannot leave it torn.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .field("rate", &self.rate)
            .field("tokens", &self.lock().tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn allows_up_to_capacity() {
        let bucket = TokenBucket::new(5.0, 10.0);
        let now = Instant::now();

        for _ in 0..5 {
            assert!(bucket.consume_at(1.0, now), "should allow within capacity");
        }

        assert!(!bucket.consume_at(1.0, now), "should deny beyond capacity");
    }

    #[test]
    fn denied_consume_leaves_tokens_untouched() {
        let bucket = TokenBucket::new(3.0, 0.0);
        let now = Instant::now();

        assert!(bucket.consume_at(2.0, now));
        assert!(!bucket.consume_at(2.0, now));
        assert_eq!(bucket.remaining_at(now), 1.0);
    }

    #[test]
    fn refills_over_time() {
        let bucket = TokenBucket::new(5.0, 10.0);
        let start = Instant::now();

        for _ in 0..5 {
            bucket.consume_at(1.0, start);
        }
        assert!(!bucket.consume_at(1.0, start));

        // 150ms at 10 tokens/s is 1.5 tokens.
        let later = start + Duration::from_millis(150);
        assert!(bucket.consume_at(1.0, later), "should allow after refill");
        assert!(!bucket.consume_at(1.0, later));
    }

    #[test]
    fn remaining_is_stable_without_elapsed_time() {
        let bucket = TokenBucket::new(10.0, 2.0);
        let now = Instant::now();
        bucket.consume_at(4.0, now);

        let first = bucket.remaining_at(now);
        let second = bucket.remaining_at(now);
        assert_eq!(first, second);
        assert_eq!(first, 6.0);
    }

    #[test]
    fn never_exceeds_capacity() {
        let bucket = TokenBucket::new(3.0, 100.0);
        let start = Instant::now();

        bucket.consume_at(1.0, start);
        let much_later = start + Duration::from_secs(3600);
        assert_eq!(bucket.remaining_at(much_later), 3.0);

        for step in 1..20 {
            let t = much_later + Duration::from_millis(step * 7);
            bucket.consume_at(1.0, t);
            assert!(bucket.remaining_at(t) <= bucket.capacity());
        }
    }

    #[test]
    fn stale_timestamp_does_not_refill() {
        let bucket = TokenBucket::new(2.0, 1.0);
        let now = Instant::now() + Duration::from_secs(1);
        bucket.consume_at(2.0, now);

        // An earlier reading must not roll the clock back.
        let earlier = now - Duration::from_millis(500);
        assert_eq!(bucket.remaining_at(earlier), 0.0);
        assert_eq!(bucket.remaining_at(now), 0.0);
    }

    #[test]
    fn fractional_capacity_never_allows_single_request() {
        let bucket = TokenBucket::new(0.5, 1.0);
        assert!(!bucket.consume(1.0));
        assert!(bucket.is_exhausted());
    }

    #[test]
    fn wait_time_guards_zero_rate() {
        let bucket = TokenBucket::new(1.0, 0.0);
        assert_eq!(bucket.wait_time_for(1.0), 0.0);
        assert!(bucket.wait_time_for(0.0).is_infinite());

        let bucket = TokenBucket::new(4.0, 2.0);
        assert!((bucket.wait_time_for(0.5) - 0.25).abs() < 1e-9);
    }

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn zero_capacity_panics() {
        TokenBucket::new(0.0, 1.0);
    }

    #[test]
    fn exactly_one_winner_under_contention() {
        for _ in 0..50 {
            let bucket = Arc::new(TokenBucket::new(1.0, 0.0));
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let bucket = Arc::clone(&bucket);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        bucket.consume(1.0)
                    })
                })
                .collect();

            let wins = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|allowed| *allowed)
                .count();
            assert_eq!(wins, 1);
        }
    }
}
