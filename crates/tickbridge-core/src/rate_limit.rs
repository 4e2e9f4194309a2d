//! Token-bucket admission control shared across concurrent callers.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Mutable bucket state. Only ever touched under the limiter's mutex so
/// concurrent callers observe a consistent token count.
#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter.
///
/// Tokens refill continuously at `refill_rate` per second up to `capacity`;
/// each admission consumes one token. The limiter is `Send + Sync` and is
/// shared across all concurrent callers of one client via `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    refill_rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Create a limiter admitting `refill_rate` requests per second with a
    /// burst capacity of `capacity` tokens. The bucket starts full.
    ///
    /// # Panics
    ///
    /// Panics if `refill_rate` is not positive or `capacity` is below one
    /// token. A capacity under 1.0 could never accumulate a whole token, so
    /// no admission would ever succeed.
    #[must_use]
    pub fn new(refill_rate: f64, capacity: f64) -> Self {
        assert!(
            refill_rate > 0.0,
            "refill_rate must be positive, got {refill_rate}"
        );
        assert!(
            capacity >= 1.0,
            "capacity must be at least one token, got {capacity}"
        );

        Self {
            refill_rate,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }

    /// Acquire one token, suspending until one is available.
    ///
    /// The wait happens outside the lock so other callers are not blocked
    /// while this one sleeps. Dropping the future before it resolves (for
    /// example when a caller deadline fires) consumes no token.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self
                    .state
                    .lock()
                    .expect("rate limiter lock is not poisoned");
                self.refill(&mut state);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }

                let needed = 1.0 - state.tokens;
                Duration::from_secs_f64(needed / self.refill_rate)
            };

            tokio::time::sleep(wait).await;
        }
    }

    /// Acquire one token without suspending. Returns `false` when the bucket
    /// is empty.
    pub fn try_acquire(&self) -> bool {
        let mut state = self
            .state
            .lock()
            .expect("rate limiter lock is not poisoned");
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn bucket_starts_full_and_drains_one_token_per_admission() {
        let limiter = RateLimiter::new(10.0, 3.0);

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    #[should_panic(expected = "refill_rate must be positive")]
    fn rejects_non_positive_refill_rate() {
        let _ = RateLimiter::new(0.0, 1.0);
    }

    #[test]
    #[should_panic(expected = "capacity must be at least one token")]
    fn rejects_non_positive_capacity() {
        let _ = RateLimiter::new(1.0, 0.0);
    }

    #[test]
    #[should_panic(expected = "capacity must be at least one token")]
    fn rejects_fractional_capacity_that_could_never_admit() {
        // Refill caps at capacity, so a bucket under one token would make
        // every acquire wait forever.
        let _ = RateLimiter::new(10.0, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_never_accumulate_beyond_capacity() {
        let limiter = RateLimiter::new(100.0, 2.0);

        tokio::time::advance(Duration::from_secs(5)).await;

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire(), "capacity must cap the refill");
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_acquires_are_paced_at_the_refill_rate() {
        // capacity 1, 10 tokens/sec: ten acquires need at least 0.9s of
        // refill after the initial token.
        let limiter = RateLimiter::new(10.0, 1.0);

        let start = tokio::time::Instant::now();
        for _ in 0..10 {
            limiter.acquire().await;
        }
        let elapsed = start.elapsed();

        assert!(
            elapsed >= Duration::from_millis(900),
            "ten admissions finished too fast: {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_bucket() {
        let limiter = Arc::new(RateLimiter::new(10.0, 1.0));
        let start = tokio::time::Instant::now();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.acquire().await }));
        }
        for handle in handles {
            handle.await.expect("acquire task must not panic");
        }

        // One immediate token plus four refills at 100ms each.
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_acquire_consumes_no_token() {
        let limiter = RateLimiter::new(10.0, 1.0);
        assert!(limiter.try_acquire());

        {
            let pending = limiter.acquire();
            tokio::pin!(pending);
            // Poll once so the waiter is parked in its sleep, then drop it.
            assert!(futures_poll_once(pending.as_mut()).await.is_none());
        }

        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(
            limiter.try_acquire(),
            "the abandoned waiter must not have taken the refilled token"
        );
    }

    async fn futures_poll_once<F: std::future::Future + Unpin>(fut: F) -> Option<F::Output> {
        let mut fut = fut;
        std::future::poll_fn(|cx| {
            use std::task::Poll;
            match std::pin::Pin::new(&mut fut).poll(cx) {
                Poll::Ready(out) => Poll::Ready(Some(out)),
                Poll::Pending => Poll::Ready(None),
            }
        })
        .await
    }
}
