use std::time::{Duration, Instant};

use governor::{
    clock::Clock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

/// Reads tokio's clock, so a paused test runtime also drives the limiter.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Keeps at least `interval` between consecutive requests: a governor quota
/// of one cell per `interval` with no burst.
pub struct RateGate {
    interval: Duration,
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, TokioClock, NoOpMiddleware<Instant>>>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            // a zero period has no quota, the gate stays open
            limiter: Quota::with_period(interval)
                .map(|quota| RateLimiter::direct_with_clock(quota, TokioClock)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until the limiter admits one more request. The first call never
    /// sleeps.
    pub async fn wait(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        while let Err(not_until) = limiter.check() {
            tokio::time::sleep(not_until.wait_time_from(TokioClock.now())).await;
        }
    }
}
