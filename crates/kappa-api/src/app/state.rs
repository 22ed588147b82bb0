//! Shared request state: store handle, metrics, and per-caller rate limiters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use kappa_access::{RateLimit, RateLimitPolicy, RateTier};
use kappa_data::Store;
use kappa_telemetry::Metrics;
use tracing::{debug, warn};

use crate::http::rate_limit::{RateLimitError, RateLimitSnapshot, RateLimiter};

/// Requests admitted between sweeps of idle buckets.
const SWEEP_INTERVAL: u32 = 1_024;

#[derive(Default)]
struct Buckets {
    by_caller: HashMap<String, RateLimiter>,
    since_sweep: u32,
}

impl Buckets {
    fn acquire(
        &mut self,
        key: String,
        limit: &RateLimit,
        now: Instant,
    ) -> Result<RateLimitSnapshot, RateLimitError> {
        self.since_sweep += 1;
        if self.since_sweep >= SWEEP_INTERVAL {
            self.sweep(now);
        }
        self.by_caller
            .entry(key)
            .or_insert_with(|| RateLimiter::new(limit.clone(), now))
            .acquire(limit, now)
    }

    fn sweep(&mut self, now: Instant) {
        let before = self.by_caller.len();
        self.by_caller.retain(|_, bucket| !bucket.is_idle(now));
        self.since_sweep = 0;
        debug!(
            evicted = before - self.by_caller.len(),
            retained = self.by_caller.len(),
            "swept idle rate-limit buckets"
        );
    }
}

pub(crate) struct ApiState {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) telemetry: Metrics,
    pub(crate) policy: RateLimitPolicy,
    pub(crate) app_name: String,
    rate_limiters: Mutex<Buckets>,
}

impl ApiState {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        telemetry: Metrics,
        policy: RateLimitPolicy,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            telemetry,
            policy,
            app_name: app_name.into(),
            rate_limiters: Mutex::new(Buckets::default()),
        }
    }

    pub(crate) const fn limit_for(&self, tier: RateTier) -> &RateLimit {
        self.policy.limit_for(tier)
    }

    /// Spend one token from the bucket identified by `tier` and `caller`.
    pub(crate) fn enforce_rate_limit(
        &self,
        tier: RateTier,
        caller: &str,
    ) -> Result<RateLimitSnapshot, RateLimitError> {
        self.enforce_rate_limit_at(tier, caller, Instant::now())
    }

    fn enforce_rate_limit_at(
        &self,
        tier: RateTier,
        caller: &str,
        now: Instant,
    ) -> Result<RateLimitSnapshot, RateLimitError> {
        let limit = self.limit_for(tier);
        let key = format!("{}:{caller}", tier.as_str());
        let outcome = Self::lock_guard(&self.rate_limiters).acquire(key, limit, now);

        if let Err(err) = &outcome {
            self.telemetry.inc_rate_limit_throttled();
            warn!(
                tier = tier.as_str(),
                retry_after_ms = u64::try_from(err.retry_after.as_millis()).unwrap_or(u64::MAX),
                "rate limit exceeded"
            );
        }
        outcome
    }

    // Buckets hold no invariants worth abandoning after a panic elsewhere.
    fn lock_guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
