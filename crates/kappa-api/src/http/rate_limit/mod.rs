//! Token buckets keyed by caller and the `x-ratelimit-*` response headers.

use std::convert::TryFrom;
use std::fmt::{self, Display, Formatter};
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, HeaderValue, header::RETRY_AFTER};
use kappa_access::RateLimit;

use crate::http::constants::{
    HEADER_RATE_LIMIT_LIMIT, HEADER_RATE_LIMIT_REMAINING, HEADER_RATE_LIMIT_RESET,
};

/// Budget left after an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RateLimitSnapshot {
    pub(crate) limit: u32,
    pub(crate) remaining: u32,
}

/// Rejection carrying the wait until the next token.
#[derive(Debug)]
pub(crate) struct RateLimitError {
    pub(crate) limit: u32,
    pub(crate) retry_after: Duration,
}

impl Display for RateLimitError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("rate limit exceeded")
    }
}

impl std::error::Error for RateLimitError {}

/// Header values attached to throttled and admitted responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RateLimitHeaders {
    pub(crate) limit: u32,
    pub(crate) remaining: u32,
    pub(crate) retry_after: Option<Duration>,
}

impl From<RateLimitSnapshot> for RateLimitHeaders {
    fn from(snapshot: RateLimitSnapshot) -> Self {
        Self {
            limit: snapshot.limit,
            remaining: snapshot.remaining,
            retry_after: None,
        }
    }
}

/// One caller's bucket. Tokens are tracked in millionths so partial refills accumulate.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    limit: RateLimit,
    tokens: u128,
    last_refill: Instant,
    last_seen: Instant,
}

impl RateLimiter {
    const TOKEN_SCALE: u128 = 1_000_000;

    pub(crate) fn new(limit: RateLimit, now: Instant) -> Self {
        let tokens = Self::capacity_for(&limit);
        Self {
            limit,
            tokens,
            last_refill: now,
            last_seen: now,
        }
    }

    fn capacity_for(limit: &RateLimit) -> u128 {
        u128::from(limit.burst) * Self::TOKEN_SCALE
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_micros();
        if elapsed == 0 {
            return;
        }
        let capacity = Self::capacity_for(&self.limit);
        let period = self.limit.replenish_period.as_micros();
        if period == 0 {
            self.tokens = capacity;
            self.last_refill = now;
            return;
        }
        let gained = capacity.saturating_mul(elapsed) / period;
        if gained > 0 {
            self.tokens = self.tokens.saturating_add(gained).min(capacity);
            self.last_refill = now;
        }
    }

    /// Spend one token. A changed limit resets the bucket to full.
    pub(crate) fn acquire(
        &mut self,
        limit: &RateLimit,
        now: Instant,
    ) -> Result<RateLimitSnapshot, RateLimitError> {
        if self.limit != *limit {
            *self = Self::new(limit.clone(), now);
        }
        self.refill(now);
        self.last_seen = now;

        if self.tokens < Self::TOKEN_SCALE {
            return Err(RateLimitError {
                limit: self.limit.burst,
                retry_after: self.retry_delay(),
            });
        }
        self.tokens -= Self::TOKEN_SCALE;
        let whole = self.tokens / Self::TOKEN_SCALE;
        Ok(RateLimitSnapshot {
            limit: self.limit.burst,
            remaining: u32::try_from(whole).unwrap_or(u32::MAX),
        })
    }

    /// Untouched for a whole replenish period, so the bucket is full again and
    /// dropping it loses nothing.
    pub(crate) fn is_idle(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) >= self.limit.replenish_period
    }

    fn retry_delay(&self) -> Duration {
        let capacity = Self::capacity_for(&self.limit);
        if capacity == 0 {
            return Duration::MAX;
        }
        let deficit = Self::TOKEN_SCALE.saturating_sub(self.tokens);
        let micros = deficit
            .saturating_mul(self.limit.replenish_period.as_micros())
            .div_ceil(capacity);
        Duration::from_micros(u64::try_from(micros).unwrap_or(u64::MAX))
    }
}

pub(crate) fn insert_rate_limit_headers(headers: &mut HeaderMap, rate: &RateLimitHeaders) {
    headers.insert(HEADER_RATE_LIMIT_LIMIT, HeaderValue::from(rate.limit));
    headers.insert(HEADER_RATE_LIMIT_REMAINING, HeaderValue::from(rate.remaining));
    if let Some(wait) = rate.retry_after {
        // Round up: a client told to retry after 0s would spin.
        let mut seconds = wait.as_secs();
        if wait.subsec_nanos() > 0 || seconds == 0 {
            seconds = seconds.saturating_add(1);
        }
        let value = HeaderValue::from(seconds);
        headers.insert(RETRY_AFTER, value.clone());
        headers.insert(HEADER_RATE_LIMIT_RESET, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_drains_then_refills() {
        let limit = RateLimit {
            burst: 2,
            replenish_period: Duration::from_secs(2),
        };
        let start = Instant::now();
        let mut bucket = RateLimiter::new(limit.clone(), start);

        let first = bucket.acquire(&limit, start);
        assert_eq!(
            first.ok(),
            Some(RateLimitSnapshot {
                limit: 2,
                remaining: 1
            })
        );
        assert!(bucket.acquire(&limit, start).is_ok());
        let denied = bucket.acquire(&limit, start);
        let Err(err) = denied else {
            panic!("third request should be throttled");
        };
        assert_eq!(err.limit, 2);
        assert_eq!(err.retry_after, Duration::from_secs(1));

        assert!(bucket.acquire(&limit, start + Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn bucket_goes_idle_after_a_full_period() {
        let limit = RateLimit::per_minute(3);
        let start = Instant::now();
        let mut bucket = RateLimiter::new(limit.clone(), start);
        assert!(bucket.acquire(&limit, start + Duration::from_secs(30)).is_ok());

        assert!(!bucket.is_idle(start + Duration::from_secs(60)));
        assert!(bucket.is_idle(start + Duration::from_secs(90)));
    }

    #[test]
    fn changed_limit_resets_bucket() {
        let tight = RateLimit::per_minute(1);
        let start = Instant::now();
        let mut bucket = RateLimiter::new(tight.clone(), start);
        assert!(bucket.acquire(&tight, start).is_ok());
        assert!(bucket.acquire(&tight, start).is_err());

        let relaxed = RateLimit::per_minute(10);
        let snapshot = bucket.acquire(&relaxed, start);
        assert_eq!(snapshot.map(|snap| snap.remaining).ok(), Some(9));
    }

    #[test]
    fn headers_round_partial_seconds_up() {
        let mut headers = HeaderMap::new();
        insert_rate_limit_headers(
            &mut headers,
            &RateLimitHeaders {
                limit: 5,
                remaining: 0,
                retry_after: Some(Duration::from_millis(2_100)),
            },
        );
        assert_eq!(headers[HEADER_RATE_LIMIT_LIMIT], "5");
        assert_eq!(headers[HEADER_RATE_LIMIT_REMAINING], "0");
        assert_eq!(headers[RETRY_AFTER], "3");
        assert_eq!(headers[HEADER_RATE_LIMIT_RESET], "3");

        let mut admitted = HeaderMap::new();
        insert_rate_limit_headers(
            &mut admitted,
            &RateLimitHeaders::from(RateLimitSnapshot {
                limit: 5,
                remaining: 4,
            }),
        );
        assert!(admitted.get(RETRY_AFTER).is_none());
    }
}
