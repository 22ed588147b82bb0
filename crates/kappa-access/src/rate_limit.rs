//! Rate limit values and tier selection.
//!
//! # Design
//! - Limits are expressed as `N/<unit>` strings in configuration and parsed into token buckets.
//! - A caller's tier follows from its strongest permission flag; anonymous callers get the
//!   smallest budget.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AccessError, AccessResult};
use crate::permissions::Permissions;

static LIMIT_PATTERN: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)\s*(?:/|per)\s*(second|minute|hour|day)s?\s*$")
});

/// Token bucket parameters: `burst` requests per `replenish_period`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Maximum number of requests allowed within a period.
    pub burst: u32,
    /// Time it takes for the bucket to refill completely.
    pub replenish_period: Duration,
}

impl RateLimit {
    /// Limit of `burst` requests per minute.
    #[must_use]
    pub const fn per_minute(burst: u32) -> Self {
        Self {
            burst,
            replenish_period: Duration::from_secs(60),
        }
    }

    /// Parse a `N/second|minute|hour|day` limit string.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::InvalidRateLimit`] when the string does not follow the format
    /// or the count is zero.
    pub fn parse(value: &str) -> AccessResult<Self> {
        let invalid = |reason| AccessError::InvalidRateLimit {
            value: value.to_string(),
            reason,
        };
        let pattern = LIMIT_PATTERN
            .as_ref()
            .map_err(|_| invalid("pattern_unavailable"))?;
        let captures = pattern
            .captures(value)
            .ok_or_else(|| invalid("unrecognised_format"))?;
        let burst = captures[1]
            .parse::<u32>()
            .map_err(|_| invalid("count_out_of_range"))?;
        if burst == 0 {
            return Err(invalid("count_zero"));
        }
        let seconds = match &captures[2] {
            "second" => 1,
            "minute" => 60,
            "hour" => 3_600,
            _ => 86_400,
        };
        Ok(Self {
            burst,
            replenish_period: Duration::from_secs(seconds),
        })
    }
}

impl FromStr for RateLimit {
    type Err = AccessError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Display for RateLimit {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let unit = match self.replenish_period.as_secs() {
            1 => "second",
            60 => "minute",
            3_600 => "hour",
            86_400 => "day",
            other => return write!(formatter, "{}/{}s", self.burst, other),
        };
        write!(formatter, "{}/{unit}", self.burst)
    }
}

/// Budget class applied to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateTier {
    /// Requests without a valid API key.
    Anonymous,
    /// Users holding only the general flag.
    General,
    /// Users holding the private flag.
    Private,
    /// Administrators.
    Admin,
    /// DoseGuard caregiver endpoints.
    Caregiver,
}

impl RateTier {
    /// Select the tier matching the caller's strongest permission flag.
    #[must_use]
    pub const fn for_permissions(perms: Option<Permissions>) -> Self {
        match perms {
            None => Self::Anonymous,
            Some(perms) if perms.contains(Permissions::ADMIN) => Self::Admin,
            Some(perms) if perms.contains(Permissions::PRIVATE) => Self::Private,
            Some(_) => Self::General,
        }
    }

    /// Stable label used in logs and bucket keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::General => "general",
            Self::Private => "private",
            Self::Admin => "admin",
            Self::Caregiver => "caregiver",
        }
    }
}

/// Configured limits for every tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Limit for unauthenticated callers.
    pub anonymous: RateLimit,
    /// Limit for general users.
    pub general: RateLimit,
    /// Limit for private users.
    pub private: RateLimit,
    /// Limit for administrators.
    pub admin: RateLimit,
    /// Limit for DoseGuard endpoints.
    pub caregiver: RateLimit,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            anonymous: RateLimit::per_minute(20),
            general: RateLimit::per_minute(50),
            private: RateLimit::per_minute(100),
            admin: RateLimit::per_minute(1_000),
            caregiver: RateLimit::per_minute(500),
        }
    }
}

impl RateLimitPolicy {
    /// Limit applied to the given tier.
    #[must_use]
    pub const fn limit_for(&self, tier: RateTier) -> &RateLimit {
        match tier {
            RateTier::Anonymous => &self.anonymous,
            RateTier::General => &self.general,
            RateTier::Private => &self.private,
            RateTier::Admin => &self.admin,
            RateTier::Caregiver => &self.caregiver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_common_forms() -> anyhow::Result<()> {
        assert_eq!(RateLimit::parse("20/minute")?, RateLimit::per_minute(20));
        assert_eq!(RateLimit::parse(" 500 / minutes ")?, RateLimit::per_minute(500));
        let hourly = RateLimit::parse("10 per hour")?;
        assert_eq!(hourly.burst, 10);
        assert_eq!(hourly.replenish_period, Duration::from_secs(3_600));
        Ok(())
    }

    #[test]
    fn parse_rejects_garbage_and_zero() {
        for value in ["", "fast", "0/minute", "10/fortnight", "-1/second"] {
            assert!(RateLimit::parse(value).is_err(), "{value} should be rejected");
        }
    }

    #[test]
    fn display_round_trips_named_units() {
        assert_eq!(RateLimit::per_minute(50).to_string(), "50/minute");
    }

    #[test]
    fn tier_follows_strongest_flag() {
        assert_eq!(RateTier::for_permissions(None), RateTier::Anonymous);
        assert_eq!(
            RateTier::for_permissions(Some(Permissions::GENERAL)),
            RateTier::General
        );
        assert_eq!(
            RateTier::for_permissions(Some(Permissions::GENERAL | Permissions::PRIVATE)),
            RateTier::Private
        );
        assert_eq!(
            RateTier::for_permissions(Some(Permissions::ALL)),
            RateTier::Admin
        );
        assert_eq!(
            RateTier::for_permissions(Some(Permissions::DEFAULT)),
            RateTier::General
        );
    }

    #[test]
    fn default_policy_matches_documented_budgets() {
        let policy = RateLimitPolicy::default();
        assert_eq!(policy.limit_for(RateTier::Anonymous).burst, 20);
        assert_eq!(policy.limit_for(RateTier::General).burst, 50);
        assert_eq!(policy.limit_for(RateTier::Private).burst, 100);
        assert_eq!(policy.limit_for(RateTier::Admin).burst, 1_000);
        assert_eq!(policy.limit_for(RateTier::Caregiver).burst, 500);
    }
}
