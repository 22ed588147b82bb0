//! Permission bitmask attached to every user account.
//!
//! # Design
//! - Flags combine with `|`; an endpoint admits a caller when any required flag is held.
//! - Values outside the known flags are rejected at the boundary so stored masks stay valid.

use std::fmt::{self, Display, Formatter};
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::error::AccessError;

/// Bitmask of permission flags held by a user or required by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Permissions(u8);

impl Permissions {
    /// No flags.
    pub const DEFAULT: Self = Self(0);
    /// Baseline access granted to every registered user.
    pub const GENERAL: Self = Self(1);
    /// Access to private surfaces such as DoseGuard.
    pub const PRIVATE: Self = Self(2);
    /// Administrative access.
    pub const ADMIN: Self = Self(4);
    /// Every known flag.
    pub const ALL: Self = Self(7);

    /// Build a mask from raw bits, rejecting unknown flags.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn from_bits(bits: i64) -> Option<Self> {
        if bits < 0 || bits > Self::ALL.0 as i64 {
            return None;
        }
        Some(Self(bits as u8))
    }

    /// Raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True when at least one flag is shared with `other`.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// True when every flag in `other` is also set here.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when no flag is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Decide whether a caller holding `granted` may use an endpoint requiring `required`.
#[must_use]
pub const fn authorize(granted: Permissions, required: Permissions) -> bool {
    granted.intersects(required)
}

impl BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Permissions {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl TryFrom<i64> for Permissions {
    type Error = AccessError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_bits(value).ok_or(AccessError::InvalidPermissions { value })
    }
}

impl TryFrom<i32> for Permissions {
    type Error = AccessError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::try_from(i64::from(value))
    }
}

impl From<Permissions> for i64 {
    fn from(value: Permissions) -> Self {
        Self::from(value.0)
    }
}

impl From<Permissions> for i32 {
    fn from(value: Permissions) -> Self {
        Self::from(value.0)
    }
}

impl Display for Permissions {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return formatter.write_str("DEFAULT");
        }
        let names = [
            (Self::GENERAL, "GENERAL"),
            (Self::PRIVATE, "PRIVATE"),
            (Self::ADMIN, "ADMIN"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    formatter.write_str("|")?;
                }
                formatter.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
