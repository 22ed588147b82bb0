//! Error types for access-control primitives.

use argon2::password_hash::Error as PasswordHashError;
use thiserror::Error;

/// Result alias for access-control operations.
pub type AccessResult<T> = Result<T, AccessError>;

/// Errors raised while parsing permissions, limits, or credentials.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Permission value carried bits outside the known flags.
    #[error("invalid permission mask")]
    InvalidPermissions {
        /// Raw value supplied by the caller.
        value: i64,
    },
    /// Rate limit string could not be parsed.
    #[error("invalid rate limit")]
    InvalidRateLimit {
        /// Offending limit string.
        value: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Hashing a password failed.
    #[error("failed to hash password")]
    PasswordHashFailed {
        /// Underlying hashing error.
        detail: PasswordHashError,
    },
    /// A stored password hash could not be parsed.
    #[error("stored password hash is invalid")]
    StoredHashInvalid {
        /// Underlying parse error.
        detail: PasswordHashError,
    },
    /// Password verification failed for reasons other than a mismatch.
    #[error("failed to verify password")]
    PasswordVerifyFailed {
        /// Underlying verification error.
        detail: PasswordHashError,
    },
}
