#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Access-control primitives for the Kappa API.
//! Layout: permissions.rs (bitmask flags), rate_limit.rs (tiers and limits),
//! ownership.rs (caregiver lookup chain), password.rs (argon2 hashing), error.rs.

pub mod error;
pub mod ownership;
pub mod password;
pub mod permissions;
pub mod rate_limit;

pub use error::{AccessError, AccessResult};
pub use ownership::{AccessGuard, OwnershipSource, RecordOwner, ResourceKind, Verdict};
pub use password::{hash_password, verify_password};
pub use permissions::{Permissions, authorize};
pub use rate_limit::{RateLimit, RateLimitPolicy, RateTier};
