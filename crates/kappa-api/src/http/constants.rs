//! Shared HTTP constants (headers, problem URIs).

pub(crate) const HEADER_API_KEY: &str = "x-api-key";
pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";
pub(crate) const HEADER_RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub(crate) const HEADER_RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub(crate) const HEADER_RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

pub(crate) const PROBLEM_INTERNAL: &str = "https://kappa.dev/problems/internal";
pub(crate) const PROBLEM_UNAUTHORIZED: &str = "https://kappa.dev/problems/unauthorized";
pub(crate) const PROBLEM_FORBIDDEN: &str = "https://kappa.dev/problems/forbidden";
pub(crate) const PROBLEM_BAD_REQUEST: &str = "https://kappa.dev/problems/bad-request";
pub(crate) const PROBLEM_CONFLICT: &str = "https://kappa.dev/problems/conflict";
pub(crate) const PROBLEM_NOT_FOUND: &str = "https://kappa.dev/problems/not-found";
pub(crate) const PROBLEM_RATE_LIMITED: &str = "https://kappa.dev/problems/rate-limited";

pub(crate) const MAX_BODY_BYTES: usize = 64 * 1024;
