//! Upstream rate-limit response headers
//!
//! Every API response reports the caller's remaining quota for the endpoint
//! in `x-rate-limit-*` headers. The local limiters stay authoritative; these
//! values are only logged so drift between the two is visible.

use reqwest::header::HeaderMap;

pub const LIMIT_HEADER: &str = "x-rate-limit-limit";
pub const REMAINING_HEADER: &str = "x-rate-limit-remaining";
pub const RESET_HEADER: &str = "x-rate-limit-reset";

/// Quota status as reported by the upstream. Missing or unparseable headers
/// are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateStatus {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    /// Unix time (seconds) at which the upstream window resets.
    pub reset: Option<u64>,
}

impl RateStatus {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            limit: parse(headers, LIMIT_HEADER),
            remaining: parse(headers, REMAINING_HEADER),
            reset: parse(headers, RESET_HEADER),
        }
    }

    /// Whether the response carried any rate-limit headers at all.
    pub fn is_reported(&self) -> bool {
        self.limit.is_some() || self.remaining.is_some() || self.reset.is_some()
    }
}

fn parse<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
