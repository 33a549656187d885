//! Credential pool with per-endpoint token-bucket throttling
//!
//! Holds a fixed set of signing credentials, each with its own quota per
//! endpoint family, and hands out whichever credential can serve a request
//! soonest. Callers block only when every credential is out of quota for the
//! request's bucket.
//!
//! Request path:
//! 1. `endpoint::normalize` maps the raw endpoint to its quota bucket
//! 2. `CredentialPool::acquire_for` races every credential's `TokenBucket`
//!    for that bucket and claims one token from the first with capacity
//! 3. The caller signs the request with the returned `Credential`
//!
//! Token consumption and request issuance are not atomic: a request that
//! fails after `acquire_for` returns still spends its token.

pub mod credential;
pub mod endpoint;
pub mod error;
pub mod limiter;
pub mod pool;
pub mod rate_limit;

pub use credential::{Credential, QuotaSettings};
pub use endpoint::{EndpointTemplate, TEMPLATES, normalize};
pub use error::{Error, Result};
pub use limiter::{MAX_REFILL_INTERVAL, TokenBucket};
pub use pool::CredentialPool;
pub use rate_limit::{
    DEFAULT_FALLBACK_QUOTA, DEFAULT_WINDOW, RateLimit, default_rate_limits, merge_rate_limits,
};
