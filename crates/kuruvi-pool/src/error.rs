//! Error types for pool construction and arbitration

/// Errors from building limiters, credentials and the pool.
///
/// All of them stem from configuration; a pool that constructed successfully
/// only fails arbitration if a fallback limiter cannot be created.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential pool is empty")]
    EmptyPool,

    #[error("quota must be greater than zero: {0}")]
    ZeroQuota(String),

    #[error("refill interval must be greater than zero: {0}")]
    InvalidRefillInterval(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
