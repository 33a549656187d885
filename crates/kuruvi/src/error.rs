//! Error types for the dispatcher

use reqwest::StatusCode;

/// Everything `Dispatcher::get` can fail with.
///
/// A call that fails after a credential was selected still spent that
/// credential's token for the endpoint.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] common::Error),

    #[error("credential pool error: {0}")]
    Pool(#[from] kuruvi_pool::Error),

    #[error("authorization failed: {0}")]
    AuthExchange(#[from] kuruvi_auth::Error),

    #[error("{endpoint} returned {status} (params: {params:?})")]
    UpstreamStatus {
        status: StatusCode,
        endpoint: String,
        params: Vec<(String, String)>,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result alias for dispatcher operations.
pub type Result<T> = std::result::Result<T, Error>;
