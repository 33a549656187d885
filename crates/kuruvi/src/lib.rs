//! Credential-pooled, rate-limit-aware client for the v1.1 REST API
//!
//! ```text
//! Dispatcher::get(endpoint, params)
//!   -> CredentialPool::acquire_for(endpoint)   (normalize + race limiters)
//!   -> Credential signs (bearer or OAuth 1.0a)
//!   -> GET <base><endpoint>.json?params
//! ```
//!
//! Build a `Dispatcher` from a loaded `Config`, or from a hand-built
//! `CredentialPool`.

pub mod client;
pub mod config;
pub mod error;
pub mod rate_status;

pub use client::Dispatcher;
pub use config::{ApiConfig, AuthMode, Config, MAX_WINDOW_SECS};
pub use error::{Error, Result};
pub use rate_status::RateStatus;
