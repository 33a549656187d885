//! Request signing for the kuruvi client
//!
//! Two schemes, one per credential:
//! - app auth: consumer key/secret exchanged once for a bearer token
//!   (`bearer::exchange_bearer`), cached in the `AppAuth`
//! - user auth: OAuth 1.0a HMAC-SHA1 signature computed per request
//!   (`oauth1::UserAuth`)
//!
//! `Authenticator` is the closed enum the credential pool stores. This crate
//! has no knowledge of quotas or endpoints beyond the URL it is asked to sign.

pub mod authenticator;
pub mod bearer;
pub mod constants;
pub mod error;
pub mod keys;
pub mod oauth1;

pub use authenticator::Authenticator;
pub use bearer::{AppAuth, BearerTokenResponse, exchange_bearer};
pub use constants::*;
pub use error::{Error, Result};
pub use keys::{AuthKeys, AuthType};
pub use oauth1::{UserAuth, percent_encode};
