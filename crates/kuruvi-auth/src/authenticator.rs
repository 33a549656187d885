//! Closed set of signing strategies
//!
//! A credential signs either as the application (cached bearer token) or as a
//! user (per-request OAuth 1.0a signature). No third strategy exists, so the
//! choice is an enum rather than a trait object.

use reqwest::header::HeaderValue;
use reqwest::{Method, Url};

use crate::bearer::AppAuth;
use crate::error::{Error, Result};
use crate::keys::{AuthKeys, AuthType};
use crate::oauth1::UserAuth;

pub enum Authenticator {
    App(AppAuth),
    User(UserAuth),
}

impl Authenticator {
    /// Build the authenticator for `auth_type` from a key set.
    ///
    /// User auth requires the access token pair; app auth only the consumer
    /// pair. `token_url` is the bearer exchange endpoint (unused for user auth).
    pub fn from_keys(keys: &AuthKeys, auth_type: AuthType, token_url: &str) -> Result<Self> {
        if keys.consumer_key.is_empty() || keys.consumer_secret.expose().is_empty() {
            return Err(Error::InvalidCredentials(
                "consumer key and secret are required".into(),
            ));
        }

        match auth_type {
            AuthType::App => Ok(Authenticator::App(AppAuth::new(
                keys.consumer_key.clone(),
                keys.consumer_secret.clone(),
                token_url,
            ))),
            AuthType::User => match (&keys.access_token_key, &keys.access_token_secret) {
                (Some(token), Some(token_secret)) if keys.supports_user_auth() => {
                    Ok(Authenticator::User(UserAuth::new(
                        keys.consumer_key.clone(),
                        keys.consumer_secret.clone(),
                        token.clone(),
                        token_secret.clone(),
                    )))
                }
                _ => Err(Error::InvalidCredentials(format!(
                    "user auth for consumer key {} needs access_token_key and access_token_secret",
                    keys.consumer_key
                ))),
            },
        }
    }

    pub fn auth_type(&self) -> AuthType {
        match self {
            Authenticator::App(_) => AuthType::App,
            Authenticator::User(_) => AuthType::User,
        }
    }

    /// Produce the Authorization header value for a request.
    ///
    /// App auth may perform the one-time bearer exchange here; user auth is
    /// pure computation over `method`, `url` and `params`.
    pub async fn authorization(
        &self,
        client: &reqwest::Client,
        method: &Method,
        url: &Url,
        params: &[(String, String)],
    ) -> Result<HeaderValue> {
        match self {
            Authenticator::App(app) => app.authorization(client).await,
            Authenticator::User(user) => user.authorization(method, url, params),
        }
    }
}
