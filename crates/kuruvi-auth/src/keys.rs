//! Key material issued by the developer console
//!
//! One `AuthKeys` set can back an app-auth identity (consumer key/secret only),
//! a user-auth identity (consumer pair plus access token pair), or both.

use std::fmt;

use common::Secret;
use serde::Deserialize;

/// Which authentication scheme a credential signs with. Each scheme carries
/// its own per-endpoint quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthType {
    App,
    User,
}

impl AuthType {
    /// Label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::App => "app",
            AuthType::User => "user",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consumer and access token keys.
///
/// Accepts both `snake_case` (TOML config) and the `camelCase` names used by
/// standalone JSON key files. Only set the keys needed for the auth type in use.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthKeys {
    #[serde(alias = "consumerKey")]
    pub consumer_key: String,
    #[serde(alias = "consumerSecret")]
    pub consumer_secret: Secret<String>,
    #[serde(default, alias = "accessTokenKey")]
    pub access_token_key: Option<String>,
    #[serde(default, alias = "accessTokenSecret")]
    pub access_token_secret: Option<Secret<String>>,
}

impl AuthKeys {
    /// Keys for application-only auth.
    pub fn app(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: Secret::new(consumer_secret.into()),
            access_token_key: None,
            access_token_secret: None,
        }
    }

    /// Keys for user auth (also usable for app auth).
    pub fn user(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token_key: impl Into<String>,
        access_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: Secret::new(consumer_secret.into()),
            access_token_key: Some(access_token_key.into()),
            access_token_secret: Some(Secret::new(access_token_secret.into())),
        }
    }

    /// Whether the access token pair needed for user auth is present and non-empty.
    pub fn supports_user_auth(&self) -> bool {
        matches!(
            (&self.access_token_key, &self.access_token_secret),
            (Some(key), Some(secret)) if !key.is_empty() && !secret.expose().is_empty()
        )
    }
}
