//! Application-only auth: bearer token exchange and cache
//!
//! The consumer key and secret are exchanged once for a bearer token via the
//! OAuth2 client credentials grant. The token is cached for the lifetime of
//! the `AppAuth` and attached to every subsequent request.
//!
//! The first request through an `AppAuth` pays for the exchange. Concurrent
//! first users share one in-flight exchange; a failed exchange leaves the
//! cache empty so the next caller starts over.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::constants::{CLIENT_CREDENTIALS_BODY, FORM_CONTENT_TYPE};
use crate::error::{Error, Result};
use crate::oauth1::percent_encode;

/// Response body of the token endpoint.
#[derive(Debug, Deserialize)]
pub struct BearerTokenResponse {
    pub token_type: String,
    pub access_token: String,
}

/// Exchange consumer credentials for a bearer token.
///
/// Sends `Basic base64(pct(key):pct(secret))` with the client credentials form
/// body. Fails on transport errors, non-2xx statuses, bodies that are not the
/// expected JSON, and token types other than `bearer`.
pub async fn exchange_bearer(
    client: &reqwest::Client,
    token_url: &str,
    consumer_key: &str,
    consumer_secret: &str,
) -> Result<BearerTokenResponse> {
    let basic = STANDARD.encode(format!(
        "{}:{}",
        percent_encode(consumer_key),
        percent_encode(consumer_secret)
    ));

    let response = client
        .post(token_url)
        .header(AUTHORIZATION, format!("Basic {basic}"))
        .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
        .body(CLIENT_CREDENTIALS_BODY)
        .send()
        .await
        .map_err(|e| Error::Http(format!("bearer token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "consumer credentials rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let token = response
        .json::<BearerTokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))?;

    if !token.token_type.eq_ignore_ascii_case("bearer") {
        return Err(Error::TokenExchange(format!(
            "unexpected token type: {}",
            token.token_type
        )));
    }
    if token.access_token.is_empty() {
        return Err(Error::TokenExchange("empty access token".into()));
    }

    Ok(token)
}

/// App-auth signer with a write-once bearer token cache.
pub struct AppAuth {
    consumer_key: String,
    consumer_secret: Secret<String>,
    token_url: String,
    bearer: OnceCell<Secret<String>>,
}

impl AppAuth {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: Secret<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret,
            token_url: token_url.into(),
            bearer: OnceCell::new(),
        }
    }

    /// Cached bearer token, exchanging for one on first use.
    pub async fn bearer_token(&self, client: &reqwest::Client) -> Result<&Secret<String>> {
        self.bearer
            .get_or_try_init(|| async {
                debug!(token_url = %self.token_url, "no cached bearer token, exchanging");
                let token = exchange_bearer(
                    client,
                    &self.token_url,
                    &self.consumer_key,
                    self.consumer_secret.expose(),
                )
                .await?;
                info!("bearer token obtained");
                Ok(Secret::new(token.access_token))
            })
            .await
    }

    /// Whether a bearer token has been cached.
    pub fn has_bearer_token(&self) -> bool {
        self.bearer.initialized()
    }

    /// Build the `Authorization: Bearer ...` header.
    pub async fn authorization(&self, client: &reqwest::Client) -> Result<HeaderValue> {
        let token = self.bearer_token(client).await?;
        HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .map_err(|e| Error::TokenExchange(format!("bearer token is not a valid header: {e}")))
    }
}
