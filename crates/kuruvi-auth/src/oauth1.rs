//! OAuth 1.0a request signing for user auth
//!
//! Every request carries its own HMAC-SHA1 signature computed from the
//! consumer pair, the access token pair, the HTTP method, the base URI and all
//! request parameters. No network round-trip and no mutable state: the signer
//! only reads its key material.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use common::Secret;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::RngExt;
use reqwest::header::HeaderValue;
use reqwest::{Method, Url};
use sha1::Sha1;

use crate::constants::{OAUTH_SIGNATURE_METHOD, OAUTH_VERSION};
use crate::error::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters are the only ones left unescaped.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a value the way OAuth 1.0a (and the bearer exchange) expect.
pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// User-auth signer holding the consumer and access token pairs.
pub struct UserAuth {
    consumer_key: String,
    consumer_secret: Secret<String>,
    token: String,
    token_secret: Secret<String>,
}

impl UserAuth {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: Secret<String>,
        token: impl Into<String>,
        token_secret: Secret<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret,
            token: token.into(),
            token_secret,
        }
    }

    /// Build the `Authorization: OAuth ...` header for one request.
    ///
    /// `url` may carry a query string; its pairs are signed together with
    /// `params`. Uses a fresh nonce and the current unix time.
    pub fn authorization(
        &self,
        method: &Method,
        url: &Url,
        params: &[(String, String)],
    ) -> Result<HeaderValue> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.authorization_with(method, url, params, &generate_nonce(), timestamp)
    }

    fn authorization_with(
        &self,
        method: &Method,
        url: &Url,
        params: &[(String, String)],
        nonce: &str,
        timestamp: u64,
    ) -> Result<HeaderValue> {
        let timestamp = timestamp.to_string();
        let signature = self.signature(method, url, params, nonce, &timestamp)?;

        let mut header_params = self.protocol_params(nonce, &timestamp);
        header_params.push(("oauth_signature", signature.as_str()));
        header_params.sort();

        let header = header_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        HeaderValue::from_str(&format!("OAuth {header}"))
            .map_err(|e| Error::Signing(format!("invalid authorization header: {e}")))
    }

    /// Compute the base64 HMAC-SHA1 signature over the signature base string.
    fn signature(
        &self,
        method: &Method,
        url: &Url,
        params: &[(String, String)],
        nonce: &str,
        timestamp: &str,
    ) -> Result<String> {
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut encoded: Vec<(String, String)> = self
            .protocol_params(nonce, timestamp)
            .into_iter()
            .map(|(k, v)| (percent_encode(k), percent_encode(v)))
            .chain(
                params
                    .iter()
                    .chain(query.iter())
                    .map(|(k, v)| (percent_encode(k), percent_encode(v))),
            )
            .collect();
        encoded.sort();

        let parameter_string = encoded
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let base_string = format!(
            "{}&{}&{}",
            method.as_str().to_ascii_uppercase(),
            percent_encode(&base_string_uri(url)),
            percent_encode(&parameter_string)
        );
        let signing_key = format!(
            "{}&{}",
            percent_encode(self.consumer_secret.expose()),
            percent_encode(self.token_secret.expose())
        );

        let mut mac = HmacSha1::new_from_slice(signing_key.as_bytes())
            .map_err(|e| Error::Signing(format!("invalid signing key: {e}")))?;
        mac.update(base_string.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    fn protocol_params<'a>(
        &'a self,
        nonce: &'a str,
        timestamp: &'a str,
    ) -> Vec<(&'a str, &'a str)> {
        vec![
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", OAUTH_SIGNATURE_METHOD),
            ("oauth_timestamp", timestamp),
            ("oauth_token", self.token.as_str()),
            ("oauth_version", OAUTH_VERSION),
        ]
    }
}

/// Scheme, lowercased host, non-default port and path. No query, no fragment.
fn base_string_uri(url: &Url) -> String {
    let mut uri = format!(
        "{}://{}",
        url.scheme(),
        url.host_str().unwrap_or_default().to_ascii_lowercase()
    );
    if let Some(port) = url.port() {
        uri.push_str(&format!(":{port}"));
    }
    uri.push_str(url.path());
    uri
}

/// 32 random bytes, URL-safe base64 without padding.
fn generate_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
