//! Request dispatch
//!
//! `Dispatcher::get` is the client entry point: it asks the pool for a
//! credential with quota for the endpoint, signs the request with it and
//! issues the GET. Quota is spent when the credential is selected, so a call
//! that fails afterwards (signing, transport, non-200) still costs a token.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use kuruvi_auth::{AuthType, Authenticator};
use kuruvi_pool::{Credential, CredentialPool};
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{Span, debug, field, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::rate_status::RateStatus;

pub struct Dispatcher {
    client: reqwest::Client,
    pool: Arc<CredentialPool>,
    base_url: Url,
}

impl Dispatcher {
    /// Build the pool and HTTP client described by `config`.
    ///
    /// Each key set contributes one credential per auth type of the auth
    /// mode, named `<auth type>-<key set index>`. In `both` mode a key set
    /// without an access token pair contributes only its app credential.
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = config.quota_settings();
        let mut credentials = Vec::new();

        for (index, keys) in config.credentials.iter().enumerate() {
            for &auth_type in config.api.auth_mode.auth_types() {
                if auth_type == AuthType::User && !keys.supports_user_auth() {
                    warn!(
                        credential = index,
                        "key set has no access token pair, skipping user auth"
                    );
                    continue;
                }

                let authenticator =
                    Authenticator::from_keys(keys, auth_type, &config.api.token_url)
                        .map_err(|e| common::Error::Config(format!("credential {index}: {e}")))?;
                credentials.push(Credential::new(
                    format!("{auth_type}-{index}"),
                    authenticator,
                    &config.rate_limits,
                    settings.clone(),
                )?);
            }
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        let pool = CredentialPool::new(credentials, None)?;
        Self::new(client, pool, &config.api.base_url)
    }

    /// Dispatcher over an existing pool. `base_url` is the prefix endpoints
    /// are joined onto.
    pub fn new(client: reqwest::Client, pool: CredentialPool, base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url).map_err(|e| {
            common::Error::Config(format!("invalid base_url {base_url}: {e}"))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            pool: Arc::new(pool),
            base_url,
        })
    }

    /// Convenience constructor with a default client and the given timeout.
    pub fn with_timeout(pool: CredentialPool, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Self::new(client, pool, base_url)
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// GET `endpoint` with query `params`, returning the raw body.
    ///
    /// Waits only while every credential is out of quota for the endpoint's
    /// bucket. Any status other than 200 is an `UpstreamStatus` error.
    #[instrument(
        skip(self, params),
        fields(request_id = %Uuid::new_v4(), credential = field::Empty)
    )]
    pub async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Bytes> {
        let (canonical, url) = self.endpoint_url(endpoint)?;
        let params: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let credential = self.pool.acquire_for(canonical).await?;
        Span::current().record("credential", credential.id());

        let authorization = credential
            .authorization(&self.client, &Method::GET, &url, &params)
            .await?;

        let mut request_url = url;
        if !params.is_empty() {
            request_url.query_pairs_mut().extend_pairs(params.iter());
        }

        let response = self
            .client
            .get(request_url)
            .header(AUTHORIZATION, authorization)
            .send()
            .await?;

        let status = response.status();
        let rate = RateStatus::from_headers(response.headers());
        if rate.is_reported() {
            debug!(
                limit = rate.limit,
                remaining = rate.remaining,
                reset = rate.reset,
                "upstream rate limit status"
            );
        }
        metrics::counter!(
            "kuruvi_requests_total",
            "credential" => credential.id().to_string(),
            "status" => status.as_u16().to_string()
        )
        .increment(1);

        if status != StatusCode::OK {
            warn!(%status, "upstream returned non-200");
            return Err(Error::UpstreamStatus {
                status,
                endpoint: endpoint.to_string(),
                params,
            });
        }

        let body = response.bytes().await?;
        debug!(bytes = body.len(), %status, "request completed");
        Ok(body)
    }

    /// GET `endpoint` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let body = self.get(endpoint, params).await?;
        serde_json::from_slice(&body).map_err(|source| Error::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    /// Remaining quota per credential for `endpoint`'s bucket. Consumes nothing.
    pub fn capacity(&self, endpoint: &str) -> Result<serde_json::Value> {
        Ok(self.pool.capacity(endpoint)?)
    }

    /// `<base><endpoint>.json` plus the slash-trimmed endpoint it was built
    /// from, which is also what quota is charged to. Rejected before any quota
    /// is spent.
    fn endpoint_url<'a>(&self, endpoint: &'a str) -> Result<(&'a str, Url)> {
        let invalid = |reason: &str| Error::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = endpoint.trim_matches('/');
        if trimmed.is_empty() {
            return Err(invalid("empty endpoint"));
        }
        if trimmed.contains(['?', '#']) {
            return Err(invalid("query parameters go in params"));
        }
        if trimmed.split('/').any(|segment| segment.is_empty() || segment == "..") {
            return Err(invalid("malformed path segment"));
        }

        let url = self
            .base_url
            .join(&format!("{trimmed}.json"))
            .map_err(|e| invalid(&e.to_string()))?;
        Ok((trimmed, url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, RawQuery, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use kuruvi_auth::AuthKeys;
    use kuruvi_pool::{QuotaSettings, RateLimit};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    /// Mock upstream serving both the token endpoint and the REST API.
    #[derive(Clone)]
    struct Upstream {
        token_calls: Arc<AtomicUsize>,
        fail_token_first: usize,
        seen_auth: Arc<Mutex<Vec<String>>>,
    }

    async fn token_handler(State(up): State<Upstream>) -> (AxumStatus, &'static str) {
        let n = up.token_calls.fetch_add(1, Ordering::SeqCst);
        if n < up.fail_token_first {
            return (AxumStatus::SERVICE_UNAVAILABLE, "over capacity");
        }
        (AxumStatus::OK, r#"{"token_type":"bearer","access_token":"app-token"}"#)
    }

    async fn api_handler(
        State(up): State<Upstream>,
        Path(path): Path<String>,
        RawQuery(query): RawQuery,
        headers: HeaderMap,
    ) -> axum::response::Response {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        up.seen_auth.lock().unwrap().push(auth);

        match path.as_str() {
            "statuses/show/404.json" => (AxumStatus::NOT_FOUND, "no such status").into_response(),
            "help/plain.json" => (AxumStatus::OK, "plain text").into_response(),
            _ => (
                [
                    ("x-rate-limit-limit", "180"),
                    ("x-rate-limit-remaining", "179"),
                    ("x-rate-limit-reset", "1700000000"),
                ],
                axum::Json(serde_json::json!({ "path": path, "query": query })),
            )
                .into_response(),
        }
    }

    async fn start_upstream(fail_token_first: usize) -> (String, Upstream) {
        let up = Upstream {
            token_calls: Arc::new(AtomicUsize::new(0)),
            fail_token_first,
            seen_auth: Arc::new(Mutex::new(Vec::new())),
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new()
            .route("/oauth2/token", post(token_handler))
            .route("/1.1/{*path}", get(api_handler))
            .with_state(up.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), up)
    }

    fn limits(quota: u32) -> Vec<RateLimit> {
        vec![
            RateLimit::new("GET", "statuses/show/:id", "statuses", quota, quota),
            RateLimit::new("GET", "users/show", "users", quota, quota),
        ]
    }

    fn user_credential(id: &str, quota: u32) -> Credential {
        let keys = AuthKeys::user(format!("ck-{id}"), "cs", format!("atk-{id}"), "ats");
        let authenticator =
            Authenticator::from_keys(&keys, AuthType::User, "http://unused").unwrap();
        Credential::new(id, authenticator, &limits(quota), QuotaSettings::default()).unwrap()
    }

    fn app_credential(id: &str, token_url: &str) -> Credential {
        let keys = AuthKeys::app(format!("ck-{id}"), "cs");
        let authenticator = Authenticator::from_keys(&keys, AuthType::App, token_url).unwrap();
        Credential::new(id, authenticator, &limits(15), QuotaSettings::default()).unwrap()
    }

    fn dispatcher(base: &str, credentials: Vec<Credential>) -> Dispatcher {
        let pool = CredentialPool::new(credentials, Some(1)).unwrap();
        Dispatcher::with_timeout(pool, &format!("{base}/1.1"), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn get_signs_and_returns_body() {
        let (base, up) = start_upstream(0).await;
        let dispatcher = dispatcher(&base, vec![user_credential("a", 15)]);

        let value: serde_json::Value = dispatcher
            .get_json("users/show", &[("screen_name", "venkat")])
            .await
            .unwrap();
        assert_eq!(value["path"], "users/show.json");
        assert_eq!(value["query"], "screen_name=venkat");

        let seen = up.seen_auth.lock().unwrap();
        assert!(seen[0].starts_with("OAuth "), "got: {}", seen[0]);
        assert!(seen[0].contains(r#"oauth_consumer_key="ck-a""#));
    }

    #[tokio::test]
    async fn path_parameter_endpoints_share_quota() {
        let (base, _up) = start_upstream(0).await;
        let dispatcher = dispatcher(&base, vec![user_credential("a", 15)]);

        dispatcher.get("statuses/show/1", &[]).await.unwrap();
        dispatcher.get("statuses/show/2", &[]).await.unwrap();

        let report = dispatcher.capacity("statuses/show/3").unwrap();
        assert_eq!(report["bucket"], "statuses/show/:id");
        assert_eq!(report["tokens_remaining_total"], 13);
        assert_eq!(dispatcher.capacity("users/show").unwrap()["tokens_remaining_total"], 15);
    }

    #[tokio::test]
    async fn trailing_slash_charges_the_requested_bucket() {
        let (base, _up) = start_upstream(0).await;
        let dispatcher = dispatcher(&base, vec![user_credential("a", 15)]);

        let value: serde_json::Value = dispatcher.get_json("users/show/", &[]).await.unwrap();
        assert_eq!(value["path"], "users/show.json");

        let report = dispatcher.capacity("users/show").unwrap();
        assert_eq!(report["bucket"], "users/show");
        assert_eq!(report["tokens_remaining_total"], 14);
        assert_eq!(dispatcher.capacity("users/show/").unwrap(), report);
    }

    #[tokio::test]
    async fn concurrent_gets_use_distinct_credentials() {
        let (base, up) = start_upstream(0).await;
        let dispatcher = Arc::new(dispatcher(
            &base,
            vec![user_credential("a", 1), user_credential("b", 1)],
        ));

        let calls = (0..2).map(|i| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let endpoint = format!("statuses/show/{i}");
                dispatcher.get(&endpoint, &[]).await
            })
        });
        let results = tokio::time::timeout(
            Duration::from_secs(2),
            futures_util::future::join_all(calls),
        )
        .await
        .expect("both requests must proceed without waiting for a refill");
        for result in results {
            result.unwrap().unwrap();
        }

        let seen = up.seen_auth.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let a = seen.iter().filter(|h| h.contains(r#"oauth_consumer_key="ck-a""#)).count();
        let b = seen.iter().filter(|h| h.contains(r#"oauth_consumer_key="ck-b""#)).count();
        assert_eq!((a, b), (1, 1));
    }

    #[tokio::test]
    async fn failed_bearer_exchange_then_cached_token() {
        let (base, up) = start_upstream(1).await;
        let token_url = format!("{base}/oauth2/token");
        let dispatcher = dispatcher(&base, vec![app_credential("a", &token_url)]);

        let err = dispatcher.get("users/show", &[]).await.unwrap_err();
        assert!(matches!(err, Error::AuthExchange(_)), "got: {err}");

        dispatcher.get("users/show", &[]).await.unwrap();
        dispatcher.get("users/show", &[]).await.unwrap();
        assert_eq!(up.token_calls.load(Ordering::SeqCst), 2);

        let seen = up.seen_auth.lock().unwrap();
        assert_eq!(seen.as_slice(), ["Bearer app-token", "Bearer app-token"]);

        // The failed call still spent its token
        drop(seen);
        assert_eq!(dispatcher.capacity("users/show").unwrap()["tokens_remaining_total"], 12);
    }

    #[tokio::test]
    async fn non_200_is_upstream_status() {
        let (base, _up) = start_upstream(0).await;
        let dispatcher = dispatcher(&base, vec![user_credential("a", 15)]);

        let err = dispatcher
            .get("statuses/show/404", &[("trim_user", "true")])
            .await
            .unwrap_err();
        match err {
            Error::UpstreamStatus {
                status,
                endpoint,
                params,
            } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(endpoint, "statuses/show/404");
                assert_eq!(params, vec![("trim_user".to_string(), "true".to_string())]);
            }
            other => panic!("expected UpstreamStatus, got: {other}"),
        }
    }

    #[tokio::test]
    async fn undecodable_body_is_decode_error() {
        let (base, _up) = start_upstream(0).await;
        let dispatcher = dispatcher(&base, vec![user_credential("a", 15)]);

        let raw = dispatcher.get("help/plain", &[]).await.unwrap();
        assert_eq!(raw, Bytes::from_static(b"plain text"));

        let err = dispatcher
            .get_json::<serde_json::Value>("help/plain", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode { ref endpoint, .. } if endpoint == "help/plain"));
    }

    #[tokio::test]
    async fn invalid_endpoint_spends_no_quota() {
        let (base, up) = start_upstream(0).await;
        let dispatcher = dispatcher(&base, vec![user_credential("a", 15)]);

        for endpoint in ["", "/", "users/show?screen_name=x", "users//show", "../secrets"] {
            let err = dispatcher.get(endpoint, &[]).await.unwrap_err();
            assert!(matches!(err, Error::InvalidEndpoint { .. }), "{endpoint}: {err}");
        }
        assert_eq!(dispatcher.capacity("users/show").unwrap()["tokens_remaining_total"], 15);
        assert!(up.seen_auth.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_surfaces() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let dispatcher = dispatcher(&format!("http://{addr}"), vec![user_credential("a", 15)]);

        let err = dispatcher.get("users/show", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)), "got: {err}");
    }

    #[test]
    fn endpoint_urls_append_json_suffix() {
        let pool = CredentialPool::new(vec![user_credential("a", 15)], Some(1)).unwrap();
        let dispatcher =
            Dispatcher::new(reqwest::Client::new(), pool, "https://api.twitter.com/1.1").unwrap();

        assert_eq!(
            dispatcher.endpoint_url("statuses/show/20").unwrap().1.as_str(),
            "https://api.twitter.com/1.1/statuses/show/20.json"
        );
        assert_eq!(
            dispatcher.endpoint_url("/users/show/").unwrap().1.as_str(),
            "https://api.twitter.com/1.1/users/show.json"
        );
    }

    #[test]
    fn from_config_builds_credentials_per_auth_mode() {
        let config = Config::from_toml(
            r#"
[[credentials]]
consumer_key = "k0"
consumer_secret = "s0"
access_token_key = "t0"
access_token_secret = "ts0"

[[credentials]]
consumer_key = "k1"
consumer_secret = "s1"
"#,
        )
        .unwrap();
        let dispatcher = Dispatcher::from_config(&config).unwrap();

        let ids: Vec<&str> = dispatcher.pool().credentials().iter().map(|c| c.id()).collect();
        assert_eq!(ids, ["app-0", "user-0", "app-1"]);

        let report = dispatcher.capacity("search/tweets").unwrap();
        assert_eq!(report["credentials"][0]["capacity"], 450);
        assert_eq!(report["credentials"][1]["capacity"], 180);
    }
}
