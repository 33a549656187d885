//! A signing identity plus its per-bucket limiters
//!
//! Every credential carries its own quota: an app-auth and a user-auth
//! identity built from the same keys are two credentials with independent
//! limiters. Limiters for the configured table are built up front and never
//! change; buckets outside the table get a fallback limiter on first use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use kuruvi_auth::{AuthType, Authenticator};
use reqwest::header::HeaderValue;
use reqwest::{Method, Url};
use tracing::debug;

use crate::endpoint::normalize;
use crate::error::{Error, Result};
use crate::limiter::TokenBucket;
use crate::rate_limit::{DEFAULT_FALLBACK_QUOTA, DEFAULT_WINDOW, RateLimit};

/// Quota settings shared by every credential in a pool.
#[derive(Debug, Clone)]
pub struct QuotaSettings {
    /// Window each quota is counted over.
    pub window: Duration,
    /// Per-window quota for buckets missing from the rate-limit table.
    pub fallback_quota: u32,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            fallback_quota: DEFAULT_FALLBACK_QUOTA,
        }
    }
}

pub struct Credential {
    id: String,
    authenticator: Authenticator,
    limiters: HashMap<String, Arc<TokenBucket>>,
    settings: QuotaSettings,
    fallback: Mutex<HashMap<String, Arc<TokenBucket>>>,
}

impl Credential {
    /// Build a credential with one limiter per rate-limit entry, sized by the
    /// authenticator's auth type.
    ///
    /// Fails if any quota for this auth type is zero, or the window or
    /// fallback quota is unusable.
    pub fn new(
        id: impl Into<String>,
        authenticator: Authenticator,
        rate_limits: &[RateLimit],
        settings: QuotaSettings,
    ) -> Result<Self> {
        let id = id.into();
        let auth_type = authenticator.auth_type();

        if settings.fallback_quota == 0 {
            return Err(Error::ZeroQuota(format!("{id} - fallback quota")));
        }
        if (settings.window / settings.fallback_quota).is_zero() {
            return Err(Error::InvalidRefillInterval(format!("{id} - window")));
        }

        let mut limiters = HashMap::with_capacity(rate_limits.len());
        for limit in rate_limits {
            let bucket = normalize(&limit.endpoint);
            let limiter = TokenBucket::per_window(
                format!("{auth_type} - {bucket}"),
                limit.quota_for(auth_type),
                settings.window,
            )?;
            limiters.insert(bucket, Arc::new(limiter));
        }

        debug!(credential = %id, %auth_type, buckets = limiters.len(), "credential limiters ready");

        Ok(Self {
            id,
            authenticator,
            limiters,
            settings,
            fallback: Mutex::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn auth_type(&self) -> AuthType {
        self.authenticator.auth_type()
    }

    /// Whether `bucket` is in the rate-limit table this credential was built
    /// from.
    pub fn has_configured_limiter(&self, bucket: &str) -> bool {
        self.limiters.contains_key(bucket)
    }

    /// The limiter for a normalized bucket key, creating a fallback limiter
    /// if the bucket is not in the rate-limit table.
    ///
    /// Fallback limiters are kept for the life of the credential, one per
    /// distinct unknown bucket, so this map grows with every new endpoint a
    /// caller sends.
    pub fn limiter(&self, bucket: &str) -> Result<Arc<TokenBucket>> {
        if let Some(limiter) = self.limiters.get(bucket) {
            return Ok(limiter.clone());
        }

        let mut fallback = self.fallback.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(limiter) = fallback.get(bucket) {
            return Ok(limiter.clone());
        }

        let limiter = Arc::new(TokenBucket::per_window(
            format!("{} - {bucket}", self.auth_type()),
            self.settings.fallback_quota,
            self.settings.window,
        )?);
        debug!(
            credential = %self.id,
            bucket,
            quota = self.settings.fallback_quota,
            "bucket missing from rate-limit table, using fallback quota"
        );
        fallback.insert(bucket.to_string(), limiter.clone());
        Ok(limiter)
    }

    /// Authorization header for a request signed by this credential.
    pub async fn authorization(
        &self,
        client: &reqwest::Client,
        method: &Method,
        url: &Url,
        params: &[(String, String)],
    ) -> kuruvi_auth::Result<HeaderValue> {
        self.authenticator
            .authorization(client, method, url, params)
            .await
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("auth_type", &self.auth_type())
            .field("buckets", &self.limiters.len())
            .finish()
    }
}
