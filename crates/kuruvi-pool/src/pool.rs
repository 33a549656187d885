//! Credential pool and capacity racing
//!
//! For each request the pool looks up every credential's limiter for the
//! request's bucket and waits on all of them at once. The first limiter that
//! has a token wins and the token is claimed immediately; if another caller
//! claimed it in between, the race is simply re-entered. Racing on readiness
//! avoids deciding on stale `tokens_remaining()` snapshots.
//!
//! Ties between limiters that are ready together are broken by shuffling the
//! candidate order with the pool's RNG, so no credential is permanently
//! favoured or starved.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::select_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngExt, SeedableRng};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::credential::Credential;
use crate::endpoint::normalize;
use crate::error::{Error, Result};
use crate::limiter::TokenBucket;

type Candidate = (Arc<Credential>, Arc<TokenBucket>);

/// Metric label for buckets missing from the rate-limit table.
const FALLBACK_BUCKET_LABEL: &str = "fallback";

/// Fixed set of credentials arbitrated per request.
pub struct CredentialPool {
    credentials: Vec<Arc<Credential>>,
    rng: Mutex<StdRng>,
}

impl CredentialPool {
    /// Create a pool over `credentials`.
    ///
    /// `seed` initializes the tie-break RNG; `None` draws a seed from the
    /// thread RNG. Fails with `EmptyPool` if no credentials are given.
    pub fn new(credentials: Vec<Credential>, seed: Option<u64>) -> Result<Self> {
        if credentials.is_empty() {
            return Err(Error::EmptyPool);
        }

        let seed = seed.unwrap_or_else(|| rand::rng().random());
        info!(credentials = credentials.len(), "credential pool initialized");

        Ok(Self {
            credentials: credentials.into_iter().map(Arc::new).collect(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn credentials(&self) -> &[Arc<Credential>] {
        &self.credentials
    }

    /// Wait for a credential with spare quota for `endpoint` and consume one
    /// of its tokens.
    ///
    /// Never waits while some credential has a token for the bucket. The
    /// returned future can be dropped at any point without consuming a token.
    pub async fn acquire_for(&self, endpoint: &str) -> Result<Arc<Credential>> {
        let bucket = normalize(endpoint);
        let started = Instant::now();

        let mut candidates = self
            .credentials
            .iter()
            .map(|credential| Ok((credential.clone(), credential.limiter(&bucket)?)))
            .collect::<Result<Vec<Candidate>>>()?;

        let credential = if candidates.len() == 1 {
            let (credential, limiter) = candidates.remove(0);
            limiter.acquire().await;
            credential
        } else {
            self.shuffle(&mut candidates);
            race(&candidates).await
        };

        let waited = started.elapsed();
        debug!(
            endpoint,
            bucket = %bucket,
            credential = credential.id(),
            auth_type = %credential.auth_type(),
            waited_ms = waited.as_millis() as u64,
            "credential selected"
        );
        metrics::counter!(
            "kuruvi_credential_selected_total",
            "credential" => credential.id().to_string(),
            "auth_type" => credential.auth_type().as_str()
        )
        .increment(1);
        // Unknown buckets share one label
        let bucket_label = if credential.has_configured_limiter(&bucket) {
            bucket
        } else {
            FALLBACK_BUCKET_LABEL.to_string()
        };
        metrics::histogram!("kuruvi_acquire_wait_seconds", "bucket" => bucket_label)
            .record(waited.as_secs_f64());

        Ok(credential)
    }

    /// Snapshot of remaining quota per credential for `endpoint`'s bucket.
    ///
    /// Reads only; consumes no tokens.
    pub fn capacity(&self, endpoint: &str) -> Result<serde_json::Value> {
        let bucket = normalize(endpoint);
        let mut credentials = Vec::with_capacity(self.credentials.len());
        let mut total = 0u64;

        for credential in &self.credentials {
            let limiter = credential.limiter(&bucket)?;
            let remaining = limiter.tokens_remaining();
            total += u64::from(remaining);
            credentials.push(serde_json::json!({
                "id": credential.id(),
                "auth_type": credential.auth_type().as_str(),
                "capacity": limiter.capacity(),
                "tokens_remaining": remaining,
                "refill_interval_ms": limiter.refill_interval().as_millis() as u64,
            }));
        }

        Ok(serde_json::json!({
            "bucket": bucket,
            "tokens_remaining_total": total,
            "credentials": credentials,
        }))
    }

    fn shuffle(&self, candidates: &mut [Candidate]) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        candidates.shuffle(&mut *rng);
    }
}

/// Wait on every candidate's readiness and claim a token from the first one
/// that fires. `select_all` polls in order, so among limiters that are ready
/// together the earliest in the (shuffled) list wins.
async fn race(candidates: &[Candidate]) -> Arc<Credential> {
    loop {
        let waits = candidates
            .iter()
            .map(|(_, limiter)| Box::pin(limiter.ready()))
            .collect::<Vec<_>>();
        let ((), index, _pending) = select_all(waits).await;

        let (credential, limiter) = &candidates[index];
        match limiter.try_acquire() {
            Ok(()) => return credential.clone(),
            Err(_) => debug!(limiter = limiter.label(), "lost token race, waiting again"),
        }
    }
}
