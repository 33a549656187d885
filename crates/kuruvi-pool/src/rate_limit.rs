//! Per-endpoint quota table
//!
//! Each endpoint family has one quota per auth type, counted over a shared
//! window (15 minutes upstream). The built-in table mirrors the published GET
//! limits; deployments can replace it from a JSON file or override entries in
//! the config.

use std::time::Duration;

use kuruvi_auth::AuthType;
use serde::{Deserialize, Serialize};

/// Upstream quota window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Quota given to buckets missing from the table. Matches the smallest
/// published tier, so an unknown endpoint is never over-driven.
pub const DEFAULT_FALLBACK_QUOTA: u32 = 15;

/// Quota record for one endpoint family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    #[serde(default = "default_method", alias = "Method")]
    pub method: String,
    #[serde(alias = "EndPoint")]
    pub endpoint: String,
    #[serde(default, alias = "Category")]
    pub category: String,
    #[serde(alias = "AppLimit")]
    pub app_quota: u32,
    #[serde(alias = "UserLimit")]
    pub user_quota: u32,
}

fn default_method() -> String {
    "GET".into()
}

impl RateLimit {
    pub fn new(
        method: impl Into<String>,
        endpoint: impl Into<String>,
        category: impl Into<String>,
        user_quota: u32,
        app_quota: u32,
    ) -> Self {
        Self {
            method: method.into(),
            endpoint: endpoint.into(),
            category: category.into(),
            app_quota,
            user_quota,
        }
    }

    /// Requests allowed per window for the given auth type.
    pub fn quota_for(&self, auth_type: AuthType) -> u32 {
        match auth_type {
            AuthType::App => self.app_quota,
            AuthType::User => self.user_quota,
        }
    }
}

/// (endpoint, category, user quota, app quota)
const PUBLISHED_LIMITS: &[(&str, &str, u32, u32)] = &[
    ("application/rate_limit_status", "application", 180, 180),
    ("favorites/list", "favorites", 15, 15),
    ("followers/ids", "followers", 15, 15),
    ("followers/list", "followers", 15, 30),
    ("friends/ids", "friends", 15, 15),
    ("friends/list", "friends", 15, 30),
    ("friendships/show", "friendships", 180, 15),
    ("help/configuration", "help", 15, 15),
    ("help/languages", "help", 15, 15),
    ("help/privacy", "help", 15, 15),
    ("help/tos", "help", 15, 15),
    ("lists/list", "lists", 15, 15),
    ("lists/members", "lists", 180, 15),
    ("lists/members/show", "lists", 15, 15),
    ("lists/memberships", "lists", 15, 15),
    ("lists/ownerships", "lists", 15, 15),
    ("lists/show", "lists", 15, 15),
    ("lists/statuses", "lists", 180, 180),
    ("lists/subscribers", "lists", 180, 15),
    ("lists/subscribers/show", "lists", 15, 15),
    ("lists/subscriptions", "lists", 15, 15),
    ("search/tweets", "search", 180, 450),
    ("statuses/lookup", "statuses", 180, 60),
    ("statuses/oembed", "statuses", 180, 180),
    ("statuses/retweeters/ids", "statuses", 15, 60),
    ("statuses/retweets/:id", "statuses", 15, 60),
    ("statuses/show/:id", "statuses", 180, 180),
    ("statuses/user_timeline", "statuses", 180, 300),
    ("trends/available", "trends", 15, 15),
    ("trends/closest", "trends", 15, 15),
    ("trends/place", "trends", 15, 15),
    ("users/lookup", "users", 180, 60),
    ("users/show", "users", 180, 180),
    ("users/suggestions", "users", 15, 15),
    ("users/suggestions/:slug", "users", 15, 15),
    ("users/suggestions/:slug/members", "users", 15, 15),
];

/// The built-in quota table.
pub fn default_rate_limits() -> Vec<RateLimit> {
    PUBLISHED_LIMITS
        .iter()
        .map(|(endpoint, category, user, app)| {
            RateLimit::new("GET", *endpoint, *category, *user, *app)
        })
        .collect()
}

/// Replace entries of `base` that share an endpoint with one in `overrides`,
/// appending the rest.
pub fn merge_rate_limits(mut base: Vec<RateLimit>, overrides: Vec<RateLimit>) -> Vec<RateLimit> {
    for limit in overrides {
        match base.iter_mut().find(|existing| existing.endpoint == limit.endpoint) {
            Some(existing) => *existing = limit,
            None => base.push(limit),
        }
    }
    base
}
