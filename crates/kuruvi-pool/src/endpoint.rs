//! Endpoint normalization to quota buckets
//!
//! The upstream rate-limits by endpoint template, not by literal path:
//! `statuses/show/12345` and `statuses/show/67890` draw from the same
//! `statuses/show/:id` quota. Templates are checked in order and the first
//! match wins; anything unmatched is its own bucket.

/// One ordered matching rule.
#[derive(Debug, Clone, Copy)]
pub struct EndpointTemplate {
    pub prefix: &'static str,
    pub suffix: Option<&'static str>,
    pub bucket: &'static str,
}

impl EndpointTemplate {
    pub fn matches(&self, endpoint: &str) -> bool {
        endpoint.starts_with(self.prefix)
            && self.suffix.is_none_or(|suffix| endpoint.ends_with(suffix))
    }
}

/// Parameterized endpoint families. Order matters: the `members` rule must
/// precede the bare `:slug` rule that shares its prefix.
pub const TEMPLATES: &[EndpointTemplate] = &[
    EndpointTemplate {
        prefix: "statuses/retweets/",
        suffix: None,
        bucket: "statuses/retweets/:id",
    },
    EndpointTemplate {
        prefix: "statuses/show/",
        suffix: None,
        bucket: "statuses/show/:id",
    },
    EndpointTemplate {
        prefix: "users/suggestions/",
        suffix: Some("members"),
        bucket: "users/suggestions/:slug/members",
    },
    EndpointTemplate {
        prefix: "users/suggestions/",
        suffix: None,
        bucket: "users/suggestions/:slug",
    },
];

/// Map a raw endpoint to its quota bucket key. Total and deterministic.
/// Leading and trailing slashes are ignored.
pub fn normalize(endpoint: &str) -> String {
    let endpoint = endpoint.trim_matches('/');
    TEMPLATES
        .iter()
        .find(|template| template.matches(endpoint))
        .map(|template| template.bucket.to_string())
        .unwrap_or_else(|| endpoint.to_string())
}
