//! Upstream endpoints and OAuth constants
//!
//! Public values only. Consumer secrets, token secrets and bearer tokens live
//! in `AuthKeys` and the per-credential caches.

/// Prefix for every REST endpoint. Endpoints are appended as `<name>.json`.
pub const API_BASE: &str = "https://api.twitter.com/1.1/";

/// Application-only auth token endpoint (OAuth2 client credentials grant)
pub const TOKEN_ENDPOINT: &str = "https://api.twitter.com/oauth2/token";

/// Form body of the client credentials exchange
pub const CLIENT_CREDENTIALS_BODY: &str = "grant_type=client_credentials";

/// Content type the token endpoint requires for the exchange
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

/// OAuth 1.0a signature method used for user auth
pub const OAUTH_SIGNATURE_METHOD: &str = "HMAC-SHA1";

/// OAuth protocol version sent with every user-auth request
pub const OAUTH_VERSION: &str = "1.0";
