//! Configuration types and loading
//!
//! Config precedence: `--config` argument > `KURUVI_CONFIG` env var >
//! `kuruvi.toml`. Key sets come from `[[credentials]]` entries and, if set,
//! a JSON key file. The rate-limit table starts from the built-in published
//! limits (or a JSON file replacing them) with `[[rate_limits]]` entries
//! overriding by endpoint.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kuruvi_auth::{API_BASE, AuthKeys, AuthType, TOKEN_ENDPOINT};
use kuruvi_pool::{
    DEFAULT_FALLBACK_QUOTA, DEFAULT_WINDOW, QuotaSettings, RateLimit, default_rate_limits,
    merge_rate_limits,
};
use serde::Deserialize;
use url::Url;

/// Longest accepted quota window (one day).
pub const MAX_WINDOW_SECS: u64 = 24 * 60 * 60;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub credentials: Vec<AuthKeys>,
    /// Entries from the `[[rate_limits]]` tables.
    #[serde(default, rename = "rate_limits")]
    pub rate_limit_overrides: Vec<RateLimit>,
    /// Effective rate-limit table, resolved by `load`.
    #[serde(skip)]
    pub rate_limits: Vec<RateLimit>,
}

/// Upstream and quota settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token_url: String,
    pub timeout_secs: u64,
    pub window_secs: u64,
    pub fallback_quota: u32,
    pub auth_mode: AuthMode,
    /// JSON array of rate-limit records replacing the built-in table.
    pub rate_limits_file: Option<PathBuf>,
    /// JSON array of key sets, appended to `[[credentials]]`.
    pub credentials_file: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: API_BASE.into(),
            token_url: TOKEN_ENDPOINT.into(),
            timeout_secs: 30,
            window_secs: DEFAULT_WINDOW.as_secs(),
            fallback_quota: DEFAULT_FALLBACK_QUOTA,
            auth_mode: AuthMode::default(),
            rate_limits_file: None,
            credentials_file: None,
        }
    }
}

/// Which credentials each key set contributes to the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    App,
    User,
    /// App and user credentials from every key set, pooling both quotas.
    #[default]
    Both,
}

impl AuthMode {
    pub fn auth_types(&self) -> &'static [AuthType] {
        match self {
            AuthMode::App => &[AuthType::App],
            AuthMode::User => &[AuthType::User],
            AuthMode::Both => &[AuthType::App, AuthType::User],
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file, including any key
    /// or rate-limit files it references.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text. Referenced files are
    /// read relative to the working directory.
    pub fn from_toml(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if let Some(ref path) = config.api.credentials_file {
            let keys: Vec<AuthKeys> = read_json(path, "credentials_file")?;
            config.credentials.extend(keys);
        }

        let base = match config.api.rate_limits_file {
            Some(ref path) => read_json(path, "rate_limits_file")?,
            None => default_rate_limits(),
        };
        let overrides = std::mem::take(&mut config.rate_limit_overrides);
        config.rate_limits = merge_rate_limits(base, overrides);

        config.validate()?;
        Ok(config)
    }

    /// Resolve config file path from CLI arg or KURUVI_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("KURUVI_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("kuruvi.toml")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn quota_settings(&self) -> QuotaSettings {
        QuotaSettings {
            window: Duration::from_secs(self.api.window_secs),
            fallback_quota: self.api.fallback_quota,
        }
    }

    fn validate(&self) -> common::Result<()> {
        validate_url("base_url", &self.api.base_url)?;
        validate_url("token_url", &self.api.token_url)?;

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.api.window_secs == 0 {
            return Err(common::Error::Config(
                "window_secs must be greater than 0".into(),
            ));
        }
        if self.api.window_secs > MAX_WINDOW_SECS {
            return Err(common::Error::Config(format!(
                "window_secs must be at most {MAX_WINDOW_SECS}, got: {}",
                self.api.window_secs
            )));
        }
        if self.api.fallback_quota == 0 {
            return Err(common::Error::Config(
                "fallback_quota must be greater than 0".into(),
            ));
        }

        if self.credentials.is_empty() {
            return Err(common::Error::Config(
                "at least one credential is required".into(),
            ));
        }

        for (index, keys) in self.credentials.iter().enumerate() {
            if keys.consumer_key.is_empty() || keys.consumer_secret.expose().is_empty() {
                return Err(common::Error::Config(format!(
                    "credential {index}: consumer_key and consumer_secret are required"
                )));
            }
            if self.api.auth_mode == AuthMode::User && !keys.supports_user_auth() {
                return Err(common::Error::Config(format!(
                    "credential {index}: auth_mode \"user\" needs access_token_key and \
                     access_token_secret"
                )));
            }
        }

        for limit in &self.rate_limits {
            for auth_type in self.api.auth_mode.auth_types() {
                if limit.quota_for(*auth_type) == 0 {
                    return Err(common::Error::Config(format!(
                        "rate limit for {} has a zero {auth_type} quota",
                        limit.endpoint
                    )));
                }
            }
        }

        Ok(())
    }
}

fn validate_url(field: &str, value: &str) -> common::Result<()> {
    let url = Url::parse(value).map_err(|e| {
        common::Error::Config(format!("{field} is not a valid URL ({e}), got: {value}"))
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )));
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, field: &str) -> common::Result<T> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        common::Error::Config(format!("failed to read {field} {}: {e}", path.display()))
    })?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that mutate KURUVI_CONFIG.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kuruvi-config-test-{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    const KEYS: &str = r#"
[[credentials]]
consumer_key = "ck"
consumer_secret = "cs"
access_token_key = "atk"
access_token_secret = "ats"
"#;

    #[test]
    fn test_defaults_with_one_credential() {
        let config = Config::from_toml(KEYS).unwrap();
        assert_eq!(config.api.base_url, "https://api.twitter.com/1.1/");
        assert_eq!(config.api.token_url, "https://api.twitter.com/oauth2/token");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.quota_settings().window, Duration::from_secs(900));
        assert_eq!(config.quota_settings().fallback_quota, 15);
        assert_eq!(config.api.auth_mode, AuthMode::Both);
        assert_eq!(config.credentials.len(), 1);
        assert_eq!(config.rate_limits.len(), 36);
    }

    #[test]
    fn test_load_from_file() {
        let dir = test_dir("load");
        let path = dir.join("kuruvi.toml");
        let toml = format!("[api]\nauth_mode = \"user\"\ntimeout_secs = 5\n{KEYS}");
        std::fs::write(&path, toml).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.auth_mode, AuthMode::User);
        assert_eq!(config.timeout(), Duration::from_secs(5));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/kuruvi.toml"));
        assert!(matches!(result, Err(common::Error::Io(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml("not valid {{{{ toml");
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_no_credentials_rejected() {
        let err = Config::from_toml("[api]\ntimeout_secs = 10\n").unwrap_err();
        assert!(err.to_string().contains("at least one credential"), "got: {err}");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let toml = format!("[api]\nbase_url = \"ftp://api.twitter.com/1.1/\"\n{KEYS}");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("base_url"), "got: {err}");

        let toml = format!("[api]\ntoken_url = \"api.twitter.com/oauth2/token\"\n{KEYS}");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("token_url"), "got: {err}");
    }

    #[test]
    fn test_zero_settings_rejected() {
        for field in ["timeout_secs", "window_secs", "fallback_quota"] {
            let toml = format!("[api]\n{field} = 0\n{KEYS}");
            let err = Config::from_toml(&toml).unwrap_err();
            assert!(err.to_string().contains(field), "got: {err}");
        }
    }

    #[test]
    fn test_oversized_window_rejected() {
        let toml = format!("[api]\nwindow_secs = 9223372036854775807\n{KEYS}");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("window_secs must be at most"), "got: {err}");

        let toml = format!("[api]\nwindow_secs = {MAX_WINDOW_SECS}\n{KEYS}");
        assert!(Config::from_toml(&toml).is_ok());
    }

    #[test]
    fn test_user_mode_requires_access_tokens() {
        let toml = r#"
[api]
auth_mode = "user"

[[credentials]]
consumer_key = "ck"
consumer_secret = "cs"
"#;
        let err = Config::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("access_token_key"), "got: {err}");

        // The same key set is fine for app auth
        let app = toml.replace("\"user\"", "\"app\"");
        assert!(Config::from_toml(&app).is_ok());
    }

    #[test]
    fn test_rate_limit_overrides_merge_by_endpoint() {
        let toml = format!(
            r#"{KEYS}
[[rate_limits]]
endpoint = "search/tweets"
category = "search"
app_quota = 10
user_quota = 5

[[rate_limits]]
endpoint = "custom/endpoint"
app_quota = 1
user_quota = 1
"#
        );
        let config = Config::from_toml(&toml).unwrap();
        assert_eq!(config.rate_limits.len(), 37);
        let search = config.rate_limits.iter().find(|l| l.endpoint == "search/tweets").unwrap();
        assert_eq!((search.app_quota, search.user_quota), (10, 5));
        assert_eq!(search.method, "GET");
    }

    #[test]
    fn test_zero_quota_rejected_only_for_auth_types_in_use() {
        let limits = r#"
[[rate_limits]]
endpoint = "help/tos"
app_quota = 0
user_quota = 15
"#;
        let both = format!("{KEYS}{limits}");
        let err = Config::from_toml(&both).unwrap_err();
        assert!(err.to_string().contains("zero app quota"), "got: {err}");

        let user = format!("[api]\nauth_mode = \"user\"\n{KEYS}{limits}");
        assert!(Config::from_toml(&user).is_ok());
    }

    #[test]
    fn test_credentials_and_rate_limit_files() {
        let dir = test_dir("files");
        let keys_path = dir.join("auth.json");
        std::fs::write(
            &keys_path,
            r#"[
                {
                    "consumerKey": "k1",
                    "consumerSecret": "s1",
                    "accessTokenKey": "t1",
                    "accessTokenSecret": "ts1"
                },
                {"consumerKey": "k2", "consumerSecret": "s2"}
            ]"#,
        )
        .unwrap();
        let limits_path = dir.join("rate_limits.json");
        std::fs::write(
            &limits_path,
            r#"[{
                "Method": "GET",
                "EndPoint": "users/show",
                "Category": "users",
                "UserLimit": 900,
                "AppLimit": 900
            }]"#,
        )
        .unwrap();

        let toml = format!(
            "[api]\ncredentials_file = \"{}\"\nrate_limits_file = \"{}\"\n{KEYS}",
            keys_path.display(),
            limits_path.display()
        );
        let config = Config::from_toml(&toml).unwrap();
        assert_eq!(config.credentials.len(), 3);
        assert_eq!(config.credentials[1].consumer_key, "k1");
        assert!(!config.credentials[2].supports_user_auth());
        assert_eq!(
            config.rate_limits,
            vec![RateLimit::new("GET", "users/show", "users", 900, 900)]
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_credentials_file() {
        let toml = format!("[api]\ncredentials_file = \"/nonexistent/auth.json\"\n{KEYS}");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("credentials_file"), "got: {err}");
    }

    #[test]
    fn test_secrets_redacted_in_debug() {
        let config = Config::from_toml(KEYS).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("\"cs\""));
        assert!(!debug.contains("\"ats\""));
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("KURUVI_CONFIG", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));

        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over KURUVI_CONFIG"
        );
        unsafe { remove_env("KURUVI_CONFIG") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("KURUVI_CONFIG") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("kuruvi.toml"));
    }
}
