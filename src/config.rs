//! Client configuration: API base, auth mode, endpoint paths and timeouts.
//! Values are built in code or read from `BUILDOPS_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

pub const DEFAULT_LOGIN_PATH: &str = "/api/Token/login";
pub const DEFAULT_REFRESH_PATH: &str = "/api/Token/refresh-token";
pub const DEFAULT_LOGOUT_PATH: &str = "/api/Token/logout";
pub const DEFAULT_TENANT_HEADER: &str = "tenant";

/// How the session credential travels with each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// The client owns the bearer token and refreshes it itself.
    #[default]
    Header,
    /// The browser-style cookie jar owns the session; tokens are never read or written.
    Cookie,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Header => "header",
            AuthMode::Cookie => "cookie",
        }
    }
}

impl FromStr for AuthMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "header" | "bearer" => Ok(AuthMode::Header),
            "cookie" => Ok(AuthMode::Cookie),
            other => Err(anyhow!("unknown auth mode '{}', expected 'header' or 'cookie'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Prefix for every relative request path, without trailing slash.
    pub api_base: String,
    pub auth_mode: AuthMode,
    pub login_path: String,
    pub refresh_path: String,
    pub logout_path: String,
    pub tenant_header: String,
    pub request_timeout: Duration,
    pub refresh_timeout: Duration,
    /// Directory for file-backed session storage; in-memory when unset.
    pub session_dir: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(api_base: impl Into<String>) -> Self {
        let base: String = api_base.into();
        Self {
            api_base: base.trim_end_matches('/').to_string(),
            auth_mode: AuthMode::Header,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            logout_path: DEFAULT_LOGOUT_PATH.to_string(),
            tenant_header: DEFAULT_TENANT_HEADER.to_string(),
            request_timeout: Duration::from_secs(60),
            refresh_timeout: Duration::from_secs(30),
            session_dir: None,
        }
    }

    pub fn with_auth_mode(mut self, mode: AuthMode) -> Self { self.auth_mode = mode; self }
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self { self.request_timeout = timeout; self }
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self { self.refresh_timeout = timeout; self }
    pub fn with_session_dir(mut self, dir: impl Into<PathBuf>) -> Self { self.session_dir = Some(dir.into()); self }
    pub fn with_tenant_header(mut self, name: impl Into<String>) -> Self { self.tenant_header = name.into(); self }

    pub fn with_endpoints(mut self, login: &str, refresh: &str, logout: &str) -> Self {
        self.login_path = login.to_string();
        self.refresh_path = refresh.to_string();
        self.logout_path = logout.to_string();
        self
    }

    /// Read configuration from `BUILDOPS_*` variables. Only the API base is required.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_base(None)
    }

    /// [`from_env`](Self::from_env) with `api_base` (when given) taking precedence over
    /// `BUILDOPS_API_BASE`. Every other variable still applies.
    pub fn from_env_with_base(api_base: Option<String>) -> Result<Self> {
        Self::from_lookup(api_base, |key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(api_base: Option<String>, get: F) -> Result<Self> {
        let base = api_base
            .or_else(|| get("BUILDOPS_API_BASE"))
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("BUILDOPS_API_BASE is not set"))?;
        let mut cfg = Self::new(base);
        if let Some(mode) = get("BUILDOPS_AUTH_MODE") {
            cfg.auth_mode = mode.parse()?;
        }
        if let Some(ms) = get("BUILDOPS_REQUEST_TIMEOUT_MS") {
            let ms: u64 = ms.trim().parse().context("BUILDOPS_REQUEST_TIMEOUT_MS must be milliseconds")?;
            cfg.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = get("BUILDOPS_REFRESH_TIMEOUT_MS") {
            let ms: u64 = ms.trim().parse().context("BUILDOPS_REFRESH_TIMEOUT_MS must be milliseconds")?;
            cfg.refresh_timeout = Duration::from_millis(ms);
        }
        if let Some(dir) = get("BUILDOPS_SESSION_DIR").filter(|s| !s.trim().is_empty()) {
            cfg.session_dir = Some(PathBuf::from(dir));
        }
        Ok(cfg)
    }

    /// Absolute URLs pass through; relative paths get the API base with a single `/` between.
    pub fn resolve_url(&self, path: &str) -> String {
        let lower = path.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }
}
