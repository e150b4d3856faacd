use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;
use tracing::{info, warn};

use crate::config::AuthMode;
use crate::error::{ClientError, ClientResult};
use crate::http::transport::{post_unauthenticated, AuthEnvelope};
use crate::http::HttpClient;
use super::claims::{decode_claims, ClaimsReader, SessionClaims};

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("username", &self.username).field("password", &"<redacted>").finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated(SessionClaims),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    SignedOut,
    TenantSwitched,
}

/// Hook for caches keyed by session or tenant (the data-fetch layer registers one).
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, reason: InvalidationReason);
}

/// Login, bootstrap and sign-out on top of an [`HttpClient`].
pub struct AuthSessionManager {
    client: HttpClient,
    claims: ClaimsReader,
    state: RwLock<SessionState>,
    invalidators: RwLock<Vec<Arc<dyn CacheInvalidator>>>,
}

impl AuthSessionManager {
    pub fn new(client: HttpClient) -> Self {
        let claims = ClaimsReader::new(client.tokens().clone());
        Self {
            client,
            claims,
            state: RwLock::new(SessionState::Anonymous),
            invalidators: RwLock::new(Vec::new()),
        }
    }

    pub fn client(&self) -> &HttpClient { &self.client }

    pub fn register_invalidator(&self, hook: Arc<dyn CacheInvalidator>) {
        self.invalidators.write().push(hook);
    }

    fn header_mode(&self) -> bool { self.client.config().auth_mode == AuthMode::Header }

    pub async fn login(&self, creds: &Credentials) -> ClientResult<SessionClaims> {
        let cfg = self.client.config();
        let url = cfg.resolve_url(&cfg.login_path);
        let body = json!({ "username": creds.username, "password": creds.password });
        let (status, value) = post_unauthenticated(self.client.raw_http(), &url, &body).await?;
        let envelope: AuthEnvelope = serde_json::from_value(value.clone()).unwrap_or_default();

        if !(200..300).contains(&status) {
            let messages = envelope.messages();
            return Err(if messages.is_empty() { ClientError::http(status, value) } else { ClientError::Login { messages } });
        }
        if !envelope.is_successfull {
            return Err(ClientError::Login { messages: envelope.messages() });
        }

        let claims = if self.header_mode() {
            let pair = envelope.token_pair().ok_or_else(|| ClientError::Login {
                messages: vec!["login response carried no token pair".to_string()],
            })?;
            self.client.tokens().set(Some(pair));
            match self.claims.current_user() {
                Some(c) => c,
                None => {
                    self.client.tokens().clear();
                    return Err(ClientError::decode("access token carries no readable claims"));
                }
            }
        } else {
            // the cookie jar holds the session; the body jwt is only read for display claims
            envelope
                .jwt
                .as_deref()
                .and_then(decode_claims)
                .unwrap_or_else(|| SessionClaims { user_id: creds.username.clone(), ..Default::default() })
        };

        self.adopt_tenant(&claims);
        *self.state.write() = SessionState::Authenticated(claims.clone());
        info!(target: "buildops::session", "signed in user_id={} mode={}", claims.user_id, cfg.auth_mode.as_str());
        Ok(claims)
    }

    /// Restore a session from stored tokens without touching the network.
    pub fn bootstrap(&self) -> Option<SessionClaims> {
        match self.claims.current_user() {
            Some(claims) => {
                self.adopt_tenant(&claims);
                *self.state.write() = SessionState::Authenticated(claims.clone());
                info!(target: "buildops::session", "session restored user_id={}", claims.user_id);
                Some(claims)
            }
            None => {
                *self.state.write() = SessionState::Anonymous;
                None
            }
        }
    }

    /// Forget the session: server-side logout in cookie mode (best effort), then
    /// cookies, tokens, tenant and the storage session, then cache hooks.
    pub async fn sign_out(&self) {
        if !self.header_mode() {
            let path = self.client.config().logout_path.clone();
            if let Err(e) = self.client.post(&path, json!({})).await {
                warn!(target: "buildops::session", "logout call failed: {}", e);
            }
        }
        // the jar is emptied even if the logout call failed
        self.client.clear_cookies();
        self.client.tokens().clear();
        self.client.tenant().clear();
        self.client.end_session();
        self.notify(InvalidationReason::SignedOut);
        *self.state.write() = SessionState::Anonymous;
        info!(target: "buildops::session", "signed out");
    }

    pub fn switch_tenant(&self, tenant_id: &str) {
        self.client.tenant().set(Some(tenant_id));
        self.notify(InvalidationReason::TenantSwitched);
        info!(target: "buildops::session", "switched tenant to {}", tenant_id);
    }

    /// Current state. In header mode a session whose tokens were cleared (for
    /// example by a failed refresh) reads as anonymous from here on.
    pub fn state(&self) -> SessionState {
        if self.header_mode() {
            let current = self.claims.current_user();
            let mut state = self.state.write();
            match (current, &*state) {
                (None, SessionState::Authenticated(_)) => *state = SessionState::Anonymous,
                (Some(c), SessionState::Authenticated(_)) => *state = SessionState::Authenticated(c),
                _ => {}
            }
            return state.clone();
        }
        self.state.read().clone()
    }

    pub fn is_authed(&self) -> bool {
        matches!(self.state(), SessionState::Authenticated(_))
    }

    pub fn current_user(&self) -> Option<SessionClaims> {
        match self.state() {
            SessionState::Authenticated(c) => Some(c),
            SessionState::Anonymous => None,
        }
    }

    fn adopt_tenant(&self, claims: &SessionClaims) {
        if self.client.tenant().get().is_none() {
            if let Some(t) = claims.tenant.as_deref() {
                self.client.tenant().set(Some(t));
            }
        }
    }

    fn notify(&self, reason: InvalidationReason) {
        let hooks = self.invalidators.read().clone();
        for hook in hooks {
            hook.invalidate(reason);
        }
    }
}
