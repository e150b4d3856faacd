//! Single-flight access token refresh.
//!
//! When several requests are rejected with 401 at about the same time, only one
//! refresh call goes out; every caller waits on that call and sees its outcome.
//! The slot mutex is the only place where "start a refresh" vs "attach to the
//! running one" is decided.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::session::{TokenPair, TokenStore};
use super::transport::{post_unauthenticated, AuthEnvelope};

/// Why a refresh produced no token. Never surfaced to callers: it always ends
/// with the token store cleared and waiters receiving `None`.
#[derive(Debug, Error)]
enum RefreshFailure {
    #[error("refresh transport failed: {0}")]
    Transport(#[from] ClientError),
    #[error("refresh rejected with http {status}: {messages:?}")]
    Rejected { status: u16, messages: Vec<String> },
    #[error("refresh timed out after {0:?}")]
    Timeout(Duration),
}

type Outcome = Option<String>;

struct InFlight {
    generation: u64,
    outcome: watch::Receiver<Option<Outcome>>,
}

struct Inner {
    http: reqwest::Client,
    refresh_url: String,
    timeout: Duration,
    tokens: Arc<TokenStore>,
    slot: Mutex<Option<InFlight>>,
    generations: AtomicU64,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(http: reqwest::Client, refresh_url: String, timeout: Duration, tokens: Arc<TokenStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                refresh_url,
                timeout,
                tokens,
                slot: Mutex::new(None),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Refresh the access token, or join the refresh already running.
    /// Resolves to the new access token, or `None` when there was nothing to
    /// refresh or the refresh failed (the token store is cleared in that case).
    pub async fn ensure_refreshed(&self) -> Option<String> {
        let rx = {
            let mut slot = self.inner.slot.lock();
            match slot.as_ref() {
                Some(running) => {
                    debug!(target: "buildops::refresh", "joining refresh generation {}", running.generation);
                    running.outcome.clone()
                }
                None => {
                    let pair = self.inner.tokens.get().filter(|p| !p.refresh_token.is_empty())?;
                    let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(InFlight { generation, outcome: rx.clone() });
                    let inner = self.inner.clone();
                    tokio::spawn(async move { inner.drive(generation, pair, tx).await });
                    rx
                }
            }
        };
        wait_outcome(rx).await
    }

    /// Like [`ensure_refreshed`](Self::ensure_refreshed), for a request the server rejected
    /// while carrying `rejected`. If the store already holds a different token (a refresh
    /// finished after that request went out), that token is returned without a new refresh.
    pub async fn ensure_refreshed_after(&self, rejected: Option<&str>) -> Option<String> {
        if let Some(current) = self.inner.tokens.access_token() {
            if rejected != Some(current.as_str()) {
                debug!(target: "buildops::refresh", "token already rotated; reusing current token");
                return Some(current);
            }
        }
        self.ensure_refreshed().await
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.slot.lock().is_some()
    }
}

async fn wait_outcome(mut rx: watch::Receiver<Option<Outcome>>) -> Outcome {
    match rx.wait_for(|v| v.is_some()).await {
        Ok(v) => v.clone().flatten(),
        // driver task went away without publishing
        Err(_) => None,
    }
}

impl Inner {
    async fn drive(self: Arc<Self>, generation: u64, pair: TokenPair, tx: watch::Sender<Option<Outcome>>) {
        let result = match tokio::time::timeout(self.timeout, self.call_refresh(&pair)).await {
            Ok(r) => r,
            Err(_) => Err(RefreshFailure::Timeout(self.timeout)),
        };
        // only touch the store if it still holds the pair this refresh started from;
        // otherwise a newer session (a login, say) owns it and waiters get its token
        let outcome = match result {
            Ok(next) => {
                let token = next.access_token.clone();
                if self.tokens.replace_if_current(&pair, Some(next)) {
                    info!(target: "buildops::refresh", "access token refreshed (generation {})", generation);
                    Some(token)
                } else {
                    debug!(target: "buildops::refresh", "session replaced during refresh generation {}; keeping it", generation);
                    self.tokens.access_token()
                }
            }
            Err(e) => {
                if self.tokens.replace_if_current(&pair, None) {
                    warn!(target: "buildops::refresh", "refresh failed, clearing session: {}", e);
                    None
                } else {
                    warn!(target: "buildops::refresh", "refresh failed after the session was replaced: {}", e);
                    self.tokens.access_token()
                }
            }
        };
        tx.send_replace(Some(outcome));
        // Keep the handle for the rest of this tick so callers failing right now still join it.
        tokio::task::yield_now().await;
        self.release(generation);
    }

    fn release(&self, generation: u64) {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(|f| f.generation) == Some(generation) {
            *slot = None;
        }
    }

    async fn call_refresh(&self, pair: &TokenPair) -> Result<TokenPair, RefreshFailure> {
        let mut body = Map::new();
        body.insert("currentJWT".into(), Value::String(pair.access_token.clone()));
        body.insert("currentRefreshToken".into(), Value::String(pair.refresh_token.clone()));
        if let Some(at) = pair.refresh_expires_at {
            body.insert("refreshTokenExpirationDate".into(), Value::String(at.to_rfc3339()));
        }
        let (status, value) = post_unauthenticated(&self.http, &self.refresh_url, &Value::Object(body)).await?;
        let envelope: AuthEnvelope = if (200..300).contains(&status) {
            serde_json::from_value(value).map_err(ClientError::from)?
        } else {
            let messages = serde_json::from_value::<AuthEnvelope>(value).map(|e| e.messages()).unwrap_or_default();
            return Err(RefreshFailure::Rejected { status, messages });
        };
        envelope
            .token_pair()
            .ok_or_else(|| RefreshFailure::Rejected { status, messages: envelope.messages() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthMode;
    use crate::session::storage::MemoryStorage;

    fn coordinator() -> RefreshCoordinator {
        let tokens = Arc::new(TokenStore::new(Arc::new(MemoryStorage::new()), AuthMode::Header));
        tokens.set(Some(TokenPair::new("A", "R1")));
        // nothing listens here; a refresh that actually went out would fail and clear the store
        RefreshCoordinator::new(reqwest::Client::new(), "http://127.0.0.1:9/refresh".into(), Duration::from_secs(1), tokens)
    }

    fn occupy(c: &RefreshCoordinator, generation: u64, value: Option<Outcome>) -> watch::Sender<Option<Outcome>> {
        let (tx, rx) = watch::channel(value);
        *c.inner.slot.lock() = Some(InFlight { generation, outcome: rx });
        tx
    }

    #[tokio::test]
    async fn settled_handle_is_joined_until_released() {
        let c = coordinator();
        let _tx = occupy(&c, 1, Some(Some("B".to_string())));

        assert_eq!(c.ensure_refreshed().await.as_deref(), Some("B"));
        assert_eq!(c.ensure_refreshed().await.as_deref(), Some("B"));
        // joined, nothing started: the store is untouched
        assert_eq!(c.inner.tokens.access_token().as_deref(), Some("A"));
        assert!(c.is_refreshing());
    }

    #[test]
    fn stale_release_leaves_newer_slot_alone() {
        let c = coordinator();
        let _tx = occupy(&c, 2, None);

        c.inner.release(1);
        assert!(c.is_refreshing());
        assert_eq!(c.inner.slot.lock().as_ref().map(|f| f.generation), Some(2));

        c.inner.release(2);
        assert!(!c.is_refreshing());
    }
}
