use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::config::AuthMode;
use super::storage::{SessionStorage, TOKENS_KEY};

/// Access/refresh credential pair. Persisted as `{ jwt, refreshToken, refreshTokenExpirationDate }`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "jwt")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(
        rename = "refreshTokenExpirationDate",
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into(), refresh_token: refresh_token.into(), refresh_expires_at: None }
    }

    pub fn with_refresh_expiry(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.refresh_expires_at = at;
        self
    }

    /// Both halves present. A pair missing either one is treated as no pair at all.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

/// Accepts RFC 3339 and offset-less ISO timestamps (read as UTC); anything else becomes `None`.
pub(crate) fn lenient_timestamp<'de, D>(de: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(de)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() { return None; }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Holds the current [`TokenPair`] in memory and mirrors it to session storage.
///
/// In cookie auth mode the store is inert: `get` always yields `None` and `set` does nothing.
pub struct TokenStore {
    cache: RwLock<Option<TokenPair>>,
    storage: Arc<dyn SessionStorage>,
    mode: AuthMode,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn SessionStorage>, mode: AuthMode) -> Self {
        Self { cache: RwLock::new(None), storage, mode }
    }

    pub fn get(&self) -> Option<TokenPair> {
        if self.mode == AuthMode::Cookie { return None; }
        if let Some(pair) = self.cache.read().as_ref() {
            return Some(pair.clone());
        }
        let mut cache = self.cache.write();
        // another caller may have loaded it while we waited for the write lock
        if let Some(pair) = cache.as_ref() {
            return Some(pair.clone());
        }
        let loaded = self.load_persisted();
        *cache = loaded.clone();
        loaded
    }

    pub fn access_token(&self) -> Option<String> {
        self.get().map(|p| p.access_token)
    }

    /// Replace the pair wholesale. `None` (or an incomplete pair) clears memory and storage.
    pub fn set(&self, pair: Option<TokenPair>) {
        if self.mode == AuthMode::Cookie {
            debug!(target: "buildops::session", "token store is inert in cookie mode; ignoring set");
            return;
        }
        let pair = pair.filter(TokenPair::is_complete);
        let mut cache = self.cache.write();
        self.persist(pair.as_ref());
        *cache = pair;
    }

    /// Replace the pair only while the store still holds `expected`; returns whether it did.
    /// Check and write happen under one lock.
    pub fn replace_if_current(&self, expected: &TokenPair, next: Option<TokenPair>) -> bool {
        if self.mode == AuthMode::Cookie { return false; }
        let next = next.filter(TokenPair::is_complete);
        let mut cache = self.cache.write();
        if cache.is_none() {
            *cache = self.load_persisted();
        }
        if cache.as_ref() != Some(expected) {
            return false;
        }
        self.persist(next.as_ref());
        *cache = next;
        true
    }

    fn persist(&self, pair: Option<&TokenPair>) {
        let persisted = match pair {
            Some(p) => serde_json::to_string(p)
                .map_err(|e| e.to_string())
                .and_then(|blob| self.storage.write(TOKENS_KEY, &blob).map_err(|e| e.to_string())),
            None => self.storage.remove(TOKENS_KEY).map_err(|e| e.to_string()),
        };
        if let Err(e) = persisted {
            warn!(target: "buildops::session", "failed to mirror tokens to session storage: {}", e);
        }
    }

    pub fn clear(&self) { self.set(None); }

    fn load_persisted(&self) -> Option<TokenPair> {
        let blob = match self.storage.read(TOKENS_KEY) {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(e) => {
                warn!(target: "buildops::session", "failed to read persisted tokens: {}", e);
                return None;
            }
        };
        match serde_json::from_str::<TokenPair>(&blob) {
            Ok(pair) if pair.is_complete() => Some(pair),
            Ok(_) => None,
            Err(e) => {
                warn!(target: "buildops::session", "ignoring unreadable persisted tokens: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::storage::MemoryStorage;
    use chrono::TimeZone;

    fn store_over(storage: &Arc<MemoryStorage>) -> TokenStore {
        TokenStore::new(storage.clone(), AuthMode::Header)
    }

    #[test]
    fn set_then_reload_from_storage_round_trips() {
        let storage = Arc::new(MemoryStorage::new());
        let expiry = Utc.with_ymd_and_hms(2026, 11, 1, 8, 30, 0).unwrap();
        let pair = TokenPair::new("A", "R1").with_refresh_expiry(Some(expiry));
        store_over(&storage).set(Some(pair.clone()));

        let fresh = store_over(&storage);
        assert_eq!(fresh.get(), Some(pair));

        fresh.set(None);
        assert_eq!(store_over(&storage).get(), None);
        assert_eq!(storage.read(TOKENS_KEY).unwrap(), None);
    }

    #[test]
    fn persisted_blob_uses_wire_names() {
        let storage = Arc::new(MemoryStorage::new());
        store_over(&storage).set(Some(TokenPair::new("A", "R1")));
        let blob: serde_json::Value = serde_json::from_str(&storage.read(TOKENS_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(blob["jwt"], "A");
        assert_eq!(blob["refreshToken"], "R1");
    }

    #[test]
    fn incomplete_pair_is_never_stored() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_over(&storage);
        store.set(Some(TokenPair::new("A", "R1")));
        store.set(Some(TokenPair::new("B", "")));
        assert_eq!(store.get(), None);
        assert_eq!(storage.read(TOKENS_KEY).unwrap(), None);
    }

    #[test]
    fn corrupt_blob_reads_as_none() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write(TOKENS_KEY, "{not json").unwrap();
        assert_eq!(store_over(&storage).get(), None);
        storage.write(TOKENS_KEY, r#"{"jwt":"A"}"#).unwrap();
        assert_eq!(store_over(&storage).get(), None);
    }

    #[test]
    fn dotnet_style_expiry_without_offset() {
        let blob = r#"{"jwt":"A","refreshToken":"R","refreshTokenExpirationDate":"2026-10-23T10:00:00.123"}"#;
        let pair: TokenPair = serde_json::from_str(blob).unwrap();
        let at = pair.refresh_expires_at.unwrap();
        assert_eq!(at.timestamp(), Utc.with_ymd_and_hms(2026, 10, 23, 10, 0, 0).unwrap().timestamp());
        assert_eq!(parse_timestamp("garbage"), None);
    }

    #[test]
    fn cookie_mode_is_inert() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write(TOKENS_KEY, r#"{"jwt":"A","refreshToken":"R"}"#).unwrap();
        let store = TokenStore::new(storage.clone(), AuthMode::Cookie);
        assert_eq!(store.get(), None);
        store.set(Some(TokenPair::new("B", "R2")));
        assert!(storage.read(TOKENS_KEY).unwrap().unwrap().contains("\"A\""));
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let s = format!("{:?}", TokenPair::new("secret-access", "secret-refresh"));
        assert!(!s.contains("secret"));
    }

    #[test]
    fn replace_if_current_skips_a_superseded_pair() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_over(&storage);
        let old = TokenPair::new("A", "R1");
        store.set(Some(old.clone()));
        assert!(store.replace_if_current(&old, Some(TokenPair::new("B", "R2"))));
        assert_eq!(store.access_token().as_deref(), Some("B"));

        // a different session took over; the stale outcome is dropped
        store.set(Some(TokenPair::new("L", "R9")));
        assert!(!store.replace_if_current(&old, None));
        assert_eq!(store.access_token().as_deref(), Some("L"));
        assert!(storage.read(TOKENS_KEY).unwrap().unwrap().contains("\"L\""));
    }
}
