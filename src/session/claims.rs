//! Read-only view of the signed-in user, decoded from the access token.
//!
//! The signature and expiry are NOT verified here. Claims are advisory and only
//! drive UI decisions such as which menus to show; every authorization decision
//! is re-validated by the server.

use std::collections::BTreeSet;
use std::sync::Arc;

use base64::Engine;
use serde::Serialize;
use serde_json::{Map, Value};

use super::token_store::TokenStore;

const ROLE_CLAIM: &str = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";
const NAME_ID_CLAIM: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";
const EMAIL_CLAIM: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress";
const GIVEN_NAME_CLAIM: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/givenname";
const SURNAME_CLAIM: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/surname";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionClaims {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub role: Option<String>,
    pub tenant: Option<String>,
    pub permissions: BTreeSet<String>,
    /// Expiry as epoch seconds; 0 when the token carries none.
    pub exp: i64,
}

impl SessionClaims {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn is_expired(&self, now_epoch_secs: i64) -> bool {
        self.exp > 0 && self.exp <= now_epoch_secs
    }
}

/// Decodes claims from whatever access token the store holds at the moment of the call.
#[derive(Clone)]
pub struct ClaimsReader {
    tokens: Arc<TokenStore>,
}

impl ClaimsReader {
    pub fn new(tokens: Arc<TokenStore>) -> Self { Self { tokens } }

    pub fn current_user(&self) -> Option<SessionClaims> {
        let pair = self.tokens.get()?;
        decode_claims(&pair.access_token)
    }
}

/// Decode the payload segment of a JWT. `None` for anything that is not a three-part
/// token with a base64url JSON object in the middle.
pub fn decode_claims(token: &str) -> Option<SessionClaims> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() { return None; }
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let Value::Object(map) = serde_json::from_slice::<Value>(&bytes).ok()? else { return None; };

    Some(SessionClaims {
        user_id: first_string(&map, &["nameid", "sub", NAME_ID_CLAIM, "userId"]).unwrap_or_default(),
        email: first_string(&map, &["email", EMAIL_CLAIM]).unwrap_or_default(),
        name: first_string(&map, &["given_name", "name", GIVEN_NAME_CLAIM]).unwrap_or_default(),
        surname: first_string(&map, &["family_name", "surname", SURNAME_CLAIM]).unwrap_or_default(),
        role: first_string(&map, &[ROLE_CLAIM, "role", "roles"]),
        tenant: first_string(&map, &["tenant", "tenantId", "TenantId"]),
        permissions: string_set(&map, &["permissions", "permission", "Permission"]),
        exp: map.get("exp").and_then(as_epoch).unwrap_or(0),
    })
}

// strings as-is, arrays by first string element, numbers stringified
fn first_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match map.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.iter().find_map(|v| v.as_str().filter(|s| !s.is_empty()).map(str::to_string)),
        _ => None,
    })
}

fn string_set(map: &Map<String, Value>, keys: &[&str]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for k in keys {
        match map.get(*k) {
            Some(Value::String(s)) if !s.is_empty() => { out.insert(s.clone()); }
            Some(Value::Array(items)) => {
                out.extend(items.iter().filter_map(|v| v.as_str()).filter(|s| !s.is_empty()).map(str::to_string));
            }
            _ => {}
        }
    }
    out
}

fn as_epoch(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Build an unsigned token around `payload`. Tests and mock backends only need a decodable shape.
pub fn unsigned_token(payload: &Value) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = engine.encode(payload.to_string().as_bytes());
    format!("{}.{}.sig", header, body)
}
