//! Unauthenticated request path and body handling shared by the client,
//! the refresh coordinator and login.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::session::token_store::lenient_timestamp;
use crate::session::TokenPair;

/// Response envelope of the login and refresh endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEnvelope {
    #[serde(default)]
    pub jwt: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub refresh_token_expiration_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Option<Vec<String>>,
    // the backend spells it this way
    #[serde(default, rename = "isSuccessfull")]
    pub is_successfull: bool,
}

impl AuthEnvelope {
    pub fn messages(&self) -> Vec<String> {
        self.messages.clone().unwrap_or_default()
    }

    /// The pair carried by a successful envelope, if both tokens are present.
    pub fn token_pair(&self) -> Option<TokenPair> {
        if !self.is_successfull { return None; }
        let pair = TokenPair::new(self.jwt.clone()?, self.refresh_token.clone()?)
            .with_refresh_expiry(self.refresh_token_expiration_date);
        pair.is_complete().then_some(pair)
    }
}

/// POST a JSON body with only the JSON content headers: no bearer, no tenant.
/// Returns the status and the interpreted body; non-2xx is not an error here.
pub(crate) async fn post_unauthenticated(
    http: &reqwest::Client,
    url: &str,
    body: &Value,
) -> ClientResult<(u16, Value)> {
    debug!(target: "buildops::http", "POST {} (unauthenticated)", url);
    let resp = http
        .post(url)
        .header(ACCEPT, HeaderValue::from_static("application/json"))
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .body(body.to_string())
        .send()
        .await
        .map_err(ClientError::from)?;
    let status = resp.status().as_u16();
    let value = read_body(resp).await?;
    Ok((status, value))
}

pub(crate) async fn read_body(resp: reqwest::Response) -> ClientResult<Value> {
    let status = resp.status().as_u16();
    let is_json = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false);
    let text = resp.text().await.map_err(|e| ClientError::network(e.to_string()))?;
    interpret_body(status, is_json, text)
}

/// 204 or empty → `Null`. Otherwise JSON when it parses, raw text when it does not.
/// A success response that claims JSON but fails to parse is a decode error.
pub(crate) fn interpret_body(status: u16, is_json: bool, text: String) -> ClientResult<Value> {
    if status == 204 || text.trim().is_empty() {
        return Ok(Value::Null);
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(v) => Ok(v),
        Err(e) if is_json && (200..300).contains(&status) => Err(ClientError::decode(e.to_string())),
        Err(_) => Ok(Value::String(text)),
    }
}
