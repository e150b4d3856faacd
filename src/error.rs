//! Unified client error model.
//! Every call made through [`crate::http::HttpClient`] and the session manager
//! resolves to one of these variants; callers decide how to present them.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The request never reached the server or the response never came back.
    #[error("network error: {message}")]
    Network { message: String },

    /// The server answered with a non-2xx status.
    #[error("http {status}: {body}")]
    Http { status: u16, body: Value },

    /// The caller cancelled the request.
    #[error("request aborted")]
    Aborted,

    /// The login endpoint rejected the credentials.
    #[error("login rejected: {}", messages.join("; "))]
    Login { messages: Vec<String> },

    #[error("invalid url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("encode error: {message}")]
    Encode { message: String },

    #[error("decode error: {message}")]
    Decode { message: String },
}

impl ClientError {
    pub fn network<S: Into<String>>(msg: S) -> Self { ClientError::Network { message: msg.into() } }
    pub fn http(status: u16, body: Value) -> Self { ClientError::Http { status, body } }
    pub fn encode<S: Into<String>>(msg: S) -> Self { ClientError::Encode { message: msg.into() } }
    pub fn decode<S: Into<String>>(msg: S) -> Self { ClientError::Decode { message: msg.into() } }

    pub fn code_str(&self) -> &'static str {
        match self {
            ClientError::Network { .. } => "network_error",
            ClientError::Http { .. } => "http_error",
            ClientError::Aborted => "aborted",
            ClientError::Login { .. } => "login_rejected",
            ClientError::InvalidUrl { .. } => "invalid_url",
            ClientError::Encode { .. } => "encode_error",
            ClientError::Decode { .. } => "decode_error",
        }
    }

    /// HTTP status when the server answered, `None` for client-side failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool { self.status() == Some(401) }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return ClientError::encode(err.to_string());
        }
        if err.is_decode() {
            return ClientError::decode(err.to_string());
        }
        ClientError::network(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::decode(err.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
