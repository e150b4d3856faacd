//! Authenticated HTTP access to the dashboard API: header injection,
//! transparent 401 recovery through a single-flight refresh, error normalization.

mod client;
mod refresh;
pub(crate) mod transport;

pub use client::{HttpClient, RequestBody, RequestOptions};
pub use refresh::RefreshCoordinator;
pub use transport::AuthEnvelope;
