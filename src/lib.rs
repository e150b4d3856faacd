//! buildops client core: the authenticated, tenant-aware HTTP client every
//! dashboard call goes through, with transparent single-flight token refresh.

pub mod config;
pub mod error;
pub mod session;
pub mod http;
pub mod cli;

pub use config::{AuthMode, ClientConfig};
pub use error::{ClientError, ClientResult};
pub use http::{HttpClient, RequestBody, RequestOptions};
pub use session::{AuthSessionManager, Credentials, SessionClaims, TokenPair};
