//! Session state owned by the client: tokens, tenant, decoded claims and the
//! login/sign-out lifecycle. Each piece is an explicit object handed to the
//! HTTP client, never a process-wide global.

pub mod storage;
pub(crate) mod token_store;
mod tenant;
mod claims;
mod manager;

pub use storage::{FileStorage, MemoryStorage, SessionStorage, StorageError};
pub use token_store::{TokenPair, TokenStore};
pub use tenant::TenantContext;
pub use claims::{decode_claims, unsigned_token, ClaimsReader, SessionClaims};
pub use manager::{AuthSessionManager, CacheInvalidator, Credentials, InvalidationReason, SessionState};
