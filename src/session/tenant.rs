use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::storage::{SessionStorage, TENANT_KEY};

/// Currently selected tenant, persisted apart from the tokens so a session can
/// switch tenants without signing in again.
pub struct TenantContext {
    cache: RwLock<Option<String>>,
    storage: Arc<dyn SessionStorage>,
}

impl TenantContext {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { cache: RwLock::new(None), storage }
    }

    pub fn get(&self) -> Option<String> {
        if let Some(id) = self.cache.read().as_ref() {
            return Some(id.clone());
        }
        let mut cache = self.cache.write();
        if cache.is_none() {
            *cache = match self.storage.read(TENANT_KEY) {
                Ok(v) => v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
                Err(e) => {
                    warn!(target: "buildops::session", "failed to read persisted tenant: {}", e);
                    None
                }
            };
        }
        cache.clone()
    }

    /// Select a tenant; `None` or a blank id clears the selection.
    pub fn set(&self, id: Option<&str>) {
        let id = id.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        let mut cache = self.cache.write();
        let res = match &id {
            Some(v) => self.storage.write(TENANT_KEY, v),
            None => self.storage.remove(TENANT_KEY),
        };
        if let Err(e) = res {
            warn!(target: "buildops::session", "failed to mirror tenant to session storage: {}", e);
        }
        debug!(target: "buildops::session", "tenant set to {:?}", id);
        *cache = id;
    }

    pub fn clear(&self) { self.set(None); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::storage::MemoryStorage;

    #[test]
    fn set_get_clear_and_reload() {
        let storage = Arc::new(MemoryStorage::new());
        let tenant = TenantContext::new(storage.clone());
        assert_eq!(tenant.get(), None);

        tenant.set(Some("acme"));
        assert_eq!(tenant.get().as_deref(), Some("acme"));
        assert_eq!(TenantContext::new(storage.clone()).get().as_deref(), Some("acme"));

        tenant.set(Some("   "));
        assert_eq!(tenant.get(), None);
        assert_eq!(TenantContext::new(storage).get(), None);
    }
}
