//! Tenant enablement store
//!
//! Read side of the enablement projection. Other services consult it to
//! gate a module's routes and features per tenant; it carries no
//! dependency logic of its own.

use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ModuleError, ModuleResult};
use crate::installation::ModuleInstallation;
use crate::registry::{module_name, ModuleRegistry};
use crate::store::ModuleStore;
use crate::tenant_module::{TenantModule, TenantModuleView};

/// Committed per-tenant enablement state.
#[derive(Clone)]
pub struct TenantEnablementStore {
    store: Arc<dyn ModuleStore>,
    registry: Arc<dyn ModuleRegistry>,
}

impl TenantEnablementStore {
    /// Create a store reading committed rows from `store`.
    pub fn new(store: Arc<dyn ModuleStore>, registry: Arc<dyn ModuleRegistry>) -> Self {
        Self { store, registry }
    }

    /// The tenant's row for a module, or `NotInstalled` if none exists.
    pub async fn get(&self, tenant_id: Uuid, module_id: Uuid) -> ModuleResult<TenantModule> {
        match self.store.tenant_module(tenant_id, module_id).await? {
            Some(row) => Ok(row),
            None => Err(ModuleError::NotInstalled(
                module_name(self.registry.as_ref(), module_id).await,
            )),
        }
    }

    /// All of the tenant's rows, enabled or not.
    pub async fn list_for_tenant(&self, tenant_id: Uuid) -> ModuleResult<Vec<TenantModule>> {
        self.store.tenant_modules(tenant_id).await
    }

    /// Whether a module is enabled for the tenant. A missing row means
    /// disabled.
    pub async fn is_enabled(&self, tenant_id: Uuid, module_id: Uuid) -> ModuleResult<bool> {
        Ok(self
            .store
            .tenant_module(tenant_id, module_id)
            .await?
            .is_some_and(|row| row.is_enabled))
    }

    /// The tenant's rows joined with catalog metadata.
    ///
    /// Retired modules are still listed; rows whose module is unknown to
    /// the catalog are skipped.
    pub async fn list_detailed(&self, tenant_id: Uuid) -> ModuleResult<Vec<TenantModuleView>> {
        let rows = self.store.tenant_modules(tenant_id).await?;
        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            match self.registry.find(row.module_id).await? {
                Some(module) => views.push(TenantModuleView::new(row, &module)),
                None => {
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        module_id = %row.module_id,
                        "Enablement row references unknown module"
                    );
                }
            }
        }
        Ok(views)
    }

    /// Every installation attempt for a module, newest first.
    pub async fn installation_history(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
    ) -> ModuleResult<Vec<ModuleInstallation>> {
        self.store.installations(tenant_id, module_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Module, ModuleCategory};
    use crate::registry::MemoryModuleRegistry;
    use crate::store::MemoryModuleStore;
    use serde_json::json;

    async fn seed(
        store: &MemoryModuleStore,
        tenant_id: Uuid,
        module_id: Uuid,
        enabled: bool,
    ) -> TenantModule {
        let mut row = TenantModule::new(tenant_id, module_id, json!({"theme": "dark"}));
        row.set_enabled(enabled);
        let mut tx = store.begin(tenant_id).await.unwrap();
        tx.save_tenant_module(&row).await.unwrap();
        tx.commit().await.unwrap();
        row
    }

    #[tokio::test]
    async fn test_absent_row_is_disabled_not_error() {
        let store = Arc::new(MemoryModuleStore::new());
        let registry = Arc::new(MemoryModuleRegistry::new());
        let crm = registry
            .register(Module::new("crm", "1.0.0", ModuleCategory::Crm))
            .await
            .unwrap();
        let enablement = TenantEnablementStore::new(store, registry);
        let tenant = Uuid::now_v7();

        assert!(!enablement.is_enabled(tenant, crm.id).await.unwrap());
        assert_eq!(
            enablement.get(tenant, crm.id).await.unwrap_err(),
            ModuleError::NotInstalled("crm".to_string())
        );
        assert!(enablement.list_for_tenant(tenant).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reads_committed_rows() {
        let store = Arc::new(MemoryModuleStore::new());
        let registry = Arc::new(MemoryModuleRegistry::new());
        let crm = registry
            .register(Module::new("crm", "1.0.0", ModuleCategory::Crm))
            .await
            .unwrap();
        let pos = registry
            .register(Module::new("pos", "1.0.0", ModuleCategory::Pos).with_icon("register"))
            .await
            .unwrap();
        let tenant = Uuid::now_v7();
        seed(&store, tenant, crm.id, true).await;
        seed(&store, tenant, pos.id, false).await;
        seed(&store, tenant, Uuid::now_v7(), true).await;

        let enablement = TenantEnablementStore::new(store, registry.clone());
        assert!(enablement.is_enabled(tenant, crm.id).await.unwrap());
        assert!(!enablement.is_enabled(tenant, pos.id).await.unwrap());
        assert_eq!(
            enablement.get(tenant, crm.id).await.unwrap().config,
            json!({"theme": "dark"})
        );
        assert_eq!(enablement.list_for_tenant(tenant).await.unwrap().len(), 3);

        registry.retire(pos.id).await.unwrap();
        let views = enablement.list_detailed(tenant).await.unwrap();
        assert_eq!(views.len(), 2);
        let pos_view = views.iter().find(|v| v.module_name == "pos").unwrap();
        assert_eq!(pos_view.icon.as_deref(), Some("register"));
        assert!(!pos_view.tenant_module.is_enabled);

        // Rows of other tenants stay invisible.
        assert!(enablement
            .list_for_tenant(Uuid::now_v7())
            .await
            .unwrap()
            .is_empty());
    }
}
