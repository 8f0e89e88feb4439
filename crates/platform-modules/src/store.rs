//! Persistence interface for installation records and the enablement projection
//!
//! Every lifecycle operation runs inside one [`StoreTransaction`] scoped to a
//! tenant. Implementations must give a transaction a consistent view of the
//! tenant's rows from `begin` until `commit`, and must not let two
//! transactions for the same tenant interleave their writes (row locks plus
//! serializable or repeatable-read isolation in a SQL store). Dropping a
//! transaction without committing rolls it back.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::error::{ModuleError, ModuleResult};
use crate::installation::ModuleInstallation;
use crate::tenant_module::TenantModule;

/// Store of per-tenant module state.
#[async_trait]
pub trait ModuleStore: Send + Sync {
    /// Begin a transaction over one tenant's rows.
    async fn begin(&self, tenant_id: Uuid) -> ModuleResult<Box<dyn StoreTransaction>>;

    /// Committed enablement row, if any.
    async fn tenant_module(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
    ) -> ModuleResult<Option<TenantModule>>;

    /// All committed enablement rows for a tenant.
    async fn tenant_modules(&self, tenant_id: Uuid) -> ModuleResult<Vec<TenantModule>>;

    /// Every installation attempt for (tenant, module), newest first.
    async fn installations(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
    ) -> ModuleResult<Vec<ModuleInstallation>>;
}

/// A unit of work over one tenant's rows.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Tenant this transaction is scoped to.
    fn tenant_id(&self) -> Uuid;

    /// The installation currently occupying the (tenant, module) slot.
    async fn active_installation(
        &mut self,
        module_id: Uuid,
    ) -> ModuleResult<Option<ModuleInstallation>>;

    /// Insert or update an installation record by id.
    ///
    /// Fails if inserting would leave two active records for one module.
    async fn save_installation(&mut self, installation: &ModuleInstallation) -> ModuleResult<()>;

    /// The enablement row for a module.
    async fn tenant_module(&mut self, module_id: Uuid) -> ModuleResult<Option<TenantModule>>;

    /// All enablement rows of the tenant.
    async fn tenant_modules(&mut self) -> ModuleResult<Vec<TenantModule>>;

    /// Upsert an enablement row keyed by (tenant, module).
    async fn save_tenant_module(&mut self, row: &TenantModule) -> ModuleResult<()>;

    /// Make all writes visible atomically.
    async fn commit(self: Box<Self>) -> ModuleResult<()>;
}

#[derive(Debug, Clone, Default)]
struct TenantRows {
    /// Insertion order
    installations: Vec<ModuleInstallation>,
    modules: HashMap<Uuid, TenantModule>,
}

impl TenantRows {
    fn active_installation(&self, module_id: Uuid) -> Option<&ModuleInstallation> {
        self.installations
            .iter()
            .find(|i| i.module_id == module_id && i.is_active())
    }
}

/// In-memory store.
///
/// Each tenant's rows sit behind their own mutex. A transaction holds that
/// mutex for its whole lifetime and works on a private copy that replaces
/// the committed rows on `commit`, which makes transactions for the same
/// tenant fully serialized while different tenants proceed in parallel.
#[derive(Debug, Default)]
pub struct MemoryModuleStore {
    tenants: RwLock<HashMap<Uuid, Arc<Mutex<TenantRows>>>>,
}

impl MemoryModuleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The tenant's slot, if any transaction ever opened one.
    async fn existing_slot(&self, tenant_id: Uuid) -> Option<Arc<Mutex<TenantRows>>> {
        self.tenants.read().await.get(&tenant_id).cloned()
    }

    async fn slot(&self, tenant_id: Uuid) -> Arc<Mutex<TenantRows>> {
        if let Some(slot) = self.existing_slot(tenant_id).await {
            return slot;
        }
        self.tenants
            .write()
            .await
            .entry(tenant_id)
            .or_default()
            .clone()
    }
}

#[async_trait]
impl ModuleStore for MemoryModuleStore {
    async fn begin(&self, tenant_id: Uuid) -> ModuleResult<Box<dyn StoreTransaction>> {
        let guard = self.slot(tenant_id).await.lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            tenant_id,
            guard,
            working,
        }))
    }

    async fn tenant_module(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
    ) -> ModuleResult<Option<TenantModule>> {
        let Some(slot) = self.existing_slot(tenant_id).await else {
            return Ok(None);
        };
        let rows = slot.lock().await;
        Ok(rows.modules.get(&module_id).cloned())
    }

    async fn tenant_modules(&self, tenant_id: Uuid) -> ModuleResult<Vec<TenantModule>> {
        let Some(slot) = self.existing_slot(tenant_id).await else {
            return Ok(Vec::new());
        };
        let rows = slot.lock().await;
        let mut modules: Vec<TenantModule> = rows.modules.values().cloned().collect();
        modules.sort_by_key(|m| m.installed_at);
        Ok(modules)
    }

    async fn installations(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
    ) -> ModuleResult<Vec<ModuleInstallation>> {
        let Some(slot) = self.existing_slot(tenant_id).await else {
            return Ok(Vec::new());
        };
        let rows = slot.lock().await;
        Ok(rows
            .installations
            .iter()
            .rev()
            .filter(|i| i.module_id == module_id)
            .cloned()
            .collect())
    }
}

struct MemoryTransaction {
    tenant_id: Uuid,
    guard: OwnedMutexGuard<TenantRows>,
    working: TenantRows,
}

impl MemoryTransaction {
    fn check_tenant(&self, tenant_id: Uuid) -> ModuleResult<()> {
        if tenant_id == self.tenant_id {
            Ok(())
        } else {
            Err(ModuleError::StorageFailure(format!(
                "row for tenant {tenant_id} written in transaction for tenant {}",
                self.tenant_id
            )))
        }
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    async fn active_installation(
        &mut self,
        module_id: Uuid,
    ) -> ModuleResult<Option<ModuleInstallation>> {
        Ok(self.working.active_installation(module_id).cloned())
    }

    async fn save_installation(&mut self, installation: &ModuleInstallation) -> ModuleResult<()> {
        self.check_tenant(installation.tenant_id)?;

        if let Some(existing) = self
            .working
            .installations
            .iter_mut()
            .find(|i| i.id == installation.id)
        {
            *existing = installation.clone();
            return Ok(());
        }

        if installation.is_active()
            && self
                .working
                .active_installation(installation.module_id)
                .is_some()
        {
            return Err(ModuleError::StorageFailure(format!(
                "unique violation: active installation exists for module {}",
                installation.module_id
            )));
        }
        self.working.installations.push(installation.clone());
        Ok(())
    }

    async fn tenant_module(&mut self, module_id: Uuid) -> ModuleResult<Option<TenantModule>> {
        Ok(self.working.modules.get(&module_id).cloned())
    }

    async fn tenant_modules(&mut self) -> ModuleResult<Vec<TenantModule>> {
        Ok(self.working.modules.values().cloned().collect())
    }

    async fn save_tenant_module(&mut self, row: &TenantModule) -> ModuleResult<()> {
        self.check_tenant(row.tenant_id)?;
        match self.working.modules.get_mut(&row.module_id) {
            // Upsert keeps the original row identity and creation time.
            Some(existing) => {
                existing.is_enabled = row.is_enabled;
                existing.config = row.config.clone();
                existing.updated_at = row.updated_at;
            }
            None => {
                self.working.modules.insert(row.module_id, row.clone());
            }
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> ModuleResult<()> {
        let MemoryTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}
