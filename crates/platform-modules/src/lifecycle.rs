//! Installation lifecycle manager
//!
//! The only component that mutates per-tenant module state. Each operation
//! runs in one store transaction that re-checks its preconditions against
//! the tenant's rows as seen inside the transaction, writes the
//! installation record and the enablement projection, and commits. The
//! whole operation is bounded by the configured deadline; a transaction
//! that does not commit in time is dropped, which rolls it back.
//!
//! Installs and updates that fail after the installation row was written
//! are recorded as `Failed` with the cause in a follow-up transaction, so
//! the slot never stays `Installing` or `Updating`.

use platform_events::{EventBus, ModuleEvent};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ModuleServiceConfig;
use crate::error::{ModuleError, ModuleResult};
use crate::evaluator::{DependencyEvaluator, EnablementSnapshot};
use crate::hooks::{NoopProvisioner, ProvisionAction, ProvisionRequest, ProvisioningHook};
use crate::installation::{InstallationStatus, ModuleInstallation};
use crate::module::Module;
use crate::module_config::{parse_config, validate_config};
use crate::registry::{module_name, ModuleRegistry};
use crate::store::{ModuleStore, StoreTransaction};
use crate::tenant_module::TenantModule;

/// Failure of an install or update transaction.
struct TxFailure {
    error: ModuleError,
    attempt: Option<Attempt>,
}

/// An attempt that got as far as writing its installation row.
struct Attempt {
    /// Active row as committed before the transaction, if any
    base: Option<ModuleInstallation>,
    /// Row as written in `Installing` or `Updating`
    pending: ModuleInstallation,
}

impl From<ModuleError> for TxFailure {
    fn from(error: ModuleError) -> Self {
        Self {
            error,
            attempt: None,
        }
    }
}

/// Drives installs, updates, uninstalls, enablement and config changes.
pub struct ModuleLifecycleManager {
    registry: Arc<dyn ModuleRegistry>,
    store: Arc<dyn ModuleStore>,
    evaluator: DependencyEvaluator,
    hook: Arc<dyn ProvisioningHook>,
    events: Option<Arc<dyn EventBus>>,
    config: ModuleServiceConfig,
}

impl ModuleLifecycleManager {
    /// Create a manager with default configuration, no provisioning and no
    /// event publishing.
    pub fn new(registry: Arc<dyn ModuleRegistry>, store: Arc<dyn ModuleStore>) -> Self {
        Self {
            evaluator: DependencyEvaluator::new(registry.clone()),
            registry,
            store,
            hook: Arc::new(NoopProvisioner),
            events: None,
            config: ModuleServiceConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ModuleServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the provisioning hook.
    pub fn with_hook(mut self, hook: Arc<dyn ProvisioningHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Publish lifecycle events to `bus` after each commit.
    pub fn with_events(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &ModuleServiceConfig {
        &self.config
    }

    /// Module catalog.
    pub fn registry(&self) -> &Arc<dyn ModuleRegistry> {
        &self.registry
    }

    /// Per-tenant store.
    pub fn store(&self) -> &Arc<dyn ModuleStore> {
        &self.store
    }

    /// Dependency evaluator over the catalog.
    pub fn evaluator(&self) -> &DependencyEvaluator {
        &self.evaluator
    }

    /// Install a module for a tenant and enable it.
    ///
    /// `version` defaults to the catalog version. A `Failed` installation is
    /// retried on the same record; an `Installed` one yields
    /// `AlreadyInstalled`.
    pub async fn install(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
        actor_id: Uuid,
        version: Option<&str>,
        config: Value,
    ) -> ModuleResult<ModuleInstallation> {
        if version.is_some_and(|v| v.trim().is_empty()) {
            return Err(ModuleError::InvalidModule(
                "version must not be empty".to_string(),
            ));
        }
        validate_config(&config)?;
        let module = self.registry.get(module_id).await?;
        let version = version.unwrap_or(module.version.as_str()).to_string();

        let result = self
            .within_deadline(
                "install",
                self.install_tx(tenant_id, &module, actor_id, &version, config),
            )
            .await;

        match result {
            Ok(installation) => {
                tracing::info!(
                    tenant_id = %tenant_id,
                    module_id = %module_id,
                    actor_id = %actor_id,
                    installation_id = %installation.id,
                    version = %installation.version,
                    "Module installed"
                );
                self.publish(
                    tenant_id,
                    Some(actor_id),
                    ModuleEvent::Installed {
                        module_id,
                        module_name: module.name.clone(),
                        installation_id: installation.id,
                        version: installation.version.clone(),
                    },
                )
                .await;
                Ok(installation)
            }
            Err(TxFailure {
                error,
                attempt: Some(attempt),
            }) => Err(self
                .record_failure(&module, attempt, error, Some(actor_id))
                .await),
            Err(TxFailure { error, .. }) => Err(error),
        }
    }

    async fn install_tx(
        &self,
        tenant_id: Uuid,
        module: &Module,
        actor_id: Uuid,
        version: &str,
        config: Value,
    ) -> Result<ModuleInstallation, TxFailure> {
        let mut tx = self.store.begin(tenant_id).await?;

        let base = tx.active_installation(module.id).await?;
        let pending = match base.clone() {
            Some(existing) if existing.status == InstallationStatus::Installed => {
                return Err(ModuleError::AlreadyInstalled(module.name.clone()).into());
            }
            Some(mut existing) => {
                existing.restart(version, config.clone(), actor_id)?;
                existing
            }
            None => ModuleInstallation::new(tenant_id, module.id, version, config.clone(), actor_id),
        };

        let rows = tx.tenant_modules().await?;
        let snapshot = EnablementSnapshot::from_rows(tenant_id, &rows);
        self.evaluator
            .check_install_preconditions(module.id, &snapshot)
            .await?;

        self.apply_install(tx, &pending, &module.name, config)
            .await
            .map_err(|error| TxFailure {
                error,
                attempt: Some(Attempt {
                    base,
                    pending: pending.clone(),
                }),
            })
    }

    async fn apply_install(
        &self,
        mut tx: Box<dyn StoreTransaction>,
        pending: &ModuleInstallation,
        module_name: &str,
        config: Value,
    ) -> ModuleResult<ModuleInstallation> {
        tx.save_installation(pending).await?;

        let row = match tx.tenant_module(pending.module_id).await? {
            Some(mut row) => {
                row.set_enabled(true);
                row.set_config(config);
                row
            }
            None => TenantModule::new(pending.tenant_id, pending.module_id, config),
        };
        tx.save_tenant_module(&row).await?;

        let mut installation = pending.clone();
        installation.install_data = self
            .provision(ProvisionAction::Install, module_name, &installation)
            .await?;
        installation.transition_to(InstallationStatus::Installed)?;
        tx.save_installation(&installation).await?;

        tx.commit().await?;
        Ok(installation)
    }

    /// Move an installed module to another version.
    ///
    /// On failure the installation is recorded as `Failed` and the tenant's
    /// enablement row is left as it was.
    pub async fn update(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
        actor_id: Uuid,
        version: &str,
    ) -> ModuleResult<ModuleInstallation> {
        if version.trim().is_empty() {
            return Err(ModuleError::InvalidModule(
                "version must not be empty".to_string(),
            ));
        }
        let module = self.registry.get(module_id).await?;

        let result = self
            .within_deadline("update", self.update_tx(tenant_id, &module, version))
            .await;

        match result {
            Ok((installation, from_version)) => {
                tracing::info!(
                    tenant_id = %tenant_id,
                    module_id = %module_id,
                    actor_id = %actor_id,
                    from_version = %from_version,
                    to_version = %installation.version,
                    "Module updated"
                );
                self.publish(
                    tenant_id,
                    Some(actor_id),
                    ModuleEvent::Updated {
                        module_id,
                        module_name: module.name.clone(),
                        installation_id: installation.id,
                        from_version,
                        to_version: installation.version.clone(),
                    },
                )
                .await;
                Ok(installation)
            }
            Err(TxFailure {
                error,
                attempt: Some(attempt),
            }) => Err(self
                .record_failure(&module, attempt, error, Some(actor_id))
                .await),
            Err(TxFailure { error, .. }) => Err(error),
        }
    }

    async fn update_tx(
        &self,
        tenant_id: Uuid,
        module: &Module,
        version: &str,
    ) -> Result<(ModuleInstallation, String), TxFailure> {
        let mut tx = self.store.begin(tenant_id).await?;

        let base = tx
            .active_installation(module.id)
            .await?
            .ok_or_else(|| ModuleError::NotInstalled(module.name.clone()))?;
        let mut pending = base.clone();
        pending.transition_to(InstallationStatus::Updating)?;

        let rows = tx.tenant_modules().await?;
        let snapshot = EnablementSnapshot::from_rows(tenant_id, &rows);
        if snapshot.is_enabled(module.id) {
            self.evaluator
                .check_install_preconditions(module.id, &snapshot)
                .await?;
        }

        let from_version = base.version.clone();
        match self.apply_update(tx, &pending, &module.name, version).await {
            Ok(installation) => Ok((installation, from_version)),
            Err(error) => Err(TxFailure {
                error,
                attempt: Some(Attempt {
                    base: Some(base),
                    pending,
                }),
            }),
        }
    }

    async fn apply_update(
        &self,
        mut tx: Box<dyn StoreTransaction>,
        pending: &ModuleInstallation,
        module_name: &str,
        version: &str,
    ) -> ModuleResult<ModuleInstallation> {
        tx.save_installation(pending).await?;

        let mut installation = pending.clone();
        installation.version = version.to_string();
        installation.install_data = self
            .provision(ProvisionAction::Update, module_name, &installation)
            .await?;
        installation.transition_to(InstallationStatus::Installed)?;
        tx.save_installation(&installation).await?;

        tx.commit().await?;
        Ok(installation)
    }

    /// Uninstall a module and disable it for the tenant.
    ///
    /// The enablement row is kept, disabled; the installation record is
    /// soft-terminated.
    pub async fn uninstall(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
        actor_id: Uuid,
    ) -> ModuleResult<()> {
        let (installation, name) = self
            .within_deadline("uninstall", self.uninstall_tx(tenant_id, module_id))
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            module_id = %module_id,
            actor_id = %actor_id,
            installation_id = %installation.id,
            "Module uninstalled"
        );
        self.publish(
            tenant_id,
            Some(actor_id),
            ModuleEvent::Uninstalled {
                module_id,
                module_name: name,
                installation_id: installation.id,
            },
        )
        .await;
        Ok(())
    }

    async fn uninstall_tx(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
    ) -> ModuleResult<(ModuleInstallation, String)> {
        let mut tx = self.store.begin(tenant_id).await?;
        let name = self.name(module_id).await;

        let mut installation = match tx.active_installation(module_id).await? {
            Some(installation) if installation.status != InstallationStatus::Failed => installation,
            _ => return Err(ModuleError::NotInstalled(name)),
        };

        let rows = tx.tenant_modules().await?;
        let snapshot = EnablementSnapshot::from_rows(tenant_id, &rows);
        self.evaluator
            .check_uninstall_preconditions(module_id, installation.status, &snapshot)
            .await?;

        installation.mark_uninstalled()?;
        self.deprovision(&name, &installation).await?;
        tx.save_installation(&installation).await?;

        if let Some(mut row) = tx.tenant_module(module_id).await? {
            if row.set_enabled(false) {
                tx.save_tenant_module(&row).await?;
            }
        }

        tx.commit().await?;
        Ok((installation, name))
    }

    /// Turn an installed module on for the tenant.
    ///
    /// Enabling an enabled module is a no-op. Conflicts are always checked;
    /// required dependencies only with `revalidate_on_enable` set.
    pub async fn enable(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
        actor_id: Uuid,
    ) -> ModuleResult<TenantModule> {
        let (row, changed) = self
            .within_deadline("enable", self.set_enabled_tx(tenant_id, module_id, true))
            .await?;

        if changed {
            tracing::info!(
                tenant_id = %tenant_id,
                module_id = %module_id,
                actor_id = %actor_id,
                "Module enabled"
            );
            self.publish(
                tenant_id,
                Some(actor_id),
                ModuleEvent::Enabled {
                    module_id,
                    module_name: self.name(module_id).await,
                },
            )
            .await;
        }
        Ok(row)
    }

    /// Turn a module off for the tenant.
    ///
    /// Fails with `DependentModulesExist` while enabled modules require it.
    /// Disabling a disabled module is a no-op.
    pub async fn disable(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
        actor_id: Uuid,
    ) -> ModuleResult<TenantModule> {
        let (row, changed) = self
            .within_deadline("disable", self.set_enabled_tx(tenant_id, module_id, false))
            .await?;

        if changed {
            tracing::info!(
                tenant_id = %tenant_id,
                module_id = %module_id,
                actor_id = %actor_id,
                "Module disabled"
            );
            self.publish(
                tenant_id,
                Some(actor_id),
                ModuleEvent::Disabled {
                    module_id,
                    module_name: self.name(module_id).await,
                },
            )
            .await;
        }
        Ok(row)
    }

    async fn set_enabled_tx(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
        enabled: bool,
    ) -> ModuleResult<(TenantModule, bool)> {
        let mut tx = self.store.begin(tenant_id).await?;
        let (installation, mut row) = self.installed_row(tx.as_mut(), module_id).await?;

        if row.is_enabled == enabled {
            return Ok((row, false));
        }

        let rows = tx.tenant_modules().await?;
        let snapshot = EnablementSnapshot::from_rows(tenant_id, &rows);
        if enabled {
            if installation.status != InstallationStatus::Installed {
                return Err(ModuleError::NotInstalled(self.name(module_id).await));
            }
            self.registry.get(module_id).await?;
            if self.config.revalidate_on_enable {
                self.evaluator.check_dependencies(module_id, &snapshot).await?;
            }
            self.evaluator.check_conflicts(module_id, &snapshot).await?;
        } else {
            self.evaluator
                .check_disable_preconditions(module_id, &snapshot)
                .await?;
        }

        row.set_enabled(enabled);
        tx.save_tenant_module(&row).await?;
        tx.commit().await?;
        Ok((row, true))
    }

    /// Replace the tenant's config for a module.
    ///
    /// Only the enablement row changes; the installation keeps the
    /// install-time payload.
    pub async fn update_config(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
        actor_id: Uuid,
        config: Value,
    ) -> ModuleResult<TenantModule> {
        validate_config(&config)?;

        let row = self
            .within_deadline("update_config", async {
                let mut tx = self.store.begin(tenant_id).await?;
                let (_, mut row) = self.installed_row(tx.as_mut(), module_id).await?;
                row.set_config(config);
                tx.save_tenant_module(&row).await?;
                tx.commit().await?;
                Ok::<_, ModuleError>(row)
            })
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            module_id = %module_id,
            actor_id = %actor_id,
            "Module config updated"
        );
        self.publish(
            tenant_id,
            Some(actor_id),
            ModuleEvent::ConfigUpdated {
                module_id,
                module_name: self.name(module_id).await,
            },
        )
        .await;
        Ok(row)
    }

    /// Like [`update_config`](Self::update_config), from a raw JSON payload.
    pub async fn update_config_raw(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
        actor_id: Uuid,
        raw: &str,
    ) -> ModuleResult<TenantModule> {
        let config = parse_config(raw)?;
        self.update_config(tenant_id, module_id, actor_id, config).await
    }

    /// Active installation and enablement row, or `NotInstalled`.
    async fn installed_row(
        &self,
        tx: &mut dyn StoreTransaction,
        module_id: Uuid,
    ) -> ModuleResult<(ModuleInstallation, TenantModule)> {
        let installation = tx.active_installation(module_id).await?;
        let row = tx.tenant_module(module_id).await?;
        match (installation, row) {
            (Some(installation), Some(row)) => Ok((installation, row)),
            _ => Err(ModuleError::NotInstalled(self.name(module_id).await)),
        }
    }

    /// Record a failed install or update attempt and return its cause.
    ///
    /// Nothing is written if the slot changed since the attempt read it.
    async fn record_failure(
        &self,
        module: &Module,
        attempt: Attempt,
        cause: ModuleError,
        actor_id: Option<Uuid>,
    ) -> ModuleError {
        let tenant_id = attempt.pending.tenant_id;
        let updating = attempt.pending.status == InstallationStatus::Updating;
        let message = cause.to_string();

        let recorded = self
            .within_deadline("record_failure", async {
                let mut tx = self.store.begin(tenant_id).await?;
                if tx.active_installation(module.id).await? != attempt.base {
                    return Ok(None);
                }
                let mut record = attempt.pending;
                record.mark_failed(message.as_str())?;
                tx.save_installation(&record).await?;
                tx.commit().await?;
                Ok::<_, ModuleError>(Some(record))
            })
            .await;

        match recorded {
            Ok(Some(record)) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    module_id = %module.id,
                    installation_id = %record.id,
                    error = %message,
                    "Installation attempt failed"
                );
                let event = if updating {
                    ModuleEvent::UpdateFailed {
                        module_id: module.id,
                        module_name: module.name.clone(),
                        installation_id: record.id,
                        error: message,
                    }
                } else {
                    ModuleEvent::InstallFailed {
                        module_id: module.id,
                        module_name: module.name.clone(),
                        installation_id: record.id,
                        error: message,
                    }
                };
                self.publish(tenant_id, actor_id, event).await;
            }
            Ok(None) => {
                tracing::debug!(
                    tenant_id = %tenant_id,
                    module_id = %module.id,
                    "Installation slot changed since failed attempt, not recording"
                );
            }
            Err(e) => {
                tracing::error!(
                    tenant_id = %tenant_id,
                    module_id = %module.id,
                    error = %e,
                    cause = %message,
                    "Failed to record failed installation attempt"
                );
            }
        }

        cause
    }

    async fn provision(
        &self,
        action: ProvisionAction,
        module_name: &str,
        installation: &ModuleInstallation,
    ) -> ModuleResult<Value> {
        let request = provision_request(action, module_name, installation);
        self.hook
            .provision(&request)
            .await
            .map_err(ModuleError::ProvisioningFailed)
    }

    async fn deprovision(
        &self,
        module_name: &str,
        installation: &ModuleInstallation,
    ) -> ModuleResult<()> {
        let request = provision_request(ProvisionAction::Uninstall, module_name, installation);
        self.hook
            .deprovision(&request)
            .await
            .map_err(ModuleError::ProvisioningFailed)
    }

    async fn within_deadline<T, E, F>(&self, operation: &'static str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<ModuleError>,
    {
        let deadline = self.config.operation_timeout();
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = deadline.as_millis() as u64,
                    "Lifecycle operation timed out, rolled back"
                );
                Err(ModuleError::Timeout(deadline).into())
            }
        }
    }

    /// Best-effort: a publish failure never fails the committed operation.
    async fn publish(&self, tenant_id: Uuid, actor_id: Option<Uuid>, event: ModuleEvent) {
        if !self.config.publish_events {
            return;
        }
        let Some(bus) = &self.events else {
            return;
        };

        let mut envelope = event.to_event(tenant_id);
        if let Some(actor_id) = actor_id {
            envelope = envelope.with_actor(actor_id);
        }
        if let Err(e) = bus.publish(envelope).await {
            tracing::warn!(
                tenant_id = %tenant_id,
                module_id = %event.module_id(),
                event_type = event.event_type(),
                error = %e,
                "Failed to publish module event"
            );
        }
    }

    async fn name(&self, module_id: Uuid) -> String {
        module_name(self.registry.as_ref(), module_id).await
    }
}

fn provision_request(
    action: ProvisionAction,
    module_name: &str,
    installation: &ModuleInstallation,
) -> ProvisionRequest {
    ProvisionRequest {
        action,
        tenant_id: installation.tenant_id,
        module_id: installation.module_id,
        module_name: module_name.to_string(),
        installation_id: installation.id,
        version: installation.version.clone(),
        config: installation.config.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ModuleCategory, ModuleDependency};
    use crate::registry::MemoryModuleRegistry;
    use crate::store::MemoryModuleStore;
    use async_trait::async_trait;
    use platform_events::MemoryEventBus;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Hook whose provisioning fails while `fail` is set.
    #[derive(Default)]
    struct ToggleHook {
        fail: AtomicBool,
    }

    #[async_trait]
    impl ProvisioningHook for ToggleHook {
        async fn provision(&self, request: &ProvisionRequest) -> Result<Value, String> {
            if self.fail.load(Ordering::SeqCst) {
                Err("quota exceeded".to_string())
            } else {
                Ok(json!({ "schema": format!("tenant_{}", request.module_name) }))
            }
        }

        async fn deprovision(&self, _request: &ProvisionRequest) -> Result<(), String> {
            Ok(())
        }
    }

    struct Fixture {
        manager: ModuleLifecycleManager,
        registry: Arc<MemoryModuleRegistry>,
        store: Arc<MemoryModuleStore>,
        hook: Arc<ToggleHook>,
        tenant: Uuid,
        actor: Uuid,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(ModuleServiceConfig::default())
        }

        fn with_config(config: ModuleServiceConfig) -> Self {
            let registry = Arc::new(MemoryModuleRegistry::new());
            let store = Arc::new(MemoryModuleStore::new());
            let hook = Arc::new(ToggleHook::default());
            let manager = ModuleLifecycleManager::new(registry.clone(), store.clone())
                .with_config(config)
                .with_hook(hook.clone());
            Self {
                manager,
                registry,
                store,
                hook,
                tenant: Uuid::now_v7(),
                actor: Uuid::now_v7(),
            }
        }

        async fn module(&self, name: &str) -> Uuid {
            self.registry
                .register(Module::new(name, "1.0.0", ModuleCategory::Other))
                .await
                .unwrap()
                .id
        }

        async fn install(&self, module_id: Uuid) -> ModuleResult<ModuleInstallation> {
            self.manager
                .install(self.tenant, module_id, self.actor, None, json!({}))
                .await
        }
    }

    #[tokio::test]
    async fn test_install_enables_and_records_installation() {
        let f = Fixture::new();
        let crm = f.module("crm").await;

        let installation = f
            .manager
            .install(f.tenant, crm, f.actor, Some("1.2.0"), json!({"pipeline": "b2b"}))
            .await
            .unwrap();

        assert_eq!(installation.status, InstallationStatus::Installed);
        assert_eq!(installation.version, "1.2.0");
        assert_eq!(installation.install_data, json!({"schema": "tenant_crm"}));

        let row = f.store.tenant_module(f.tenant, crm).await.unwrap().unwrap();
        assert!(row.is_enabled);
        assert_eq!(row.config, json!({"pipeline": "b2b"}));

        assert_eq!(
            f.install(crm).await.unwrap_err(),
            ModuleError::AlreadyInstalled("crm".to_string())
        );
    }

    #[tokio::test]
    async fn test_install_rejects_unknown_module_and_bad_config() {
        let f = Fixture::new();
        let crm = f.module("crm").await;

        assert!(matches!(
            f.install(Uuid::now_v7()).await,
            Err(ModuleError::ModuleNotFound(_))
        ));
        assert!(matches!(
            f.manager
                .install(f.tenant, crm, f.actor, None, json!([1, 2]))
                .await,
            Err(ModuleError::InvalidConfig(_))
        ));
        assert!(f.store.installations(f.tenant, crm).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hook_failure_recorded_then_retry_reuses_record() {
        let f = Fixture::new();
        let pos = f.module("pos").await;

        f.hook.fail.store(true, Ordering::SeqCst);
        let err = f.install(pos).await.unwrap_err();
        assert_eq!(err, ModuleError::ProvisioningFailed("quota exceeded".to_string()));

        let history = f.store.installations(f.tenant, pos).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, InstallationStatus::Failed);
        assert_eq!(
            history[0].error_message.as_deref(),
            Some("Provisioning failed: quota exceeded")
        );
        assert!(f.store.tenant_module(f.tenant, pos).await.unwrap().is_none());

        f.hook.fail.store(false, Ordering::SeqCst);
        let installation = f.install(pos).await.unwrap();
        assert_eq!(installation.id, history[0].id);
        assert!(installation.error_message.is_none());
        assert_eq!(f.store.installations(f.tenant, pos).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_uninstall_then_reinstall_creates_new_record() {
        let f = Fixture::new();
        let lms = f.module("lms").await;

        let first = f.install(lms).await.unwrap();
        f.manager.uninstall(f.tenant, lms, f.actor).await.unwrap();

        let row = f.store.tenant_module(f.tenant, lms).await.unwrap().unwrap();
        assert!(!row.is_enabled);

        let second = f.install(lms).await.unwrap();
        assert_ne!(first.id, second.id);

        let history = f.store.installations(f.tenant, lms).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].status, InstallationStatus::Uninstalling);
        assert!(history[1].uninstalled_at.is_some());
        assert!(f.store.tenant_module(f.tenant, lms).await.unwrap().unwrap().is_enabled);
    }

    #[tokio::test]
    async fn test_uninstall_failed_install_is_not_installed() {
        let f = Fixture::new();
        let hrm = f.module("hrm").await;

        f.hook.fail.store(true, Ordering::SeqCst);
        f.install(hrm).await.unwrap_err();

        assert_eq!(
            f.manager.uninstall(f.tenant, hrm, f.actor).await.unwrap_err(),
            ModuleError::NotInstalled("hrm".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_success_and_failure() {
        let f = Fixture::new();
        let crm = f.module("crm").await;
        f.install(crm).await.unwrap();

        let updated = f.manager.update(f.tenant, crm, f.actor, "2.0.0").await.unwrap();
        assert_eq!(updated.version, "2.0.0");
        assert_eq!(updated.status, InstallationStatus::Installed);

        f.hook.fail.store(true, Ordering::SeqCst);
        let err = f
            .manager
            .update(f.tenant, crm, f.actor, "3.0.0")
            .await
            .unwrap_err();
        assert!(matches!(err, ModuleError::ProvisioningFailed(_)));

        let history = f.store.installations(f.tenant, crm).await.unwrap();
        assert_eq!(history[0].status, InstallationStatus::Failed);
        assert_eq!(history[0].version, "2.0.0");
        assert!(f.store.tenant_module(f.tenant, crm).await.unwrap().unwrap().is_enabled);

        // A failed update can be retried through install.
        f.hook.fail.store(false, Ordering::SeqCst);
        let reinstalled = f
            .manager
            .install(f.tenant, crm, f.actor, Some("3.0.0"), json!({}))
            .await
            .unwrap();
        assert_eq!(reinstalled.id, updated.id);
        assert_eq!(reinstalled.version, "3.0.0");
    }

    #[tokio::test]
    async fn test_update_requires_installed() {
        let f = Fixture::new();
        let crm = f.module("crm").await;
        assert_eq!(
            f.manager
                .update(f.tenant, crm, f.actor, "2.0.0")
                .await
                .unwrap_err(),
            ModuleError::NotInstalled("crm".to_string())
        );
    }

    #[tokio::test]
    async fn test_enable_revalidates_dependencies() {
        let f = Fixture::new();
        let accounting = f.module("accounting").await;
        let payments = f.module("payments").await;
        f.registry
            .add_dependency(ModuleDependency::required(payments, accounting))
            .await
            .unwrap();

        f.install(accounting).await.unwrap();
        f.install(payments).await.unwrap();
        f.manager.disable(f.tenant, payments, f.actor).await.unwrap();
        f.manager.disable(f.tenant, accounting, f.actor).await.unwrap();

        assert_eq!(
            f.manager.enable(f.tenant, payments, f.actor).await.unwrap_err(),
            ModuleError::MissingDependency(vec!["accounting".to_string()])
        );

        f.manager.enable(f.tenant, accounting, f.actor).await.unwrap();
        assert!(f.manager.enable(f.tenant, payments, f.actor).await.unwrap().is_enabled);
    }

    #[tokio::test]
    async fn test_enable_without_revalidation() {
        let f = Fixture::with_config(ModuleServiceConfig {
            revalidate_on_enable: false,
            ..ModuleServiceConfig::default()
        });
        let accounting = f.module("accounting").await;
        let payments = f.module("payments").await;
        f.registry
            .add_dependency(ModuleDependency::required(payments, accounting))
            .await
            .unwrap();

        f.install(accounting).await.unwrap();
        f.install(payments).await.unwrap();
        f.manager.disable(f.tenant, payments, f.actor).await.unwrap();
        f.manager.disable(f.tenant, accounting, f.actor).await.unwrap();

        assert!(f.manager.enable(f.tenant, payments, f.actor).await.unwrap().is_enabled);
    }

    #[tokio::test]
    async fn test_enable_rejects_conflict_without_revalidation() {
        let f = Fixture::with_config(ModuleServiceConfig {
            revalidate_on_enable: false,
            ..ModuleServiceConfig::default()
        });
        let pos = f.module("pos").await;
        let legacy = f.module("legacy").await;
        f.registry
            .add_dependency(ModuleDependency::conflict(pos, legacy))
            .await
            .unwrap();

        f.install(legacy).await.unwrap();
        f.manager.disable(f.tenant, legacy, f.actor).await.unwrap();
        f.install(pos).await.unwrap();

        assert_eq!(
            f.manager.enable(f.tenant, legacy, f.actor).await.unwrap_err(),
            ModuleError::ConflictingModuleEnabled(vec!["pos".to_string()])
        );
        let row = f.store.tenant_module(f.tenant, legacy).await.unwrap().unwrap();
        assert!(!row.is_enabled);
    }

    #[tokio::test]
    async fn test_install_rejects_empty_version() {
        let f = Fixture::new();
        let crm = f.module("crm").await;

        assert!(matches!(
            f.manager
                .install(f.tenant, crm, f.actor, Some("  "), json!({}))
                .await,
            Err(ModuleError::InvalidModule(_))
        ));
        assert!(f.store.installations(f.tenant, crm).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enable_disable_idempotent_and_require_install() {
        let f = Fixture::new();
        let crm = f.module("crm").await;

        assert_eq!(
            f.manager.enable(f.tenant, crm, f.actor).await.unwrap_err(),
            ModuleError::NotInstalled("crm".to_string())
        );

        f.install(crm).await.unwrap();
        assert!(f.manager.enable(f.tenant, crm, f.actor).await.unwrap().is_enabled);
        assert!(!f.manager.disable(f.tenant, crm, f.actor).await.unwrap().is_enabled);
        assert!(!f.manager.disable(f.tenant, crm, f.actor).await.unwrap().is_enabled);

        f.manager.enable(f.tenant, crm, f.actor).await.unwrap();
        f.manager.uninstall(f.tenant, crm, f.actor).await.unwrap();
        assert_eq!(
            f.manager.enable(f.tenant, crm, f.actor).await.unwrap_err(),
            ModuleError::NotInstalled("crm".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_config_only_touches_enablement_row() {
        let f = Fixture::new();
        let checkin = f.module("checkin").await;
        f.manager
            .install(f.tenant, checkin, f.actor, None, json!({"kiosk": false}))
            .await
            .unwrap();

        let row = f
            .manager
            .update_config_raw(f.tenant, checkin, f.actor, r#"{"kiosk": true}"#)
            .await
            .unwrap();
        assert_eq!(row.config, json!({"kiosk": true}));

        let history = f.store.installations(f.tenant, checkin).await.unwrap();
        assert_eq!(history[0].config, json!({"kiosk": false}));

        assert!(matches!(
            f.manager
                .update_config_raw(f.tenant, checkin, f.actor, "{\"kiosk\":")
                .await,
            Err(ModuleError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_events_published_after_commit() {
        let registry = Arc::new(MemoryModuleRegistry::new());
        let store = Arc::new(MemoryModuleStore::new());
        let bus = Arc::new(MemoryEventBus::new());
        let manager =
            ModuleLifecycleManager::new(registry.clone(), store).with_events(bus.clone());
        let mut subscription = bus.subscribe("modules.module.*").await.unwrap();

        let crm = registry
            .register(Module::new("crm", "1.0.0", ModuleCategory::Crm))
            .await
            .unwrap();
        let (tenant, actor) = (Uuid::now_v7(), Uuid::now_v7());

        manager
            .install(tenant, crm.id, actor, None, json!({}))
            .await
            .unwrap();
        manager.disable(tenant, crm.id, actor).await.unwrap();

        let installed = subscription.recv().await.unwrap();
        assert_eq!(installed.event_type, "module.installed");
        assert_eq!(installed.tenant_id, Some(tenant));
        assert_eq!(installed.actor_id, Some(actor));

        let disabled = subscription.recv().await.unwrap();
        assert_eq!(disabled.actor_id, Some(actor));
        let payload: ModuleEvent = disabled.parse_payload().unwrap();
        assert_eq!(
            payload,
            ModuleEvent::Disabled {
                module_id: crm.id,
                module_name: "crm".to_string()
            }
        );
    }
}
