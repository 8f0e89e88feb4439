//! Dependency graph evaluator
//!
//! Answers "may this module be installed or enabled" and "may it be disabled
//! or uninstalled" for one tenant, given the catalog and a snapshot of the
//! tenant's enablement rows. Nothing here mutates state; the lifecycle
//! manager takes the snapshot inside its transaction so the answer holds at
//! commit time.

use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ModuleError, ModuleResult};
use crate::graph::{self, Cycle};
use crate::installation::InstallationStatus;
use crate::module::Module;
use crate::registry::{module_name, ModuleRegistry};
use crate::tenant_module::TenantModule;

/// The set of modules enabled for one tenant at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnablementSnapshot {
    /// Tenant ID
    pub tenant_id: Uuid,
    /// Modules with an enabled row
    pub enabled: HashSet<Uuid>,
}

impl EnablementSnapshot {
    /// Build a snapshot from a tenant's enablement rows.
    pub fn from_rows<'a>(tenant_id: Uuid, rows: impl IntoIterator<Item = &'a TenantModule>) -> Self {
        Self {
            tenant_id,
            enabled: rows
                .into_iter()
                .filter(|row| row.tenant_id == tenant_id && row.is_enabled)
                .map(|row| row.module_id)
                .collect(),
        }
    }

    /// Whether `module_id` is enabled in this snapshot.
    pub fn is_enabled(&self, module_id: Uuid) -> bool {
        self.enabled.contains(&module_id)
    }
}

/// Dependency checks over the registry.
#[derive(Clone)]
pub struct DependencyEvaluator {
    registry: Arc<dyn ModuleRegistry>,
}

impl DependencyEvaluator {
    /// Create an evaluator reading from `registry`.
    pub fn new(registry: Arc<dyn ModuleRegistry>) -> Self {
        Self { registry }
    }

    /// Check that `module_id` may become enabled.
    ///
    /// Runs [`check_dependencies`](Self::check_dependencies) then
    /// [`check_conflicts`](Self::check_conflicts).
    pub async fn check_install_preconditions(
        &self,
        module_id: Uuid,
        snapshot: &EnablementSnapshot,
    ) -> ModuleResult<()> {
        self.check_dependencies(module_id, snapshot).await?;
        self.check_conflicts(module_id, snapshot).await
    }

    /// Every required dependency of `module_id` must be enabled, otherwise
    /// `MissingDependency` lists all unmet ones.
    pub async fn check_dependencies(
        &self,
        module_id: Uuid,
        snapshot: &EnablementSnapshot,
    ) -> ModuleResult<()> {
        let mut missing = Vec::new();
        for edge in self
            .registry
            .list_dependencies(module_id)
            .await?
            .iter()
            .filter(|e| e.is_hard_dependency())
        {
            if !snapshot.is_enabled(edge.depends_on_id) {
                missing.push(self.name(edge.depends_on_id).await);
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        missing.sort();
        tracing::warn!(
            tenant_id = %snapshot.tenant_id,
            module_id = %module_id,
            missing = ?missing,
            "Required dependencies not enabled"
        );
        Err(ModuleError::MissingDependency(missing))
    }

    /// No enabled module may conflict with `module_id` in either direction,
    /// otherwise `ConflictingModuleEnabled`.
    pub async fn check_conflicts(
        &self,
        module_id: Uuid,
        snapshot: &EnablementSnapshot,
    ) -> ModuleResult<()> {
        let outgoing = self.registry.list_dependencies(module_id).await?;
        let incoming = self.registry.list_dependents(module_id).await?;
        let mut conflicting: Vec<Uuid> = outgoing
            .iter()
            .filter(|e| e.conflicts_with && snapshot.is_enabled(e.depends_on_id))
            .map(|e| e.depends_on_id)
            .chain(
                incoming
                    .iter()
                    .filter(|e| e.conflicts_with && snapshot.is_enabled(e.module_id))
                    .map(|e| e.module_id),
            )
            .collect();
        conflicting.sort();
        conflicting.dedup();

        if conflicting.is_empty() {
            return Ok(());
        }

        let names = self.names(&conflicting).await;
        tracing::warn!(
            tenant_id = %snapshot.tenant_id,
            module_id = %module_id,
            conflicting = ?names,
            "Conflicting module enabled"
        );
        Err(ModuleError::ConflictingModuleEnabled(names))
    }

    /// Check that `module_id` may be disabled.
    ///
    /// Fails with `DependentModulesExist` if any enabled module of the tenant
    /// has a required edge to it.
    pub async fn check_disable_preconditions(
        &self,
        module_id: Uuid,
        snapshot: &EnablementSnapshot,
    ) -> ModuleResult<()> {
        let dependents: Vec<Uuid> = self
            .registry
            .list_dependents(module_id)
            .await?
            .into_iter()
            .filter(|e| e.is_hard_dependency() && snapshot.is_enabled(e.module_id))
            .map(|e| e.module_id)
            .collect();

        if dependents.is_empty() {
            return Ok(());
        }

        let names = self.names(&dependents).await;
        tracing::warn!(
            tenant_id = %snapshot.tenant_id,
            module_id = %module_id,
            dependents = ?names,
            "Enabled modules still depend on module"
        );
        Err(ModuleError::DependentModulesExist(names))
    }

    /// Check that `module_id`, currently in `status`, may be uninstalled.
    ///
    /// Same reverse-dependency rule as disable. An install or update still in
    /// flight is never torn down.
    pub async fn check_uninstall_preconditions(
        &self,
        module_id: Uuid,
        status: InstallationStatus,
        snapshot: &EnablementSnapshot,
    ) -> ModuleResult<()> {
        if status.is_transient() {
            return Err(ModuleError::InvalidStateTransition {
                from: status,
                to: InstallationStatus::Uninstalling,
            });
        }
        self.check_disable_preconditions(module_id, snapshot).await
    }

    /// Modules to install, in order, so that `module_id` can be installed.
    ///
    /// Covers the transitive required-dependency closure and ends with the
    /// module itself. Nothing is installed; this only informs the caller.
    pub async fn install_plan(&self, module_id: Uuid) -> ModuleResult<Vec<Module>> {
        self.registry.get(module_id).await?;
        let edges = self.registry.list_edges().await?;

        let order = match graph::install_order(module_id, &edges) {
            Ok(order) => order,
            Err(Cycle(path)) => return Err(ModuleError::DependencyCycle(self.names(&path).await)),
        };

        let mut plan = Vec::with_capacity(order.len());
        for id in order {
            plan.push(self.registry.get(id).await?);
        }
        Ok(plan)
    }

    async fn name(&self, module_id: Uuid) -> String {
        module_name(self.registry.as_ref(), module_id).await
    }

    async fn names(&self, module_ids: &[Uuid]) -> Vec<String> {
        let mut names = Vec::with_capacity(module_ids.len());
        for id in module_ids {
            names.push(self.name(*id).await);
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ModuleCategory, ModuleDependency};
    use crate::registry::MemoryModuleRegistry;

    struct Fixture {
        evaluator: DependencyEvaluator,
        registry: Arc<MemoryModuleRegistry>,
        tenant_id: Uuid,
    }

    impl Fixture {
        async fn new() -> Self {
            let registry = Arc::new(MemoryModuleRegistry::new());
            Self {
                evaluator: DependencyEvaluator::new(registry.clone()),
                registry,
                tenant_id: Uuid::now_v7(),
            }
        }

        async fn module(&self, name: &str) -> Uuid {
            self.registry
                .register(Module::new(name, "1.0.0", ModuleCategory::Other))
                .await
                .unwrap()
                .id
        }

        fn snapshot(&self, enabled: &[Uuid]) -> EnablementSnapshot {
            EnablementSnapshot {
                tenant_id: self.tenant_id,
                enabled: enabled.iter().copied().collect(),
            }
        }
    }

    #[tokio::test]
    async fn test_install_requires_enabled_dependencies() {
        let f = Fixture::new().await;
        let accounting = f.module("accounting").await;
        let crm = f.module("crm").await;
        let payments = f.module("payments").await;
        f.registry
            .add_dependency(ModuleDependency::required(payments, accounting))
            .await
            .unwrap();
        f.registry
            .add_dependency(ModuleDependency::required(payments, crm))
            .await
            .unwrap();

        let err = f
            .evaluator
            .check_install_preconditions(payments, &f.snapshot(&[]))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ModuleError::MissingDependency(vec!["accounting".to_string(), "crm".to_string()])
        );

        assert!(f
            .evaluator
            .check_install_preconditions(payments, &f.snapshot(&[accounting, crm]))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_optional_dependency_not_required() {
        let f = Fixture::new().await;
        let lms = f.module("lms").await;
        let hrm = f.module("hrm").await;
        f.registry
            .add_dependency(ModuleDependency::optional(lms, hrm))
            .await
            .unwrap();

        assert!(f
            .evaluator
            .check_install_preconditions(lms, &f.snapshot(&[]))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_dependency_not_blocked_by_dependent() {
        let f = Fixture::new().await;
        let a = f.module("a").await;
        let b = f.module("b").await;
        f.registry
            .add_dependency(ModuleDependency::required(a, b))
            .await
            .unwrap();

        for enabled in [vec![], vec![a]] {
            assert!(f
                .evaluator
                .check_install_preconditions(b, &f.snapshot(&enabled))
                .await
                .is_ok());
        }
    }

    #[tokio::test]
    async fn test_conflicts_checked_both_directions() {
        let f = Fixture::new().await;
        let pos = f.module("pos").await;
        let ecommerce = f.module("ecommerce").await;
        f.registry
            .add_dependency(ModuleDependency::conflict(pos, ecommerce))
            .await
            .unwrap();

        let err = f
            .evaluator
            .check_install_preconditions(pos, &f.snapshot(&[ecommerce]))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ModuleError::ConflictingModuleEnabled(vec!["ecommerce".to_string()])
        );

        let err = f
            .evaluator
            .check_install_preconditions(ecommerce, &f.snapshot(&[pos]))
            .await
            .unwrap_err();
        assert_eq!(err, ModuleError::ConflictingModuleEnabled(vec!["pos".to_string()]));
    }

    #[tokio::test]
    async fn test_conflict_check_ignores_missing_dependencies() {
        let f = Fixture::new().await;
        let accounting = f.module("accounting").await;
        let pos = f.module("pos").await;
        let legacy = f.module("legacy").await;
        f.registry
            .add_dependency(ModuleDependency::required(legacy, accounting))
            .await
            .unwrap();
        f.registry
            .add_dependency(ModuleDependency::conflict(pos, legacy))
            .await
            .unwrap();

        // Dependencies unmet but no conflict: only the dependency check fails.
        let snapshot = f.snapshot(&[]);
        assert!(f.evaluator.check_conflicts(legacy, &snapshot).await.is_ok());
        assert!(matches!(
            f.evaluator.check_dependencies(legacy, &snapshot).await,
            Err(ModuleError::MissingDependency(_))
        ));

        let snapshot = f.snapshot(&[accounting, pos]);
        assert!(f.evaluator.check_dependencies(legacy, &snapshot).await.is_ok());
        assert_eq!(
            f.evaluator.check_conflicts(legacy, &snapshot).await.unwrap_err(),
            ModuleError::ConflictingModuleEnabled(vec!["pos".to_string()])
        );
    }

    #[tokio::test]
    async fn test_disable_blocked_by_enabled_dependents_only() {
        let f = Fixture::new().await;
        let accounting = f.module("accounting").await;
        let payments = f.module("payments").await;
        let reports = f.module("reports").await;
        f.registry
            .add_dependency(ModuleDependency::required(payments, accounting))
            .await
            .unwrap();
        f.registry
            .add_dependency(ModuleDependency::optional(reports, accounting))
            .await
            .unwrap();

        let err = f
            .evaluator
            .check_disable_preconditions(accounting, &f.snapshot(&[accounting, payments, reports]))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ModuleError::DependentModulesExist(vec!["payments".to_string()])
        );

        assert!(f
            .evaluator
            .check_disable_preconditions(accounting, &f.snapshot(&[accounting, reports]))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_uninstall_rejects_in_flight_install() {
        let f = Fixture::new().await;
        let crm = f.module("crm").await;

        let err = f
            .evaluator
            .check_uninstall_preconditions(crm, InstallationStatus::Updating, &f.snapshot(&[crm]))
            .await
            .unwrap_err();
        assert!(matches!(err, ModuleError::InvalidStateTransition { .. }));

        assert!(f
            .evaluator
            .check_uninstall_preconditions(crm, InstallationStatus::Installed, &f.snapshot(&[crm]))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_install_plan_orders_dependencies_first() {
        let f = Fixture::new().await;
        let accounting = f.module("accounting").await;
        let payments = f.module("payments").await;
        let ecommerce = f.module("ecommerce").await;
        f.registry
            .add_dependency(ModuleDependency::required(payments, accounting))
            .await
            .unwrap();
        f.registry
            .add_dependency(ModuleDependency::required(ecommerce, payments))
            .await
            .unwrap();

        let plan: Vec<String> = f
            .evaluator
            .install_plan(ecommerce)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(plan, vec!["accounting", "payments", "ecommerce"]);
    }

    #[test]
    fn test_snapshot_ignores_disabled_and_foreign_rows() {
        let tenant = Uuid::now_v7();
        let enabled = TenantModule::new(tenant, Uuid::now_v7(), serde_json::json!({}));
        let mut disabled = TenantModule::new(tenant, Uuid::now_v7(), serde_json::json!({}));
        disabled.set_enabled(false);
        let foreign = TenantModule::new(Uuid::now_v7(), Uuid::now_v7(), serde_json::json!({}));

        let snapshot = EnablementSnapshot::from_rows(tenant, [&enabled, &disabled, &foreign]);
        assert!(snapshot.is_enabled(enabled.module_id));
        assert!(!snapshot.is_enabled(disabled.module_id));
        assert!(!snapshot.is_enabled(foreign.module_id));
    }
}
