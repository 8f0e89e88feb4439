//! # Platform Modules
//!
//! This crate manages optional feature modules (CRM, HRM, POS, ...) per
//! tenant: installing, enabling, configuring, disabling and uninstalling
//! them while keeping the dependency graph between modules satisfied.
//!
//! ## Overview
//!
//! The platform-modules crate handles:
//! - **Registry**: The tenant-independent module catalog and its dependency edges
//! - **Evaluator**: Install, enable, disable and uninstall preconditions
//! - **Lifecycle**: Transactional installation state machine per (tenant, module)
//! - **Enablement**: The on/off + config projection other services read
//! - **API**: Transport-agnostic REST routes over the lifecycle manager
//!
//! ## Guarantees
//!
//! - A module is never left enabled without its required dependencies
//! - A module is never disabled or removed while enabled modules require it
//! - At most one active installation exists per (tenant, module)
//! - Every operation commits atomically or not at all
//!
//! ## Installation States
//!
//! ```text
//! (none) --install--> Installing --success--> Installed
//! Installing --failure--> Failed --install--> Installing
//! Installed --update--> Updating --success--> Installed
//! Updating --failure--> Failed
//! Installed --uninstall--> Uninstalling (terminal, uninstalled_at set)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use platform_modules::{
//!     MemoryModuleRegistry, MemoryModuleStore, Module, ModuleCategory, ModuleDependency,
//!     ModuleLifecycleManager, ModuleServiceConfig,
//! };
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(MemoryModuleRegistry::new());
//!     let accounting = registry
//!         .register(Module::new("accounting", "1.0.0", ModuleCategory::Accounting))
//!         .await?;
//!     let payments = registry
//!         .register(Module::new("payments", "1.0.0", ModuleCategory::Payment))
//!         .await?;
//!     registry
//!         .add_dependency(ModuleDependency::required(payments.id, accounting.id))
//!         .await?;
//!
//!     let manager = ModuleLifecycleManager::new(registry, Arc::new(MemoryModuleStore::new()))
//!         .with_config(ModuleServiceConfig::from_env()?);
//!
//!     let (tenant, actor) = (Uuid::now_v7(), Uuid::now_v7());
//!     manager
//!         .install(tenant, accounting.id, actor, None, serde_json::json!({}))
//!         .await?;
//!     manager
//!         .install(tenant, payments.id, actor, None, serde_json::json!({}))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod enablement;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod hooks;
pub mod installation;
pub mod lifecycle;
pub mod module;
pub mod module_config;
pub mod registry;
pub mod retry;
pub mod store;
pub mod tenant_module;

// Re-export main types
pub use api::{
    ApiRequest, ApiResponse, InstallModuleRequest, ModuleApi, RequestContext,
    UpdateModuleConfigRequest, UpdateModuleVersionRequest,
};
pub use config::{ConfigError, ModuleServiceConfig};
pub use enablement::TenantEnablementStore;
pub use error::{ModuleError, ModuleResult};
pub use evaluator::{DependencyEvaluator, EnablementSnapshot};
pub use graph::{find_cycle, install_order, Cycle};
pub use hooks::{NoopProvisioner, ProvisionAction, ProvisionRequest, ProvisioningHook};
pub use installation::{InstallationStatus, ModuleInstallation};
pub use lifecycle::ModuleLifecycleManager;
pub use module::{Module, ModuleCategory, ModuleDependency};
pub use module_config::{parse_config, validate_config};
pub use registry::{module_name, MemoryModuleRegistry, ModuleRegistry};
pub use retry::{with_retry_if, RetryConfig};
pub use store::{MemoryModuleStore, ModuleStore, StoreTransaction};
pub use tenant_module::{TenantModule, TenantModuleView};
