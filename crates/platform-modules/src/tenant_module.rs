//! Tenant enablement projection
//!
//! [`TenantModule`] is the row request-time code consults to decide whether
//! a module's features are active for a tenant. It is created by the first
//! successful install and mutated in place afterwards; uninstall disables it
//! rather than deleting it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::module::{Module, ModuleCategory};

/// Per-tenant on/off switch and config for an installed module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantModule {
    /// Row ID
    pub id: Uuid,

    /// Tenant ID
    pub tenant_id: Uuid,

    /// Module ID
    pub module_id: Uuid,

    /// Whether the module is active for the tenant
    pub is_enabled: bool,

    /// Tenant config; may diverge from the installation's audit copy
    pub config: serde_json::Value,

    /// When the row was first created
    pub installed_at: DateTime<Utc>,

    /// Last change
    pub updated_at: DateTime<Utc>,
}

impl TenantModule {
    /// Creates an enabled row.
    pub fn new(tenant_id: Uuid, module_id: Uuid, config: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            tenant_id,
            module_id,
            is_enabled: true,
            config,
            installed_at: now,
            updated_at: now,
        }
    }

    /// Flip the switch. Returns whether anything changed.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        if self.is_enabled == enabled {
            return false;
        }
        self.is_enabled = enabled;
        self.updated_at = Utc::now();
        true
    }

    /// Replace the tenant config.
    pub fn set_config(&mut self, config: serde_json::Value) {
        self.config = config;
        self.updated_at = Utc::now();
    }
}

/// A tenant's module row joined with catalog metadata.
///
/// This is what `GET /tenant/modules` returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantModuleView {
    /// The enablement row
    #[serde(flatten)]
    pub tenant_module: TenantModule,

    /// Catalog slug
    pub module_name: String,

    /// Human-readable name
    pub display_name: String,

    /// Catalog description
    pub description: Option<String>,

    /// Catalog version
    pub version: String,

    /// Catalog category
    pub category: ModuleCategory,

    /// Icon reference
    pub icon: Option<String>,
}

impl TenantModuleView {
    /// Join a row with its catalog entry.
    pub fn new(tenant_module: TenantModule, module: &Module) -> Self {
        Self {
            tenant_module,
            module_name: module.name.clone(),
            display_name: module.display_name.clone(),
            description: module.description.clone(),
            version: module.version.clone(),
            category: module.category,
            icon: module.icon.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_row_is_enabled() {
        let row = TenantModule::new(Uuid::now_v7(), Uuid::now_v7(), serde_json::json!({}));
        assert!(row.is_enabled);
        assert_eq!(row.installed_at, row.updated_at);
    }

    #[test]
    fn test_set_enabled_reports_change() {
        let mut row = TenantModule::new(Uuid::now_v7(), Uuid::now_v7(), serde_json::json!({}));
        assert!(!row.set_enabled(true));
        assert!(row.set_enabled(false));
        assert!(!row.is_enabled);
        assert!(!row.set_enabled(false));
    }

    #[test]
    fn test_view_flattens_row() {
        let module = Module::new("hrm", "3.0.0", ModuleCategory::Hrm).with_display_name("HR");
        let row = TenantModule::new(Uuid::now_v7(), module.id, serde_json::json!({"seats": 5}));
        let view = TenantModuleView::new(row, &module);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["module_name"], "hrm");
        assert_eq!(json["display_name"], "HR");
        assert_eq!(json["is_enabled"], true);
        assert_eq!(json["config"]["seats"], 5);
        assert_eq!(json["category"], "hrm");
    }
}
