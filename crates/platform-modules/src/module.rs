//! Module catalog domain models
//!
//! A [`Module`] is a tenant-independent catalog entry for an optional
//! feature unit (CRM, HRM, POS, ...). [`ModuleDependency`] edges declare
//! which modules must, or must not, be enabled alongside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Functional area a module belongs to.
///
/// Catalog listings are ordered by category, then by module name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModuleCategory {
    /// Customer relationship management
    Crm,
    /// Human resource management
    Hrm,
    /// Point of sale
    Pos,
    /// Learning management
    Lms,
    /// Check-in / attendance
    Checkin,
    /// Payments
    Payment,
    /// Accounting
    Accounting,
    /// Online store
    Ecommerce,
    /// Anything else
    Other,
}

impl ModuleCategory {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleCategory::Crm => "crm",
            ModuleCategory::Hrm => "hrm",
            ModuleCategory::Pos => "pos",
            ModuleCategory::Lms => "lms",
            ModuleCategory::Checkin => "checkin",
            ModuleCategory::Payment => "payment",
            ModuleCategory::Accounting => "accounting",
            ModuleCategory::Ecommerce => "ecommerce",
            ModuleCategory::Other => "other",
        }
    }
}

impl std::fmt::Display for ModuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog entry for an installable module.
///
/// Modules are created and retired by platform operators. Once any
/// installation references a module its identity never changes; retiring
/// it only clears `is_active`.
///
/// # Examples
///
/// ```
/// use platform_modules::{Module, ModuleCategory};
///
/// let module = Module::new("crm", "1.0.0", ModuleCategory::Crm)
///     .with_display_name("Customer Relations")
///     .with_permission("crm.contacts.read");
/// assert!(module.is_active);
/// assert_eq!(module.display_name, "Customer Relations");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Stable identity
    pub id: Uuid,

    /// Unique slug (e.g. "crm")
    pub name: String,

    /// Human-readable name
    pub display_name: String,

    /// Optional description
    pub description: Option<String>,

    /// Catalog version
    pub version: String,

    /// Functional category
    pub category: ModuleCategory,

    /// Icon reference for UIs
    pub icon: Option<String>,

    /// Globally available (false once retired)
    pub is_active: bool,

    /// Names of the modules this one depends on.
    ///
    /// Informational copy maintained by the registry; the
    /// [`ModuleDependency`] edges are authoritative.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Capability strings the module requires
    #[serde(default)]
    pub permissions: Vec<String>,

    /// When the module was registered
    pub created_at: DateTime<Utc>,

    /// When the catalog entry last changed
    pub updated_at: DateTime<Utc>,
}

impl Module {
    /// Creates a new active catalog entry.
    ///
    /// The display name defaults to the slug.
    pub fn new(name: impl Into<String>, version: impl Into<String>, category: ModuleCategory) -> Self {
        let now = Utc::now();
        let name = name.into();
        Self {
            id: Uuid::now_v7(),
            display_name: name.clone(),
            name,
            description: None,
            version: version.into(),
            category,
            icon: None,
            is_active: true,
            dependencies: Vec::new(),
            permissions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the display name.
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the icon.
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Add a required capability.
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        let permission = permission.into();
        if !self.permissions.contains(&permission) {
            self.permissions.push(permission);
        }
        self
    }
}

/// A directed catalog edge `module_id -> depends_on_id`.
///
/// With `conflicts_with` set the edge is a mutual-exclusion marker instead
/// of a dependency: the two modules may not be enabled together, in either
/// direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDependency {
    /// Edge ID
    pub id: Uuid,

    /// Dependent module
    pub module_id: Uuid,

    /// Module depended on (or conflicted with)
    pub depends_on_id: Uuid,

    /// Minimum version, informational only
    pub min_version: String,

    /// Hard dependency
    pub is_required: bool,

    /// Mutual-exclusion flag
    pub conflicts_with: bool,

    /// When the edge was declared
    pub created_at: DateTime<Utc>,
}

impl ModuleDependency {
    /// A hard dependency of `module_id` on `depends_on_id`.
    pub fn required(module_id: Uuid, depends_on_id: Uuid) -> Self {
        Self::edge(module_id, depends_on_id, true, false)
    }

    /// A soft dependency, never enforced.
    pub fn optional(module_id: Uuid, depends_on_id: Uuid) -> Self {
        Self::edge(module_id, depends_on_id, false, false)
    }

    /// A mutual-exclusion edge between two modules.
    pub fn conflict(module_id: Uuid, conflicts_with_id: Uuid) -> Self {
        Self::edge(module_id, conflicts_with_id, false, true)
    }

    fn edge(module_id: Uuid, depends_on_id: Uuid, is_required: bool, conflicts_with: bool) -> Self {
        Self {
            id: Uuid::now_v7(),
            module_id,
            depends_on_id,
            min_version: String::new(),
            is_required,
            conflicts_with,
            created_at: Utc::now(),
        }
    }

    /// Set the informational minimum version.
    pub fn with_min_version(mut self, min_version: impl Into<String>) -> Self {
        self.min_version = min_version.into();
        self
    }

    /// Whether this edge must be satisfied before `module_id` is enabled.
    pub fn is_hard_dependency(&self) -> bool {
        self.is_required && !self.conflicts_with
    }

    /// Whether this edge takes part in the dependency graph at all.
    pub fn is_dependency(&self) -> bool {
        !self.conflicts_with
    }
}
