//! Error types for module lifecycle operations
//!
//! Precondition failures carry the human-readable module names involved so
//! callers can show them verbatim. Only [`ModuleError::Timeout`] and
//! [`ModuleError::StorageFailure`] are worth retrying.

use std::time::Duration;
use thiserror::Error;

use crate::installation::InstallationStatus;

/// Module lifecycle error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    /// Module does not exist in the catalog or has been retired
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// An active installation already exists for this tenant
    #[error("Module is already installed: {0}")]
    AlreadyInstalled(String),

    /// No active, installed installation exists for this tenant
    #[error("Module is not installed: {0}")]
    NotInstalled(String),

    /// Required dependencies are not installed or not enabled
    #[error("Required dependencies are not installed or enabled: {}", .0.join(", "))]
    MissingDependency(Vec<String>),

    /// Enabled modules still require this module
    #[error("Enabled modules depend on this module: {}", .0.join(", "))]
    DependentModulesExist(Vec<String>),

    /// A module declared as conflicting is enabled
    #[error("Conflicting modules are enabled: {}", .0.join(", "))]
    ConflictingModuleEnabled(Vec<String>),

    /// Config payload is not a well-formed JSON object
    #[error("Invalid module config: {0}")]
    InvalidConfig(String),

    /// Installation is in a state that does not permit the operation
    #[error("Invalid installation state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// Current status
        from: InstallationStatus,
        /// Requested status
        to: InstallationStatus,
    },

    /// Operation did not commit within the request deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Underlying store failed; nothing was applied
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Provisioning hook rejected the install, update or uninstall
    #[error("Provisioning failed: {0}")]
    ProvisioningFailed(String),

    /// Catalog already has a module with this name
    #[error("Module name already registered: {0}")]
    DuplicateModule(String),

    /// Catalog edge would close a dependency cycle
    #[error("Dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// Catalog write is malformed (self edge, unknown endpoint, empty name)
    #[error("Invalid module definition: {0}")]
    InvalidModule(String),
}

/// Result type for module operations.
pub type ModuleResult<T> = Result<T, ModuleError>;

impl ModuleError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModuleError::Timeout(_) | ModuleError::StorageFailure(_))
    }

    /// Check if this error should be logged at error level.
    ///
    /// Precondition failures are expected outcomes of tenant requests.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ModuleError::StorageFailure(_)
                | ModuleError::Timeout(_)
                | ModuleError::ProvisioningFailed(_)
        )
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ModuleError::ModuleNotFound(_) | ModuleError::NotInstalled(_) => 404,

            ModuleError::AlreadyInstalled(_)
            | ModuleError::DependentModulesExist(_)
            | ModuleError::ConflictingModuleEnabled(_)
            | ModuleError::InvalidStateTransition { .. }
            | ModuleError::DuplicateModule(_) => 409,

            ModuleError::MissingDependency(_) | ModuleError::DependencyCycle(_) => 422,

            ModuleError::InvalidConfig(_) | ModuleError::InvalidModule(_) => 400,

            ModuleError::ProvisioningFailed(_) => 502,
            ModuleError::StorageFailure(_) => 503,
            ModuleError::Timeout(_) => 504,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            ModuleError::ModuleNotFound(_) => "MODULE_NOT_FOUND",
            ModuleError::AlreadyInstalled(_) => "ALREADY_INSTALLED",
            ModuleError::NotInstalled(_) => "NOT_INSTALLED",
            ModuleError::MissingDependency(_) => "MISSING_DEPENDENCY",
            ModuleError::DependentModulesExist(_) => "DEPENDENT_MODULES_EXIST",
            ModuleError::ConflictingModuleEnabled(_) => "CONFLICTING_MODULE_ENABLED",
            ModuleError::InvalidConfig(_) => "INVALID_CONFIG",
            ModuleError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            ModuleError::Timeout(_) => "TIMEOUT",
            ModuleError::StorageFailure(_) => "STORAGE_FAILURE",
            ModuleError::ProvisioningFailed(_) => "PROVISIONING_FAILED",
            ModuleError::DuplicateModule(_) => "DUPLICATE_MODULE",
            ModuleError::DependencyCycle(_) => "DEPENDENCY_CYCLE",
            ModuleError::InvalidModule(_) => "INVALID_MODULE",
        }
    }

    /// Module names carried by a precondition failure.
    pub fn module_names(&self) -> &[String] {
        match self {
            ModuleError::MissingDependency(names)
            | ModuleError::DependentModulesExist(names)
            | ModuleError::ConflictingModuleEnabled(names)
            | ModuleError::DependencyCycle(names) => names,
            _ => &[],
        }
    }
}
