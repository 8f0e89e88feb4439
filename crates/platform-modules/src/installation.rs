//! Installation records and their state machine
//!
//! ```text
//! (none) --install--> Installing --success--> Installed
//! Installing --failure--> Failed
//! Installed --update--> Updating --success--> Installed
//! Updating --failure--> Failed
//! Failed --install--> Installing
//! Installed --uninstall--> Uninstalling (terminal: uninstalled_at set)
//! ```
//!
//! A record is *active* while `uninstalled_at` is unset. There is at most
//! one active record per (tenant, module); a retried install after a
//! failure reuses the failed record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ModuleError, ModuleResult};

/// Status of an installation attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InstallationStatus {
    /// Install in progress (never visible outside a transaction)
    Installing,
    /// Installed and usable
    Installed,
    /// Last install or update attempt failed
    Failed,
    /// Version update in progress
    Updating,
    /// Being removed; terminal once `uninstalled_at` is set
    Uninstalling,
}

impl InstallationStatus {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallationStatus::Installing => "installing",
            InstallationStatus::Installed => "installed",
            InstallationStatus::Failed => "failed",
            InstallationStatus::Updating => "updating",
            InstallationStatus::Uninstalling => "uninstalling",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: InstallationStatus) -> bool {
        use InstallationStatus::*;
        matches!(
            (self, next),
            (Installing, Installed)
                | (Installing, Failed)
                | (Installed, Updating)
                | (Installed, Uninstalling)
                | (Updating, Installed)
                | (Updating, Failed)
                | (Failed, Installing)
        )
    }

    /// In-flight statuses that must not be torn down.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InstallationStatus::Installing | InstallationStatus::Updating
        )
    }
}

impl std::fmt::Display for InstallationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tenant's attempt at installing a module.
///
/// Records are never deleted; uninstall sets `uninstalled_at` so the
/// history stays auditable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInstallation {
    /// Installation ID
    pub id: Uuid,

    /// Tenant ID
    pub tenant_id: Uuid,

    /// Module ID
    pub module_id: Uuid,

    /// Installed version
    pub version: String,

    /// Current status
    pub status: InstallationStatus,

    /// Config payload supplied at install time (audit copy)
    pub config: serde_json::Value,

    /// Opaque data recorded by provisioning
    pub install_data: serde_json::Value,

    /// Cause of the last failure
    pub error_message: Option<String>,

    /// Actor who installed the module
    pub installed_by: Uuid,

    /// When the install was started
    pub installed_at: DateTime<Utc>,

    /// Last status change
    pub updated_at: DateTime<Utc>,

    /// Set once on uninstall, never cleared
    pub uninstalled_at: Option<DateTime<Utc>>,
}

impl ModuleInstallation {
    /// Creates a new record in `Installing` status.
    pub fn new(
        tenant_id: Uuid,
        module_id: Uuid,
        version: impl Into<String>,
        config: serde_json::Value,
        installed_by: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            tenant_id,
            module_id,
            version: version.into(),
            status: InstallationStatus::Installing,
            config,
            install_data: serde_json::json!({}),
            error_message: None,
            installed_by,
            installed_at: now,
            updated_at: now,
            uninstalled_at: None,
        }
    }

    /// Whether this record still occupies the (tenant, module) slot.
    pub fn is_active(&self) -> bool {
        self.uninstalled_at.is_none()
    }

    /// Move to `next`, enforcing the state machine.
    pub fn transition_to(&mut self, next: InstallationStatus) -> ModuleResult<()> {
        if !self.is_active() || !self.status.can_transition_to(next) {
            return Err(ModuleError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Start a fresh attempt on a failed record.
    pub fn restart(
        &mut self,
        version: impl Into<String>,
        config: serde_json::Value,
        installed_by: Uuid,
    ) -> ModuleResult<()> {
        self.transition_to(InstallationStatus::Installing)?;
        self.version = version.into();
        self.config = config;
        self.installed_by = installed_by;
        self.installed_at = self.updated_at;
        self.error_message = None;
        Ok(())
    }

    /// Record a failed attempt with its cause.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> ModuleResult<()> {
        self.transition_to(InstallationStatus::Failed)?;
        self.error_message = Some(error.into());
        Ok(())
    }

    /// Soft-terminate the record.
    pub fn mark_uninstalled(&mut self) -> ModuleResult<()> {
        self.transition_to(InstallationStatus::Uninstalling)?;
        self.uninstalled_at = Some(self.updated_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installation() -> ModuleInstallation {
        ModuleInstallation::new(
            Uuid::now_v7(),
            Uuid::now_v7(),
            "1.0.0",
            serde_json::json!({}),
            Uuid::now_v7(),
        )
    }

    #[test]
    fn test_new_installation_is_installing() {
        let inst = installation();
        assert_eq!(inst.status, InstallationStatus::Installing);
        assert!(inst.is_active());
        assert_eq!(inst.install_data, serde_json::json!({}));
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut inst = installation();
        inst.transition_to(InstallationStatus::Installed).unwrap();
        inst.transition_to(InstallationStatus::Updating).unwrap();
        inst.transition_to(InstallationStatus::Installed).unwrap();
        inst.mark_uninstalled().unwrap();

        assert_eq!(inst.status, InstallationStatus::Uninstalling);
        assert!(!inst.is_active());
        assert_eq!(inst.uninstalled_at, Some(inst.updated_at));
    }

    #[test]
    fn test_uninstalled_record_is_terminal() {
        let mut inst = installation();
        inst.transition_to(InstallationStatus::Installed).unwrap();
        inst.mark_uninstalled().unwrap();

        let err = inst.transition_to(InstallationStatus::Installed).unwrap_err();
        assert!(matches!(err, ModuleError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_cannot_uninstall_while_installing() {
        let mut inst = installation();
        let err = inst.mark_uninstalled().unwrap_err();
        assert_eq!(
            err,
            ModuleError::InvalidStateTransition {
                from: InstallationStatus::Installing,
                to: InstallationStatus::Uninstalling,
            }
        );
        assert!(inst.is_active());
    }

    #[test]
    fn test_failed_record_can_restart() {
        let mut inst = installation();
        inst.mark_failed("provisioning refused").unwrap();
        assert_eq!(inst.error_message.as_deref(), Some("provisioning refused"));

        let actor = Uuid::now_v7();
        inst.restart("1.1.0", serde_json::json!({"a": 1}), actor).unwrap();
        assert_eq!(inst.status, InstallationStatus::Installing);
        assert_eq!(inst.version, "1.1.0");
        assert_eq!(inst.installed_by, actor);
        assert!(inst.error_message.is_none());
    }

    #[test]
    fn test_transient_statuses() {
        assert!(InstallationStatus::Installing.is_transient());
        assert!(InstallationStatus::Updating.is_transient());
        assert!(!InstallationStatus::Installed.is_transient());
        assert!(!InstallationStatus::Failed.is_transient());
    }
}
