//! Provisioning hook
//!
//! Provisioning whatever infrastructure a module needs is owned by an
//! external collaborator. The lifecycle manager calls the hook inside the
//! install, update and uninstall transactions, before commit; an error
//! aborts the transaction.

use async_trait::async_trait;
use uuid::Uuid;

/// What the hook is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionAction {
    /// First install, or a retry after a failed install
    Install,
    /// Version change of an installed module
    Update,
    /// Removal
    Uninstall,
}

/// Details passed to the hook.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Action being performed
    pub action: ProvisionAction,
    /// Tenant ID
    pub tenant_id: Uuid,
    /// Module ID
    pub module_id: Uuid,
    /// Catalog name of the module
    pub module_name: String,
    /// Installation record ID
    pub installation_id: Uuid,
    /// Version being installed or kept
    pub version: String,
    /// Config payload of the installation
    pub config: serde_json::Value,
}

/// Collaborator that provisions module resources for a tenant.
#[async_trait]
pub trait ProvisioningHook: Send + Sync {
    /// Provision for install or update.
    ///
    /// The returned value is stored as the installation's `install_data`.
    async fn provision(&self, request: &ProvisionRequest) -> Result<serde_json::Value, String>;

    /// Release resources on uninstall.
    async fn deprovision(&self, request: &ProvisionRequest) -> Result<(), String>;
}

/// Hook that provisions nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProvisioner;

#[async_trait]
impl ProvisioningHook for NoopProvisioner {
    async fn provision(&self, _request: &ProvisionRequest) -> Result<serde_json::Value, String> {
        Ok(serde_json::json!({}))
    }

    async fn deprovision(&self, _request: &ProvisionRequest) -> Result<(), String> {
        Ok(())
    }
}
