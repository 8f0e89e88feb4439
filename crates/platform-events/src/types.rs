//! Event types for module lifecycle notifications
//!
//! This module defines the event envelope and the module lifecycle events
//! published after a tenant's module state changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Source name used by the module lifecycle manager.
pub const MODULES_SOURCE: &str = "modules";

/// Event envelope.
///
/// All events are wrapped in this envelope which provides metadata
/// for routing, tracing, and processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID
    pub id: Uuid,

    /// Event type (e.g., "module.installed", "module.disabled")
    pub event_type: String,

    /// Publishing service
    pub source: String,

    /// Timestamp when event was created
    pub timestamp: DateTime<Utc>,

    /// Tenant the event belongs to
    pub tenant_id: Option<Uuid>,

    /// Actor who triggered the event
    pub actor_id: Option<Uuid>,

    /// Correlation ID for tracing
    pub correlation_id: Option<String>,

    /// Event version for schema evolution
    pub version: u32,

    /// Event payload
    pub payload: serde_json::Value,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Event {
    /// Create a new event.
    ///
    /// # Arguments
    ///
    /// * `event_type` - The event type string
    /// * `source` - The publishing service
    /// * `payload` - The event payload
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: event_type.into(),
            source: source.into(),
            timestamp: Utc::now(),
            tenant_id: None,
            actor_id: None,
            correlation_id: None,
            version: 1,
            payload,
            metadata: HashMap::new(),
        }
    }

    /// Set tenant context.
    pub fn with_tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// Set actor context.
    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Set correlation ID.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Add metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Get the topic for this event.
    ///
    /// Topics are structured as: `{source}.{event_type}`
    pub fn topic(&self) -> String {
        format!("{}.{}", self.source, self.event_type)
    }

    /// Parse the payload into a specific type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Lifecycle events for a tenant's modules.
///
/// Every variant names the module both by id and by its catalog name so
/// consumers can log or display it without a registry lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModuleEvent {
    /// Module was installed and enabled
    Installed {
        module_id: Uuid,
        module_name: String,
        installation_id: Uuid,
        version: String,
    },
    /// An install attempt was recorded as failed
    InstallFailed {
        module_id: Uuid,
        module_name: String,
        installation_id: Uuid,
        error: String,
    },
    /// Installed version changed
    Updated {
        module_id: Uuid,
        module_name: String,
        installation_id: Uuid,
        from_version: String,
        to_version: String,
    },
    /// A version update was recorded as failed
    UpdateFailed {
        module_id: Uuid,
        module_name: String,
        installation_id: Uuid,
        error: String,
    },
    /// Module was uninstalled (and disabled)
    Uninstalled {
        module_id: Uuid,
        module_name: String,
        installation_id: Uuid,
    },
    /// Module was enabled
    Enabled { module_id: Uuid, module_name: String },
    /// Module was disabled
    Disabled { module_id: Uuid, module_name: String },
    /// Tenant configuration for the module was replaced
    ConfigUpdated { module_id: Uuid, module_name: String },
}

impl ModuleEvent {
    /// Event type string, e.g. `module.installed`.
    pub fn event_type(&self) -> &'static str {
        match self {
            ModuleEvent::Installed { .. } => "module.installed",
            ModuleEvent::InstallFailed { .. } => "module.install_failed",
            ModuleEvent::Updated { .. } => "module.updated",
            ModuleEvent::UpdateFailed { .. } => "module.update_failed",
            ModuleEvent::Uninstalled { .. } => "module.uninstalled",
            ModuleEvent::Enabled { .. } => "module.enabled",
            ModuleEvent::Disabled { .. } => "module.disabled",
            ModuleEvent::ConfigUpdated { .. } => "module.config_updated",
        }
    }

    /// The module this event is about.
    pub fn module_id(&self) -> Uuid {
        match self {
            ModuleEvent::Installed { module_id, .. }
            | ModuleEvent::InstallFailed { module_id, .. }
            | ModuleEvent::Updated { module_id, .. }
            | ModuleEvent::UpdateFailed { module_id, .. }
            | ModuleEvent::Uninstalled { module_id, .. }
            | ModuleEvent::Enabled { module_id, .. }
            | ModuleEvent::Disabled { module_id, .. }
            | ModuleEvent::ConfigUpdated { module_id, .. } => *module_id,
        }
    }

    /// Whether consumers caching enablement for the tenant must refresh.
    pub fn changes_enablement(&self) -> bool {
        matches!(
            self,
            ModuleEvent::Installed { .. }
                | ModuleEvent::Uninstalled { .. }
                | ModuleEvent::Enabled { .. }
                | ModuleEvent::Disabled { .. }
        )
    }

    /// Convert to a generic event scoped to a tenant.
    pub fn to_event(&self, tenant_id: Uuid) -> Event {
        let payload = serde_json::to_value(self).unwrap_or_default();
        Event::new(self.event_type(), MODULES_SOURCE, payload).with_tenant(tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let payload = serde_json::json!({"key": "value"});
        let event = Event::new("module.enabled", MODULES_SOURCE, payload)
            .with_tenant(Uuid::now_v7())
            .with_actor(Uuid::now_v7());

        assert_eq!(event.event_type, "module.enabled");
        assert_eq!(event.source, "modules");
        assert!(event.tenant_id.is_some());
        assert!(event.actor_id.is_some());
    }

    #[test]
    fn test_event_topic() {
        let event = Event::new("module.installed", MODULES_SOURCE, serde_json::json!({}));
        assert_eq!(event.topic(), "modules.module.installed");
    }

    #[test]
    fn test_module_event_to_event() {
        let tenant_id = Uuid::now_v7();
        let module_id = Uuid::now_v7();
        let module_event = ModuleEvent::Disabled {
            module_id,
            module_name: "crm".to_string(),
        };

        let event = module_event.to_event(tenant_id);
        assert_eq!(event.event_type, "module.disabled");
        assert_eq!(event.tenant_id, Some(tenant_id));
        assert_eq!(event.payload["type"], "disabled");
        assert_eq!(event.payload["module_name"], "crm");

        let parsed: ModuleEvent = event.parse_payload().unwrap();
        assert_eq!(parsed, module_event);
        assert_eq!(parsed.module_id(), module_id);
    }

    #[test]
    fn test_changes_enablement() {
        let module_id = Uuid::now_v7();
        assert!(ModuleEvent::Enabled {
            module_id,
            module_name: "pos".to_string()
        }
        .changes_enablement());
        assert!(!ModuleEvent::ConfigUpdated {
            module_id,
            module_name: "pos".to_string()
        }
        .changes_enablement());
        assert!(!ModuleEvent::InstallFailed {
            module_id,
            module_name: "pos".to_string(),
            installation_id: Uuid::now_v7(),
            error: "boom".to_string(),
        }
        .changes_enablement());
    }
}
