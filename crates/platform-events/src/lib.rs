//! # Platform Events
//!
//! This crate provides the event bus used to broadcast tenant module
//! lifecycle changes to the rest of the platform.
//!
//! ## Overview
//!
//! The platform-events crate handles:
//! - **Event Envelope**: Tenant- and actor-scoped event metadata
//! - **Module Events**: Install, update, uninstall, enable, disable, config changes
//! - **Event Bus**: Publish/subscribe messaging with topic wildcards
//! - **Event Handlers**: Async event processing
//!
//! Services that cache a tenant's enabled modules subscribe here and drop
//! their cached copy when an event with [`ModuleEvent::changes_enablement`]
//! arrives for that tenant.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use platform_events::{EventBus, MemoryEventBus, ModuleEvent};
//! use uuid::Uuid;
//!
//! async fn example() {
//!     let bus = MemoryEventBus::new();
//!     let mut sub = bus.subscribe("modules.module.*").await.unwrap();
//!
//!     let event = ModuleEvent::Enabled {
//!         module_id: Uuid::now_v7(),
//!         module_name: "crm".to_string(),
//!     };
//!     bus.publish(event.to_event(Uuid::now_v7())).await.unwrap();
//!
//!     while let Ok(event) = sub.recv().await {
//!         println!("Received: {}", event.event_type);
//!     }
//! }
//! ```
//!
//! ## Topic Patterns
//!
//! Topics are structured as `{source}.{event_type}`:
//! - `modules.module.installed` - Specific event
//! - `modules.module.*` - All module lifecycle events
//! - `#` - All events
//!
//! Wildcards:
//! - `*` matches exactly one segment
//! - `#` matches zero or more segments

pub mod bus;
pub mod types;

// Re-export main types
pub use bus::{
    topic_matches, EventBus, EventBusError, EventBusResult, EventBusStats, EventHandler,
    MemoryEventBus, Subscription,
};
pub use types::{Event, ModuleEvent, MODULES_SOURCE};
