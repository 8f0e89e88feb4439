//! Event bus implementation
//!
//! This module provides the event bus abstraction and an in-memory
//! implementation for publishing and subscribing to module lifecycle events.

use crate::types::Event;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

/// Event bus error types.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// Failed to publish event
    #[error("Failed to publish event: {0}")]
    PublishError(String),

    /// Failed to subscribe
    #[error("Failed to subscribe: {0}")]
    SubscribeError(String),

    /// Unknown subscription
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for event bus operations.
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Subscription handle for receiving events.
pub struct Subscription {
    /// Subscription ID
    pub id: String,
    /// Topic pattern
    pub topic: String,
    /// Event receiver
    pub receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Receive the next event.
    ///
    /// Lagging receivers skip the events they missed rather than failing.
    pub async fn recv(&mut self) -> EventBusResult<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        subscription_id = %self.id,
                        skipped,
                        "Subscriber lagged, events dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed)
                }
            }
        }
    }
}

/// Event handler trait for processing events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: Event) -> EventBusResult<()>;

    /// Get the topic patterns this handler is interested in.
    fn topics(&self) -> Vec<String>;
}

/// Event bus trait for publish/subscribe operations.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event.
    async fn publish(&self, event: Event) -> EventBusResult<()>;

    /// Subscribe to a topic pattern.
    ///
    /// Topic patterns support wildcards:
    /// - `*` matches any single segment
    /// - `#` matches zero or more segments
    ///
    /// Examples:
    /// - `modules.module.*` matches `modules.module.installed`
    /// - `modules.#` matches every module lifecycle event
    async fn subscribe(&self, topic: &str) -> EventBusResult<Subscription>;

    /// Register an event handler.
    async fn register_handler(&self, handler: Arc<dyn EventHandler>) -> EventBusResult<()>;

    /// Drop a subscription by ID.
    async fn unsubscribe(&self, subscription_id: &str) -> EventBusResult<()>;

    /// Get event bus stats.
    async fn stats(&self) -> EventBusStats;
}

/// Event bus statistics.
#[derive(Debug, Clone, Default)]
pub struct EventBusStats {
    /// Total events published
    pub events_published: u64,
    /// Total deliveries to subscribers and handlers
    pub events_delivered: u64,
    /// Active subscriptions
    pub active_subscriptions: usize,
    /// Registered handlers
    pub registered_handlers: usize,
}

/// Check if a dotted topic matches a dotted pattern.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let topic: Vec<&str> = topic.split('.').collect();
    segments_match(&pattern, &topic)
}

fn segments_match(pattern: &[&str], topic: &[&str]) -> bool {
    match pattern.split_first() {
        None => topic.is_empty(),
        Some((&"#", rest)) => (0..=topic.len()).any(|skip| segments_match(rest, &topic[skip..])),
        Some((&"*", rest)) => !topic.is_empty() && segments_match(rest, &topic[1..]),
        Some((segment, rest)) => {
            topic.first() == Some(segment) && segments_match(rest, &topic[1..])
        }
    }
}

/// In-memory event bus implementation.
///
/// Suitable for single-process deployments and testing.
pub struct MemoryEventBus {
    /// Broadcast channel per topic pattern
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<Event>>>>,
    /// Subscription ID -> topic pattern
    subscriptions: Arc<RwLock<HashMap<String, String>>>,
    /// Registered handlers
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
    events_published: AtomicU64,
    events_delivered: Arc<AtomicU64>,
    /// Default channel capacity
    channel_capacity: usize,
}

impl std::fmt::Debug for MemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEventBus")
            .field("channel_capacity", &self.channel_capacity)
            .field(
                "events_published",
                &self.events_published.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl MemoryEventBus {
    /// Create a new in-memory event bus.
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create with custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            handlers: Arc::new(RwLock::new(Vec::new())),
            events_published: AtomicU64::new(0),
            events_delivered: Arc::new(AtomicU64::new(0)),
            channel_capacity: capacity.max(1),
        }
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, event: Event) -> EventBusResult<()> {
        let topic = event.topic();
        self.events_published.fetch_add(1, Ordering::Relaxed);

        {
            let channels = self.channels.read().await;
            for (pattern, sender) in channels.iter() {
                if topic_matches(pattern, &topic) {
                    // Err only means nobody is listening right now.
                    if let Ok(receivers) = sender.send(event.clone()) {
                        self.events_delivered
                            .fetch_add(receivers as u64, Ordering::Relaxed);
                    }
                }
            }
        }

        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            if handler
                .topics()
                .iter()
                .any(|pattern| topic_matches(pattern, &topic))
            {
                let handler = handler.clone();
                let event = event.clone();
                let delivered = self.events_delivered.clone();
                tokio::task::spawn(async move {
                    match handler.handle(event).await {
                        Ok(()) => {
                            delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => tracing::error!(error = %e, "Event handler failed"),
                    }
                });
            }
        }

        tracing::debug!(topic = %topic, event_id = %event.id, "Event published");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> EventBusResult<Subscription> {
        if topic.is_empty() {
            return Err(EventBusError::SubscribeError(
                "topic pattern must not be empty".to_string(),
            ));
        }

        let id = uuid::Uuid::now_v7().to_string();

        let receiver = {
            let mut channels = self.channels.write().await;
            match channels.get(topic) {
                Some(sender) => sender.subscribe(),
                None => {
                    let (sender, receiver) = broadcast::channel(self.channel_capacity);
                    channels.insert(topic.to_string(), sender);
                    receiver
                }
            }
        };

        self.subscriptions
            .write()
            .await
            .insert(id.clone(), topic.to_string());

        Ok(Subscription {
            id,
            topic: topic.to_string(),
            receiver,
        })
    }

    async fn register_handler(&self, handler: Arc<dyn EventHandler>) -> EventBusResult<()> {
        self.handlers.write().await.push(handler);
        Ok(())
    }

    async fn unsubscribe(&self, subscription_id: &str) -> EventBusResult<()> {
        let mut subscriptions = self.subscriptions.write().await;
        let topic = subscriptions
            .remove(subscription_id)
            .ok_or_else(|| EventBusError::SubscriptionNotFound(subscription_id.to_string()))?;

        // Last subscriber for the pattern: drop the channel too.
        if !subscriptions.values().any(|t| *t == topic) {
            self.channels.write().await.remove(&topic);
        }

        Ok(())
    }

    async fn stats(&self) -> EventBusStats {
        EventBusStats {
            events_published: self.events_published.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            active_subscriptions: self.subscriptions.read().await.len(),
            registered_handlers: self.handlers.read().await.len(),
        }
    }
}
