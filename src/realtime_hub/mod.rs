//! RealtimeHub - Change Feed Distribution
//!
//! ## Responsibilities
//!
//! - Subscriptions by table + event type + optional screen equality filter
//! - Fan-out of change notifications to every matching subscriber
//! - WebSocket bridge for display devices outside this process
//!
//! Notifications only say *that* a row changed (table, event, record id,
//! screen id). They never carry queue state; subscribers re-read the Queue
//! Store. Delivery is at-least-once from the subscriber's point of view and
//! unordered across subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Tables that publish changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    QueueEntries,
    Screens,
}

/// Change event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeEvent {
    Insert,
    Update,
    Delete,
}

/// Equality filter on `screen_id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "screen_id")]
pub enum ScreenFilter {
    /// No filter
    Any,
    /// `screen_id = <id>`
    Screen(String),
    /// `screen_id IS NULL`
    GlobalPool,
}

impl ScreenFilter {
    pub fn matches(&self, screen_id: Option<&str>) -> bool {
        match self {
            ScreenFilter::Any => true,
            ScreenFilter::Screen(id) => screen_id == Some(id.as_str()),
            ScreenFilter::GlobalPool => screen_id.is_none(),
        }
    }
}

/// What a subscriber wants to hear about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub table: ChangeTable,
    pub event: ChangeEvent,
    pub filter: ScreenFilter,
}

impl Subscription {
    pub fn new(table: ChangeTable, event: ChangeEvent, filter: ScreenFilter) -> Self {
        Self {
            table,
            event,
            filter,
        }
    }

    pub fn matches(&self, notification: &ChangeNotification) -> bool {
        self.table == notification.table
            && self.event == notification.event
            && self.filter.matches(notification.screen_id.as_deref())
    }
}

/// Change notification (an invalidation hint, not a payload)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub table: ChangeTable,
    pub event: ChangeEvent,
    pub record_id: String,
    pub screen_id: Option<String>,
    pub emitted_at: DateTime<Utc>,
}

impl ChangeNotification {
    pub fn new(
        table: ChangeTable,
        event: ChangeEvent,
        record_id: impl Into<String>,
        screen_id: Option<&str>,
    ) -> Self {
        Self {
            table,
            event,
            record_id: record_id.into(),
            screen_id: screen_id.map(String::from),
            emitted_at: Utc::now(),
        }
    }
}

/// Subscriber registration
struct Subscriber {
    id: Uuid,
    label: String,
    subscriptions: Vec<Subscription>,
    tx: mpsc::UnboundedSender<ChangeNotification>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    subscriber_count: AtomicU64,
    published: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            subscriber_count: AtomicU64::new(0),
            published: AtomicU64::new(0),
        }
    }

    /// Register a subscriber for a set of subscriptions
    pub async fn subscribe(
        &self,
        label: impl Into<String>,
        subscriptions: Vec<Subscription>,
    ) -> (Uuid, mpsc::UnboundedReceiver<ChangeNotification>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let label = label.into();

        {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(
                id,
                Subscriber {
                    id,
                    label: label.clone(),
                    subscriptions,
                    tx,
                },
            );
        }

        self.subscriber_count.fetch_add(1, Ordering::Relaxed);
        tracing::info!(subscriber_id = %id, label = %label, "Realtime subscriber registered");

        (id, rx)
    }

    /// Drop a subscriber; its receiver sees the channel close
    pub async fn unsubscribe(&self, id: &Uuid) {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.remove(id).is_some() {
            self.subscriber_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(subscriber_id = %id, "Realtime subscriber removed");
        }
    }

    /// Publish to every matching subscriber, returning the number reached
    pub async fn publish(&self, notification: ChangeNotification) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            table = ?notification.table,
            event = ?notification.event,
            record_id = %notification.record_id,
            screen_id = ?notification.screen_id,
            "Publishing change notification"
        );

        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for sub in subscribers.values() {
                if !sub.subscriptions.iter().any(|s| s.matches(&notification)) {
                    continue;
                }
                match sub.tx.send(notification.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => {
                        tracing::warn!(subscriber_id = %sub.id, label = %sub.label, "Subscriber channel closed");
                        closed.push(sub.id);
                    }
                }
            }
        }

        for id in closed {
            self.unsubscribe(&id).await;
        }

        delivered
    }

    /// Disconnect every subscriber (e.g. on shutdown)
    pub async fn disconnect_all(&self) {
        let mut subscribers = self.subscribers.write().await;
        let count = subscribers.len();
        subscribers.clear();
        self.subscriber_count.store(0, Ordering::Relaxed);
        tracing::info!(count = count, "All realtime subscribers disconnected");
    }

    /// Get subscriber count
    pub fn subscriber_count(&self) -> u64 {
        self.subscriber_count.load(Ordering::Relaxed)
    }

    /// Total notifications published since start
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_insert(filter: ScreenFilter) -> Subscription {
        Subscription::new(ChangeTable::QueueEntries, ChangeEvent::Insert, filter)
    }

    #[tokio::test]
    async fn test_filter_by_screen() {
        let hub = RealtimeHub::new();
        let (_, mut rx_s1) = hub
            .subscribe("s1", vec![queue_insert(ScreenFilter::Screen("s1".into()))])
            .await;
        let (_, mut rx_any) = hub.subscribe("admin", vec![queue_insert(ScreenFilter::Any)]).await;

        let delivered = hub
            .publish(ChangeNotification::new(
                ChangeTable::QueueEntries,
                ChangeEvent::Insert,
                "e1",
                Some("s2"),
            ))
            .await;
        assert_eq!(delivered, 1);
        assert!(rx_s1.try_recv().is_err());
        assert_eq!(rx_any.try_recv().unwrap().record_id, "e1");
    }

    #[tokio::test]
    async fn test_global_pool_filter_and_event_type() {
        let hub = RealtimeHub::new();
        let (_, mut rx) = hub
            .subscribe("s1", vec![queue_insert(ScreenFilter::GlobalPool)])
            .await;

        hub.publish(ChangeNotification::new(
            ChangeTable::QueueEntries,
            ChangeEvent::Delete,
            "e1",
            None,
        ))
        .await;
        hub.publish(ChangeNotification::new(
            ChangeTable::QueueEntries,
            ChangeEvent::Insert,
            "e2",
            None,
        ))
        .await;

        assert_eq!(rx.try_recv().unwrap().record_id, "e2");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_pruned() {
        let hub = RealtimeHub::new();
        let (_, rx) = hub.subscribe("gone", vec![queue_insert(ScreenFilter::Any)]).await;
        drop(rx);
        assert_eq!(hub.subscriber_count(), 1);

        let delivered = hub
            .publish(ChangeNotification::new(
                ChangeTable::QueueEntries,
                ChangeEvent::Insert,
                "e1",
                None,
            ))
            .await;
        assert_eq!(delivered, 0);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_all_closes_receivers() {
        let hub = RealtimeHub::new();
        let (_, mut rx) = hub.subscribe("s1", vec![queue_insert(ScreenFilter::Any)]).await;
        hub.disconnect_all().await;
        assert!(rx.recv().await.is_none());
    }
}
