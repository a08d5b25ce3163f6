//! Event bus for run observation.
//!
//! Pub/sub messaging over Tokio broadcast channels. Publishing never fails
//! when nobody is listening; consumers that fall behind see a lag error on
//! their receiver, not on the publisher.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::RunEvent;

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus.
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channels.
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus.
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: RunEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if the bus has any subscribers.
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription.
pub struct EventFilter {
    /// Filter by run ID.
    pub run_id: Option<String>,
    /// Filter by event types.
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events).
    pub fn new() -> Self {
        Self {
            run_id: None,
            event_types: None,
        }
    }

    /// Filter by run ID.
    pub fn run(mut self, run_id: &str) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    /// Filter by event types.
    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter.
    pub fn matches(&self, event: &RunEvent) -> bool {
        if let Some(ref rid) = self.run_id {
            if event.run_id() != rid {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.contains(&event.event_type().to_string()) {
                return false;
            }
        }

        true
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Filtered event receiver that only yields matching events.
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<RunEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Create a new filtered receiver.
    pub fn new(receiver: broadcast::Receiver<RunEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event.
    pub async fn recv(&mut self) -> Result<RunEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// Extension trait for subscribing with filters.
pub trait EventBusExt {
    /// Subscribe with a filter.
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

impl EventBusExt for SharedEventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::state::Phase;
    use chrono::Utc;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(RunEvent::RunFailed {
            run_id: "run-1".to_string(),
            message: "cancelled".to_string(),
            timestamp: Utc::now(),
        });

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "run_failed");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(RunEvent::PhaseStarted {
            run_id: "run-1".to_string(),
            phase: Phase::Propose,
            round: 1,
            models: vec!["m-a".into()],
            timestamp: Utc::now(),
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event_type(), e2.event_type());
    }

    #[test]
    fn test_publish_with_no_receivers_is_ok() {
        let bus = EventBus::new();
        bus.publish(RunEvent::BudgetWarning {
            run_id: "run-1".to_string(),
            spent: 1.2,
            threshold: 1.0,
            timestamp: Utc::now(),
        });
        assert!(!bus.has_subscribers());
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new();
        let filter = EventFilter::new().run("target-run");
        let mut filtered = bus.subscribe_filtered(filter);

        let bus_clone = bus;
        tokio::spawn(async move {
            bus_clone.publish(RunEvent::RunFailed {
                run_id: "other-run".to_string(),
                message: "nope".to_string(),
                timestamp: Utc::now(),
            });
            bus_clone.publish(RunEvent::RunCompleted {
                run_id: "target-run".to_string(),
                decision: "42".to_string(),
                confidence: 0.9,
                cost: 0.01,
                timestamp: Utc::now(),
            });
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.run_id(), "target-run");
    }

    #[test]
    fn test_event_filter_by_type() {
        let filter = EventFilter::new().types(vec!["round_committed"]);

        let matching = RunEvent::RoundCommitted {
            run_id: "r".to_string(),
            round: 1,
            confidence: 0.5,
            dissent: None,
            timestamp: Utc::now(),
        };
        let non_matching = RunEvent::RunFailed {
            run_id: "r".to_string(),
            message: "x".to_string(),
            timestamp: Utc::now(),
        };

        assert!(filter.matches(&matching));
        assert!(!filter.matches(&non_matching));
    }
}
