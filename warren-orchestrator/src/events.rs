//! Cluster events
//!
//! Signals about the cluster that reach the scheduler from outside its own
//! control flow: capacity changes, pits stopping on their own, and the
//! periodic report of which pits exist. Handlers subscribe to named topics
//! and receive the matching events over a channel.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;
use warren_core::domain::job::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Restricted,
    PitStopping,
    PitStopped,
    PitReport,
}

impl Topic {
    pub const ALL: [Topic; 4] = [
        Topic::Restricted,
        Topic::PitStopping,
        Topic::PitStopped,
        Topic::PitReport,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Topic::Restricted => "restricted",
            Topic::PitStopping => "pitStopping",
            Topic::PitStopped => "pitStopped",
            Topic::PitReport => "pitReport",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    /// Cluster capacity shrank
    Restricted,
    PitStopping(JobId),
    PitStopped(JobId),
    /// Ids of the pits currently present on the control node
    PitReport(Vec<JobId>),
}

impl ClusterEvent {
    pub fn topic(&self) -> Topic {
        match self {
            ClusterEvent::Restricted => Topic::Restricted,
            ClusterEvent::PitStopping(_) => Topic::PitStopping,
            ClusterEvent::PitStopped(_) => Topic::PitStopped,
            ClusterEvent::PitReport(_) => Topic::PitReport,
        }
    }
}

struct Subscription {
    topics: Vec<Topic>,
    tx: mpsc::UnboundedSender<ClusterEvent>,
}

/// Delivers published events to the subscribers of their topic
#[derive(Default)]
pub struct ClusterEvents {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl ClusterEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `topics`; events arrive in publication order
    pub fn subscribe(&self, topics: &[Topic]) -> mpsc::UnboundedReceiver<ClusterEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscriptions = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        subscriptions.push(Subscription {
            topics: topics.to_vec(),
            tx,
        });
        rx
    }

    /// Sends `event` to every live subscriber of its topic and returns how
    /// many received it. Closed subscriptions are dropped.
    pub fn publish(&self, event: ClusterEvent) -> usize {
        let topic = event.topic();
        let mut subscriptions = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        subscriptions.retain(|s| !s.tx.is_closed());

        let mut delivered = 0;
        for subscription in subscriptions.iter().filter(|s| s.topics.contains(&topic)) {
            if subscription.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        debug!(topic = topic.name(), delivered, "Cluster event published");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_matching_subscribers() {
        let events = ClusterEvents::new();
        let mut all = events.subscribe(&Topic::ALL);
        let mut stops = events.subscribe(&[Topic::PitStopped]);

        assert_eq!(events.publish(ClusterEvent::PitStopping(3)), 1);
        assert_eq!(events.publish(ClusterEvent::PitStopped(3)), 2);

        assert_eq!(all.recv().await, Some(ClusterEvent::PitStopping(3)));
        assert_eq!(all.recv().await, Some(ClusterEvent::PitStopped(3)));
        assert_eq!(stops.recv().await, Some(ClusterEvent::PitStopped(3)));
        assert!(stops.try_recv().is_err());
    }

    #[test]
    fn test_closed_subscribers_are_dropped() {
        let events = ClusterEvents::new();
        let rx = events.subscribe(&[Topic::Restricted]);
        drop(rx);

        assert_eq!(events.publish(ClusterEvent::Restricted), 0);
        assert!(events.subscriptions.lock().unwrap().is_empty());
    }

    #[test]
    fn test_topic_names() {
        assert_eq!(ClusterEvent::PitReport(vec![1, 2]).topic().name(), "pitReport");
        assert_eq!(Topic::Restricted.name(), "restricted");
    }
}
