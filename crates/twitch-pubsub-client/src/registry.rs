//! Topics the session is currently listening to.
//!
//! Only mutated after the broker acknowledged a LISTEN or UNLISTEN; the
//! contents are replayed as one LISTEN after every reconnect.

use parking_lot::Mutex;
use twitch_pubsub_core::Topic;

#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    topics: Mutex<Vec<Topic>>,
}

impl SubscriptionRegistry {
    /// Add topics not already present. Returns how many were added.
    pub(crate) fn merge(&self, topics: &[Topic]) -> usize {
        let mut current = self.topics.lock();
        let before = current.len();
        for topic in topics {
            if !current.contains(topic) {
                current.push(topic.clone());
            }
        }
        current.len() - before
    }

    /// Remove exactly the given topics. Returns how many were removed.
    pub(crate) fn remove(&self, topics: &[Topic]) -> usize {
        let mut current = self.topics.lock();
        let before = current.len();
        current.retain(|topic| !topics.contains(topic));
        before - current.len()
    }

    pub(crate) fn snapshot(&self) -> Vec<Topic> {
        self.topics.lock().clone()
    }
}
