//! Change notifications fanned out to connected clients.

use std::sync::Mutex;

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::{debug, trace};

use super::{ChangeNotification, ChangeNotifier, ClientId};

/// Delivers every published change to all subscribed clients except the
/// one that caused it.
#[derive(Default)]
pub struct NotificationHub {
    subscribers: Mutex<Vec<(ClientId, Sender<ChangeNotification>)>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client. Dropping the receiver unsubscribes it.
    pub fn subscribe(&self, client: ClientId) -> Receiver<ChangeNotification> {
        let (tx, rx) = unbounded();
        self.lock().push((client, tx));
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ClientId, Sender<ChangeNotification>)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ChangeNotifier for NotificationHub {
    fn publish(&self, origin: Option<ClientId>, notification: ChangeNotification) {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|(client, tx)| {
            if Some(*client) == origin {
                return true;
            }
            tx.send(notification.clone()).is_ok()
        });
        if subscribers.len() != before {
            debug!(pruned = before - subscribers.len(), "Dropped disconnected subscribers");
        }
        trace!(
            account = notification.account_id,
            folder = notification.folder_id,
            kind = ?notification.kind,
            "Published change"
        );
    }
}
