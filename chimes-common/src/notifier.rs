//! Registration-order listener fan-out
//!
//! Minimal multi-listener broadcast used to deliver transaction records from
//! the stream client to the engine and any external observers. Listeners are
//! invoked synchronously, in registration order; a failing listener is
//! logged and skipped so the remaining listeners still run.

use std::sync::Mutex;

use tracing::warn;
use uuid::Uuid;

use crate::error::Result;

/// Handle returned by [`Notifier::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

type Listener<T> = Box<dyn Fn(&T) -> Result<()> + Send + Sync>;

/// Synchronous multi-listener broadcast
///
/// Ordering guarantee: for a given `publish` call, listeners run in
/// registration order. Listener failures are isolated per listener.
pub struct Notifier<T> {
    listeners: Mutex<Vec<(SubscriptionId, Listener<T>)>>,
}

impl<T> Notifier<T> {
    /// Create an empty notifier
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener; returns its subscription handle
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.listeners
            .lock()
            .unwrap()
            .push((id, Box::new(listener)));
        id
    }

    /// Remove a previously registered listener
    ///
    /// Returns true if the subscription existed. Idempotent.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Deliver `item` to every registered listener, in registration order
    ///
    /// A listener returning `Err` is logged and does not prevent delivery to
    /// the remaining listeners.
    pub fn publish(&self, item: &T) {
        let listeners = self.listeners.lock().unwrap();
        for (id, listener) in listeners.iter() {
            if let Err(e) = listener(item) {
                warn!("Listener {:?} failed: {}", id, e);
            }
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}

impl<T> Default for Notifier<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_publish_reaches_all_listeners() {
        let notifier: Notifier<u32> = Notifier::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = Arc::clone(&count);
            notifier.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        notifier.publish(&7);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_registration_order() {
        let notifier: Notifier<u32> = Notifier::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            notifier.subscribe(move |_| {
                order.lock().unwrap().push(tag);
                Ok(())
            });
        }

        notifier.publish(&0);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_failing_listener_is_isolated() {
        let notifier: Notifier<u32> = Notifier::new();
        let count = Arc::new(AtomicUsize::new(0));

        notifier.subscribe(|_| Err(Error::Internal("listener broke".to_string())));

        let count2 = Arc::clone(&count);
        notifier.subscribe(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        notifier.publish(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let notifier: Notifier<u32> = Notifier::new();
        let count = Arc::new(AtomicUsize::new(0));

        let count2 = Arc::clone(&count);
        let id = notifier.subscribe(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        notifier.publish(&1);
        assert!(notifier.unsubscribe(id));
        notifier.publish(&2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.listener_count(), 0);

        // Idempotent
        assert!(!notifier.unsubscribe(id));
    }
}
