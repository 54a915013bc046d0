//! Per-instance tick listeners.

use std::sync::{Arc, Mutex, MutexGuard};

/// Receives the stopwatch's elapsed milliseconds on every tick.
pub type Listener = Arc<dyn Fn(u64) + Send + Sync>;

/// Handle returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

#[derive(Default)]
pub struct TickListeners {
    registry: Mutex<Registry>,
}

impl TickListeners {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        registry.entries.push((id, Arc::new(listener)));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut registry = self.lock();
        let before = registry.entries.len();
        registry.entries.retain(|(entry, _)| *entry != id);
        registry.entries.len() != before
    }

    /// Calls every listener registered at the time of the call, in
    /// registration order. Listeners run without the registry locked and
    /// may register or unregister (themselves included).
    pub fn notify(&self, elapsed_ms: u64) -> usize {
        let snapshot: Vec<Listener> = self
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in &snapshot {
            listener(elapsed_ms);
        }
        snapshot.len()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_register_notify() {
        let listeners = TickListeners::default();
        let seen = Arc::new(AtomicU64::new(0));
        let s = seen.clone();
        listeners.register(move |elapsed| {
            s.fetch_add(elapsed, Ordering::SeqCst);
        });
        let s = seen.clone();
        listeners.register(move |elapsed| {
            s.fetch_add(elapsed * 10, Ordering::SeqCst);
        });
        assert_eq!(listeners.notify(5), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 55);
    }

    #[test]
    fn test_unregister() {
        let listeners = TickListeners::default();
        let id = listeners.register(|_| {});
        let other = listeners.register(|_| {});
        assert_ne!(id, other);
        assert!(listeners.unregister(id));
        assert!(!listeners.unregister(id));
        assert_eq!(listeners.len(), 1);
        listeners.clear();
        assert!(listeners.is_empty());
        assert_eq!(listeners.notify(1), 0);
    }

    #[test]
    fn test_listener_can_unregister_itself() {
        let listeners = Arc::new(TickListeners::default());
        let calls = Arc::new(AtomicU64::new(0));
        let id_cell = Arc::new(Mutex::new(None));

        let (l, c, cell) = (listeners.clone(), calls.clone(), id_cell.clone());
        let id = listeners.register(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *cell.lock().unwrap() {
                l.unregister(id);
            }
        });
        *id_cell.lock().unwrap() = Some(id);

        listeners.notify(1);
        listeners.notify(2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(listeners.is_empty());
    }
}
