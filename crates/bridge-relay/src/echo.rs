use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bridge_types::MessageId;

/// Remembers messages this process deleted itself, so the delete notification
/// that comes back for them is not propagated again.
pub struct EchoCache {
    entries: Mutex<HashMap<MessageId, Instant>>,
    ttl: Duration,
    capacity: usize,
}

impl EchoCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn mark(&self, id: MessageId) {
        let now = Instant::now();
        let mut entries = self.lock();

        entries.retain(|_, marked| now.duration_since(*marked) < self.ttl);
        if entries.len() >= self.capacity && !entries.contains_key(&id) {
            let oldest = entries.iter().min_by_key(|(_, marked)| **marked).map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(id, now);
    }

    /// Check-and-remove: true only for the first call after `mark`.
    pub fn consume(&self, id: MessageId) -> bool {
        match self.lock().remove(&id) {
            Some(marked) => marked.elapsed() < self.ttl,
            None => false,
        }
    }

    /// Drops a mark whose delete turned out not to happen.
    pub fn forget(&self, id: MessageId) {
        self.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MessageId, Instant>> {
        // A panic mid-update leaves the map usable; keep going with it.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_is_one_shot() {
        let cache = EchoCache::new(Duration::from_secs(60), 10);
        let id = MessageId::new(5);
        assert!(!cache.consume(id));

        cache.mark(id);
        assert!(cache.consume(id));
        assert!(!cache.consume(id));
    }

    #[test]
    fn expired_marks_do_not_count() {
        let cache = EchoCache::new(Duration::ZERO, 10);
        cache.mark(MessageId::new(1));
        assert!(!cache.consume(MessageId::new(1)));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = EchoCache::new(Duration::from_secs(60), 2);
        cache.mark(MessageId::new(1));
        std::thread::sleep(Duration::from_millis(2));
        cache.mark(MessageId::new(2));
        cache.mark(MessageId::new(3));

        assert_eq!(cache.len(), 2);
        assert!(!cache.consume(MessageId::new(1)));
        assert!(cache.consume(MessageId::new(2)));
        assert!(cache.consume(MessageId::new(3)));
    }

    #[test]
    fn forget_undoes_mark() {
        let cache = EchoCache::new(Duration::from_secs(60), 10);
        cache.mark(MessageId::new(9));
        cache.forget(MessageId::new(9));
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_consume_has_single_winner() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cache = Arc::new(EchoCache::new(Duration::from_secs(60), 10));
        cache.mark(MessageId::new(42));
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let wins = wins.clone();
                std::thread::spawn(move || {
                    if cache.consume(MessageId::new(42)) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }
}
