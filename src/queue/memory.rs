//! In-process queue store for tests.

use super::QueueStore;
use crate::error::{CrewError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Default)]
struct State {
    lists: HashMap<String, VecDeque<String>>,
    expiries: HashMap<String, Instant>,
    offline: bool,
}

impl State {
    fn evict_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .expiries
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            self.expiries.remove(&key);
            self.lists.remove(&key);
        }
    }
}

/// Same observable semantics as the Redis store: FIFO per key, blocking pop
/// with timeout, key expiry, and empty lists disappear.
#[derive(Default)]
pub(crate) struct MemoryQueueStore {
    state: Mutex<State>,
    pushed: Condvar,
}

impl MemoryQueueStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make every later operation fail as if the store went away.
    pub(crate) fn set_offline(&self, offline: bool) {
        self.lock_raw().offline = offline;
        self.pushed.notify_all();
    }

    pub(crate) fn has_expiry(&self, key: &str) -> bool {
        self.lock_raw().expiries.contains_key(key)
    }

    fn lock_raw(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock_raw();
        if state.offline {
            return Err(CrewError::Connectivity("memory store offline".to_string()));
        }
        state.evict_expired();
        Ok(state)
    }
}

impl QueueStore for MemoryQueueStore {
    fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }

    fn push(&self, key: &str, payload: &str) -> Result<()> {
        let mut state = self.lock()?;
        state
            .lists
            .entry(key.to_string())
            .or_default()
            .push_back(payload.to_string());
        drop(state);
        self.pushed.notify_all();
        Ok(())
    }

    fn blocking_pop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock()?;

        loop {
            if let Some(list) = state.lists.get_mut(key)
                && let Some(payload) = list.pop_front()
            {
                if list.is_empty() {
                    state.lists.remove(key);
                    state.expiries.remove(key);
                }
                return Ok(Some(payload));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let (guard, _) = self
                .pushed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state = guard;
            if state.offline {
                return Err(CrewError::Connectivity("memory store offline".to_string()));
            }
            state.evict_expired();
        }
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut state = self.lock()?;
        if state.lists.contains_key(key) {
            state.expiries.insert(key.to_string(), Instant::now() + ttl);
        }
        Ok(())
    }

    fn depth(&self, key: &str) -> Result<usize> {
        Ok(self.lock()?.lists.get(key).map_or(0, VecDeque::len))
    }

    fn peek(&self, key: &str, count: usize) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .lists
            .get(key)
            .map(|list| list.iter().take(count).cloned().collect())
            .unwrap_or_default())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut state = self.lock()?;
        state.expiries.remove(key);
        Ok(state.lists.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_per_key() {
        let store = MemoryQueueStore::new();
        store.push("q", "a").unwrap();
        store.push("q", "b").unwrap();
        store.push("other", "x").unwrap();

        assert_eq!(store.depth("q").unwrap(), 2);
        assert_eq!(store.peek("q", 10).unwrap(), vec!["a", "b"]);
        assert_eq!(store.blocking_pop("q", Duration::ZERO).unwrap().as_deref(), Some("a"));
        assert_eq!(store.blocking_pop("q", Duration::ZERO).unwrap().as_deref(), Some("b"));
        assert_eq!(store.blocking_pop("q", Duration::ZERO).unwrap(), None);
        assert_eq!(store.depth("other").unwrap(), 1);
    }

    #[test]
    fn blocking_pop_wakes_on_push() {
        let store = Arc::new(MemoryQueueStore::new());
        let producer = Arc::clone(&store);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            producer.push("q", "late").unwrap();
        });

        let popped = store.blocking_pop("q", Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
        assert_eq!(popped.as_deref(), Some("late"));
    }

    #[test]
    fn blocking_pop_times_out() {
        let store = MemoryQueueStore::new();
        let start = Instant::now();
        assert_eq!(store.blocking_pop("q", Duration::from_millis(30)).unwrap(), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn expired_keys_vanish() {
        let store = MemoryQueueStore::new();
        store.push("q", "a").unwrap();
        store.expire("q", Duration::from_millis(10)).unwrap();
        assert!(store.has_expiry("q"));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(store.depth("q").unwrap(), 0);
    }

    #[test]
    fn offline_store_fails_operations() {
        let store = MemoryQueueStore::new();
        store.set_offline(true);
        assert!(matches!(store.ping(), Err(CrewError::Connectivity(_))));
        assert!(store.push("q", "a").is_err());
    }
}
