use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Named mutual exclusion, keyed by working directory.
///
/// Injected into the engine rather than held in a global so tests can use
/// isolated instances. Acquisition blocks without a timeout.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Releases its key on drop, including during unwinding.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    locks: &'a KeyedLocks,
    key: String,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let mut held = self.table();
        while held.contains(key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(key.to_owned());
        KeyGuard {
            locks: self,
            key: key.to_owned(),
        }
    }

    pub fn try_acquire(&self, key: &str) -> Option<KeyGuard<'_>> {
        let mut held = self.table();
        if held.contains(key) {
            return None;
        }
        held.insert(key.to_owned());
        Some(KeyGuard {
            locks: self,
            key: key.to_owned(),
        })
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.table().contains(key)
    }
}

impl KeyGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.locks.table().remove(&self.key);
        self.locks.released.notify_all();
    }
}
