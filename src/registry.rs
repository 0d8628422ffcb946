//! Address-keyed, weak-valued lookup tables.
//!
//! `Pool::get` and `Process::get` round-trip an address back to the exact
//! same handle that was looked up before, as long as somebody else still
//! holds a strong reference to it. A registry never keeps an entry alive
//! by itself — it only remembers where to find one while it is alive
//! elsewhere, and forgets it the moment the last strong reference drops.
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// A weak-valued map from an opaque address to a handle of type `T`.
pub struct Registry<T> {
    entries: Mutex<HashMap<usize, Weak<T>>>,
}

impl<T> Registry<T> {
    /// Creates an empty registry.
    pub fn new() -> Registry<T> {
        Registry {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `value` and returns the address it can later be looked
    /// up by. The address is stable for the lifetime of `value`'s
    /// allocation.
    pub fn insert(&self, value: &Arc<T>) -> usize {
        let address = Arc::as_ptr(value) as usize;
        self.entries.lock().insert(address, Arc::downgrade(value));
        address
    }

    /// Looks `address` up. Returns `None` if nothing was ever registered
    /// at that address, or if the value has since been dropped elsewhere.
    pub fn get(&self, address: usize) -> Option<Arc<T>> {
        let mut entries = self.entries.lock();
        match entries.get(&address).and_then(Weak::upgrade) {
            Some(value) => Some(value),
            None => {
                entries.remove(&address);
                None
            }
        }
    }

    /// Removes any entry at `address`, if present.
    pub fn remove(&self, address: usize) {
        self.entries.lock().remove(&address);
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Registry<T> {
        Registry::new()
    }
}
