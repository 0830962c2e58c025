//! Minimal reactive cells.
//!
//! An [`Atom`] is a mutable cell with a version counter that advances on
//! every write. A [`Computed`] caches a value derived from some source and
//! recomputes it only when the source's epoch has moved. Flushes of pending
//! work are handed to a [`FlushScheduler`], which decides when they run.

mod scheduler;

pub use scheduler::{FlushScheduler, FlushTask, ImmediateScheduler, TickScheduler};

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A mutable cell that counts its writes.
pub struct Atom<T> {
    value: RwLock<T>,
    epoch: AtomicU64,
}

impl<T> Atom<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            epoch: AtomicU64::new(0),
        }
    }

    /// Read the value in place.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.read())
    }

    /// Replace the value, returning the previous one.
    pub fn set(&self, value: T) -> T {
        let previous = std::mem::replace(&mut *self.value.write(), value);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        previous
    }

    /// Mutate the value in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.value.write());
        self.epoch.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Number of writes so far.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

impl<T: Clone> Atom<T> {
    pub fn get(&self) -> T {
        self.value.read().clone()
    }
}

impl<T: Default> Default for Atom<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Atom<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atom")
            .field("value", &*self.value.read())
            .field("epoch", &self.epoch())
            .finish()
    }
}

/// A derived value cached against a source epoch.
pub struct Computed<T> {
    cache: Mutex<Option<(u64, T)>>,
}

impl<T: Clone> Computed<T> {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(None),
        }
    }

    /// The cached value if it was computed at `epoch`, otherwise a fresh one.
    pub fn get(&self, epoch: u64, compute: impl FnOnce() -> T) -> T {
        let mut cache = self.cache.lock();
        match cache.as_ref() {
            Some((cached_at, value)) if *cached_at == epoch => value.clone(),
            _ => {
                let value = compute();
                *cache = Some((epoch, value.clone()));
                value
            }
        }
    }
}

impl<T: Clone> Default for Computed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached_at = self.cache.lock().as_ref().map(|(epoch, _)| *epoch);
        f.debug_struct("Computed").field("cached_at", &cached_at).finish()
    }
}
