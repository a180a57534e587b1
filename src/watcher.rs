//! Correlation of inbound values with callers waiting for them.
//!
//! A caller registers a predicate with [`Watcher::watch`] and awaits the returned
//! [`Watching`]. The inbound path offers every value to [`Watcher::resolve`], which
//! hands it to the oldest registration whose predicate accepts it.

use std::{
    error::Error,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::{
    sync::oneshot,
    time::{timeout_at, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchError {
    /// The deadline passed before a matching value arrived.
    Timeout,

    /// The registration was dropped by [`Watcher::clear`] or with the watcher.
    Cancelled,
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "Timed out waiting for a response"),
            Self::Cancelled => write!(f, "Watch cancelled"),
        }
    }
}

impl Error for WatchError {}

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send>;

struct Entry<T> {
    id: u64,
    predicate: Predicate<T>,
    tx: oneshot::Sender<Result<T, WatchError>>,
}

struct Registry<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Set of pending expectations, resolved in registration order.
pub struct Watcher<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: Clone + Send + 'static> Watcher<T> {
    pub fn new() -> Self {
        Self { registry: Arc::new(Mutex::new(Registry { next_id: 0, entries: Vec::new() })) }
    }

    /// Registers an expectation for the first value accepted by `predicate`.
    ///
    /// Without a timeout the expectation stays pending until it is resolved, dropped,
    /// or cancelled by [`Watcher::clear`].
    pub fn watch<F>(&self, predicate: F, timeout: Option<Duration>) -> Watching<T>
    where
        F: Fn(&T) -> bool + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push(Entry { id, predicate: Box::new(predicate), tx });

        Watching {
            id,
            deadline: timeout.map(|timeout| Instant::now() + timeout),
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Hands `value` to the oldest pending expectation that accepts it.
    ///
    /// Returns `false` if no expectation took the value.
    pub fn resolve(&self, value: &T) -> bool {
        let mut registry = lock(&self.registry);

        while let Some(index) = registry.entries.iter().position(|entry| (entry.predicate)(value))
        {
            let entry = registry.entries.remove(index);

            // A closed receiver is an abandoned watch, try the next one
            if entry.tx.send(Ok(value.clone())).is_ok() {
                return true;
            }
        }

        false
    }

    /// Cancels every pending expectation.
    pub fn clear(&self) {
        let entries = std::mem::take(&mut lock(&self.registry).entries);

        for entry in entries {
            let _ = entry.tx.send(Err(WatchError::Cancelled));
        }
    }

    /// Number of pending expectations.
    pub fn pending(&self) -> usize {
        lock(&self.registry).entries.len()
    }
}

impl<T: Clone + Send + 'static> Default for Watcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A pending expectation. Dropping it unregisters the expectation.
pub struct Watching<T> {
    id: u64,
    deadline: Option<Instant>,
    rx: oneshot::Receiver<Result<T, WatchError>>,
    registry: Weak<Mutex<Registry<T>>>,
}

impl<T> Watching<T> {
    /// Waits for the matching value.
    ///
    /// # Errors
    /// - Returns `WatchError::Timeout` once the deadline passes. A matching value
    ///   arriving later is not delivered.
    /// - Returns `WatchError::Cancelled` if the watcher was cleared or dropped.
    pub async fn wait(mut self) -> Result<T, WatchError> {
        let received = match self.deadline {
            Some(deadline) => match timeout_at(deadline, &mut self.rx).await {
                Ok(received) => received,
                Err(_) => return Err(WatchError::Timeout),
            },
            None => (&mut self.rx).await,
        };

        match received {
            Ok(result) => result,
            Err(_) => Err(WatchError::Cancelled),
        }
    }

    /// Unregisters the expectation without resolving it.
    pub fn cancel(self) {}
}

impl<T> Drop for Watching<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.entries.retain(|entry| entry.id != self.id);
        }
    }
}
