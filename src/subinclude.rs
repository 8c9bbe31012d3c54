// ABOUTME: Keyed single-flight coordination used by the subinclude table
// and the exec cache

use crate::error::{EvalError, EvalResult};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;

/// A keyed memoization table with single-flight semantics: for any key at
/// most one computation is in flight, later callers either reuse the
/// published result or block until the first caller completes.
///
/// A pending entry holds a broadcast channel; completing or cancelling the
/// flight flips the entry under the table lock and then drops the channel's
/// sender, waking every waiter. Waiters re-read the table after waking, so
/// a wakeup can never be lost between the check and the wait.
pub struct SingleFlight<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
}

enum Entry<V> {
    Pending(Receiver<()>),
    Ready(V),
    Failed(EvalError),
}

/// The outcome of claiming a key.
pub enum Claim<'a, K: Clone + Eq + Hash, V: Clone> {
    /// This caller is first and must complete the flight.
    First(Flight<'a, K, V>),
    Ready(V),
    Failed(EvalError),
}

/// The first caller's obligation token. Dropping it without calling
/// [`Flight::finish`] or [`Flight::fail`] cancels the flight, so an error
/// path can never strand waiters.
pub struct Flight<'a, K: Clone + Eq + Hash, V: Clone> {
    table: &'a SingleFlight<K, V>,
    key: K,
    completed: bool,
    // Held only so that dropping the flight closes the channel.
    _sender: Sender<()>,
}

impl<K: Clone + Eq + Hash, V: Clone> SingleFlight<K, V> {
    pub fn new() -> Self {
        SingleFlight {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically claims `key`: returns the published value, or blocks
    /// behind an in-flight computation, or makes this caller the first.
    pub fn begin(&self, key: K) -> Claim<'_, K, V> {
        loop {
            let waiter = {
                let mut entries = self.entries.lock();
                match entries.get(&key) {
                    None => {
                        let (tx, rx) = bounded::<()>(0);
                        entries.insert(key.clone(), Entry::Pending(rx));
                        return Claim::First(Flight {
                            table: self,
                            key,
                            completed: false,
                            _sender: tx,
                        });
                    }
                    Some(Entry::Ready(v)) => return Claim::Ready(v.clone()),
                    Some(Entry::Failed(e)) => return Claim::Failed(e.clone()),
                    Some(Entry::Pending(rx)) => rx.clone(),
                }
            };
            // Blocks until the sender is dropped; the table is re-read on
            // the next loop iteration.
            let _ = waiter.recv();
        }
    }

    /// Whether `key` has a published value.
    pub fn is_ready(&self, key: &K) -> bool {
        matches!(self.entries.lock().get(key), Some(Entry::Ready(_)))
    }
}

impl<K: Clone + Eq + Hash, V: Clone> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Eq + Hash, V: Clone> Flight<'_, K, V> {
    /// Publishes the result and releases all waiters.
    pub fn finish(mut self, value: V) {
        self.table
            .entries
            .lock()
            .insert(self.key.clone(), Entry::Ready(value));
        self.completed = true;
    }

    /// Marks the flight failed; waiters and later callers observe the
    /// error. Only this key is poisoned.
    pub fn fail(mut self, err: EvalError) {
        self.table
            .entries
            .lock()
            .insert(self.key.clone(), Entry::Failed(err));
        self.completed = true;
    }
}

impl<K: Clone + Eq + Hash, V: Clone> Drop for Flight<'_, K, V> {
    fn drop(&mut self) {
        if !self.completed {
            self.table.entries.lock().insert(
                self.key.clone(),
                Entry::Failed(EvalError::cancelled("computation was abandoned")),
            );
        }
        // The sender drops here, waking every waiter.
    }
}

/// Identifies one subincluded file: its canonical path plus the subrepo it
/// is resolved in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubincludeKey {
    pub path: PathBuf,
    pub subrepo: String,
}
