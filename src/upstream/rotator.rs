//! Round-robin credential rotation
//!
//! Holds the upstream clients, one per credential, and hands them out in
//! order, wrapping around at the end of the pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};

/// Round-robin pool of upstream clients
///
/// The cursor is read and advanced in a single atomic step, so concurrent
/// requests never observe the same position.
pub struct CredentialRotator<C> {
    entries: Vec<Arc<C>>,
    cursor: AtomicUsize,
}

impl<C> CredentialRotator<C> {
    /// Create a rotator over a non-empty pool
    pub fn new(entries: Vec<C>) -> Result<Self> {
        if entries.is_empty() {
            bail!("credential pool must contain at least one credential");
        }

        Ok(Self {
            entries: entries.into_iter().map(Arc::new).collect(),
            cursor: AtomicUsize::new(0),
        })
    }

    /// Number of credentials in the pool
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the entry under the cursor and advance the cursor
    pub fn next(&self) -> Arc<C> {
        self.next_indexed().1
    }

    /// Like [`next`](Self::next), also returning the pool index for logging
    pub fn next_indexed(&self) -> (usize, Arc<C>) {
        let len = self.entries.len();
        let index = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
            .unwrap_or_else(|i| i);
        (index, Arc::clone(&self.entries[index]))
    }
}

impl<C> std::fmt::Debug for CredentialRotator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRotator")
            .field("credential_count", &self.entries.len())
            .field("cursor", &self.cursor.load(Ordering::Relaxed))
            .finish()
    }
}
