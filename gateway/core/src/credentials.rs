//! Credential pool for the keyed backend
//!
//! An ordered, immutable set of interchangeable API keys plus a rotation
//! cursor shared by every in-flight request. The cursor is the only mutable
//! state in the gateway.
//!
//! Rotation is a load-spreading heuristic: two racing requests may pick
//! different keys after a rotation, and that is fine. What must hold is that
//! two concurrent `rotate()` calls advance the cursor by exactly two steps.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

/// One key drawn from the pool, tagged with its slot
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Zero-based slot in the pool
    pub slot: usize,
    secret: Arc<str>,
}

impl Credential {
    /// The raw key, for the outbound request header only
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("slot", &self.slot)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Ordered pool of keyed-backend credentials with a shared rotation cursor
pub struct CredentialPool {
    keys: Vec<Arc<str>>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    /// Build a pool from raw entries; trims, drops empties and duplicates
    ///
    /// Order of first appearance is kept.
    #[must_use]
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys: Vec<Arc<str>> = Vec::new();
        for entry in entries {
            let key = entry.as_ref().trim();
            if key.is_empty() || keys.iter().any(|k| k.as_ref() == key) {
                continue;
            }
            keys.push(Arc::from(key));
        }

        debug!(credentials = keys.len(), "Built credential pool");

        Self {
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    /// An empty pool (keyed backend disabled)
    #[must_use]
    pub fn empty() -> Self {
        Self::new(std::iter::empty::<&str>())
    }

    /// Number of credentials
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the pool holds no credentials
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Credential at the cursor, or `None` for an empty pool
    #[must_use]
    pub fn current(&self) -> Option<Credential> {
        if self.keys.is_empty() {
            return None;
        }
        let slot = self.cursor.load(Ordering::SeqCst) % self.keys.len();
        Some(Credential {
            slot,
            secret: Arc::clone(&self.keys[slot]),
        })
    }

    /// Advance the cursor one slot
    ///
    /// Returns `false` without touching the cursor when the pool holds zero
    /// or one credential.
    pub fn rotate(&self) -> bool {
        let len = self.keys.len();
        if len <= 1 {
            return false;
        }
        // CAS loop: concurrent rotations each land exactly one step.
        let _ = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |idx| {
                Some((idx % len + 1) % len)
            });
        true
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("len", &self.keys.len())
            .field("cursor", &self.cursor.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Default for CredentialPool {
    fn default() -> Self {
        Self::empty()
    }
}
