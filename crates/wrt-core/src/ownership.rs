#![forbid(unsafe_code)]

//! Page-scoped ownership arbitration.
//!
//! Several embed instances can live on one page without knowing about each
//! other. Some capabilities are exclusive: only one instance may rewrite the
//! address-bar path, and only one may intercept clicks for the whole
//! document. [`OwnershipRegistry`] is a tiny synchronous lock table for those
//! capabilities.
//!
//! # Invariants
//!
//! 1. At most one owner per key.
//! 2. `claim(key, id)` succeeds iff the key is free or already owned by `id`.
//! 3. `release(key, id)` only clears a key owned by `id`.
//! 4. Claims are resolved synchronously; there is no window in which two
//!    instances both believe they hold a key.
//!
//! # Failure Modes
//!
//! - **Leaked claim**: an owner that is never released (its router is kept
//!   alive after the host removed its container) holds the key until the page
//!   unloads. There is no liveness check.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Exclusive page-global capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnershipKey {
    /// Rewriting the address-bar pathname (`path` history mode).
    PathRouting,
    /// Capture-phase click interception on the whole document.
    DocumentTakeover,
}

impl OwnershipKey {
    /// Stable name of the key, as it appears in logs and on the page global.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PathRouting => "wrt:path-routing-owner",
            Self::DocumentTakeover => "wrt:document-takeover-owner",
        }
    }
}

impl fmt::Display for OwnershipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared key → owner-id table.
///
/// Cloning creates a new handle to the **same** table. Use [`page`](Self::page)
/// to get the table shared by every instance on the current page (one per
/// thread, which on `wasm32` is one per page).
#[derive(Clone, Default)]
pub struct OwnershipRegistry {
    owners: Rc<RefCell<HashMap<OwnershipKey, String>>>,
}

thread_local! {
    static PAGE_REGISTRY: OwnershipRegistry = OwnershipRegistry::new();
}

impl OwnershipRegistry {
    /// Create an isolated registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the registry shared by the whole page.
    #[must_use]
    pub fn page() -> Self {
        PAGE_REGISTRY.with(Clone::clone)
    }

    /// Try to take `key` for `owner`.
    ///
    /// Returns `true` when `owner` holds the key afterwards. Never panics and
    /// never blocks.
    pub fn claim(&self, key: OwnershipKey, owner: &str) -> bool {
        let mut owners = self.owners.borrow_mut();
        match owners.get(&key) {
            Some(current) if current != owner => false,
            Some(_) => true,
            None => {
                owners.insert(key, owner.to_owned());
                true
            }
        }
    }

    /// Release `key` if, and only if, `owner` holds it.
    ///
    /// Returns `true` when the key was cleared.
    pub fn release(&self, key: OwnershipKey, owner: &str) -> bool {
        let mut owners = self.owners.borrow_mut();
        if owners.get(&key).is_some_and(|current| current == owner) {
            owners.remove(&key);
            true
        } else {
            false
        }
    }

    /// Current owner of `key`.
    #[must_use]
    pub fn owner(&self, key: OwnershipKey) -> Option<String> {
        self.owners.borrow().get(&key).cloned()
    }

    /// Whether `owner` currently holds `key`.
    #[must_use]
    pub fn is_owned_by(&self, key: OwnershipKey, owner: &str) -> bool {
        self.owners
            .borrow()
            .get(&key)
            .is_some_and(|current| current == owner)
    }

    /// Number of keys currently claimed.
    #[must_use]
    pub fn claimed_count(&self) -> usize {
        self.owners.borrow().len()
    }
}

impl fmt::Debug for OwnershipRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.owners.borrow().iter()).finish()
    }
}
