//! Re-entrance tracking for traversals that may meet the same container twice.
//!
//! A [`Visited`] set lives for exactly one traversal (one render, one
//! equality check, one recursive search). Entering a key hands back a
//! [`VisitGuard`]; dropping the guard leaves the key again, on every exit
//! path, so a later traversal over the same data starts clean.

use std::cell::RefCell;
use std::collections::HashSet;
use std::hash::Hash;

/// Identity of a value for the duration of a traversal.
pub(crate) fn addr<T>(r: &T) -> usize {
    r as *const T as usize
}

pub(crate) struct Visited<K: Eq + Hash + Copy> {
    active: RefCell<HashSet<K>>,
}

impl<K: Eq + Hash + Copy> Visited<K> {
    pub(crate) fn new() -> Self {
        Self { active: RefCell::new(HashSet::new()) }
    }

    /// `None` when `key` is already being visited further up the traversal.
    pub(crate) fn enter(&self, key: K) -> Option<VisitGuard<'_, K>> {
        if !self.active.borrow_mut().insert(key) {
            return None;
        }
        Some(VisitGuard { owner: self, key })
    }

    #[cfg(test)]
    pub(crate) fn is_idle(&self) -> bool {
        self.active.borrow().is_empty()
    }
}

pub(crate) struct VisitGuard<'v, K: Eq + Hash + Copy> {
    owner: &'v Visited<K>,
    key:   K,
}

impl<K: Eq + Hash + Copy> Drop for VisitGuard<'_, K> {
    fn drop(&mut self) {
        self.owner.active.borrow_mut().remove(&self.key);
    }
}
