//! Interned string pool
//!
//! Every distinct byte string held by an interpreter state is allocated
//! once and shared by handle. The handle is a plain `Rc<str>`: cloning
//! is the ref operation, dropping is the unref, and the allocation dies
//! with its last handle. The pool itself keeps only weak entries, so it
//! never pins a string alive; dead entries are swept lazily when their
//! bytes are interned again, or eagerly via [`StringPool::purge`].
//!
//! Pointer equality of two live handles implies byte equality, and two
//! live handles with equal bytes are always the same allocation.

use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

/// Interning pool, confined to its owning interpreter state.
#[derive(Debug, Default)]
pub struct StringPool {
    index: FxHashMap<Box<str>, Weak<str>>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shared handle for `s`, allocating it on first use.
    pub fn intern(&mut self, s: &str) -> Rc<str> {
        if let Some(entry) = self.index.get(s) {
            if let Some(live) = entry.upgrade() {
                return live;
            }
        }
        let handle: Rc<str> = Rc::from(s);
        self.index.insert(Box::from(s), Rc::downgrade(&handle));
        handle
    }

    /// Intern an owned buffer. The buffer is reused as the payload when
    /// no equal string is live; otherwise it is dropped and the
    /// existing handle returned.
    pub fn steal(&mut self, s: String) -> Rc<str> {
        if let Some(entry) = self.index.get(s.as_str()) {
            if let Some(live) = entry.upgrade() {
                return live;
            }
        }
        let handle: Rc<str> = Rc::from(s.into_boxed_str());
        self.index.insert(Box::from(&*handle), Rc::downgrade(&handle));
        handle
    }

    /// Look up a live handle without interning.
    pub fn find(&self, s: &str) -> Option<Rc<str>> {
        self.index.get(s).and_then(Weak::upgrade)
    }

    /// Drop index entries whose strings have died; returns how many
    /// were removed.
    pub fn purge(&mut self) -> usize {
        let before = self.index.len();
        self.index.retain(|_, w| w.strong_count() > 0);
        before - self.index.len()
    }

    /// Number of index entries, dead ones included.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_dedups() {
        let mut pool = StringPool::new();
        let a = pool.intern("hello");
        let b = pool.intern("hello");
        let c = pool.intern("world");
        assert!(Rc::ptr_eq(&a, &b));
        assert!(!Rc::ptr_eq(&a, &c));
    }

    #[test]
    fn steal_prefers_existing() {
        let mut pool = StringPool::new();
        let a = pool.intern("abc");
        let b = pool.steal(String::from("abc"));
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn dead_entries_are_swept() {
        let mut pool = StringPool::new();
        {
            let _tmp = pool.intern("ephemeral");
        }
        assert!(pool.find("ephemeral").is_none());
        assert_eq!(pool.purge(), 1);
        assert!(pool.is_empty());
    }
}
