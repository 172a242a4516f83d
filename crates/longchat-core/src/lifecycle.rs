#![forbid(unsafe_code)]

//! Teardown registry.
//!
//! Hosts register whatever they must undo on disposal (event listeners,
//! observers, injected UI). Callbacks run once, in registration order, on
//! [`Lifecycle::cleanup_all`] or when the registry is dropped.

use core::fmt;

use crate::debug;

type Cleanup = Box<dyn FnOnce()>;

#[derive(Default)]
pub struct Lifecycle {
    cleanups: Vec<(&'static str, Cleanup)>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("pending", &self.cleanups.iter().map(|(name, _)| *name).collect::<Vec<_>>())
            .finish()
    }
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named teardown callback.
    pub fn register(&mut self, name: &'static str, cleanup: impl FnOnce() + 'static) {
        self.cleanups.push((name, Box::new(cleanup)));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cleanups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cleanups.is_empty()
    }

    /// Run and forget every registered callback. Returns how many ran.
    pub fn cleanup_all(&mut self) -> usize {
        let cleanups = std::mem::take(&mut self.cleanups);
        let count = cleanups.len();
        for (name, cleanup) in cleanups {
            debug!(target: "longchat::virtualiser", name, "cleanup");
            cleanup();
        }
        count
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn runs_once_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut lc = Lifecycle::new();
        for name in ["observer", "listener", "overlay"] {
            let log = Rc::clone(&log);
            lc.register(name, move || log.borrow_mut().push(name));
        }
        assert_eq!(lc.len(), 3);
        assert_eq!(lc.cleanup_all(), 3);
        assert_eq!(lc.cleanup_all(), 0);
        assert!(lc.is_empty());
        assert_eq!(*log.borrow(), ["observer", "listener", "overlay"]);
    }

    #[test]
    fn drop_runs_pending() {
        let hits = Rc::new(RefCell::new(0));
        {
            let mut lc = Lifecycle::new();
            let hits = Rc::clone(&hits);
            lc.register("counter", move || *hits.borrow_mut() += 1);
        }
        assert_eq!(*hits.borrow(), 1);
    }
}
