#![forbid(unsafe_code)]

//! Debug overlay state.
//!
//! The overlay shows the latest [`Statistics`] in a fixed box on the page.
//! Whether it is shown survives reloads: the flag is kept in a
//! [`VisibilityStore`] (the page's `localStorage` in the browser) under
//! [`VISIBILITY_KEY`], seeded from the `debug` setting the first time.
//!
//! [`OverlayModel`] is the part that does not touch the DOM; the browser
//! binding paints it whenever [`OverlayModel::take_dirty`] says so.

use std::collections::HashMap;

use longchat_core::stats::{Statistics, StatsSink};
use tracing::debug;

/// Storage key of the persisted visibility flag.
pub const VISIBILITY_KEY: &str = "overlayVisible";

/// Inline style of the overlay box.
pub const OVERLAY_STYLE: &[(&str, &str)] = &[
    ("position", "fixed"),
    ("top", "10px"),
    ("left", "10px"),
    ("z-index", "2147483647"),
    ("background-color", "rgba(0, 0, 0, 0.85)"),
    ("color", "#fff"),
    ("padding", "8px 12px"),
    ("font-size", "14px"),
    ("font-family", "monospace"),
    ("border-radius", "4px"),
    ("pointer-events", "none"),
    ("white-space", "pre-line"),
];

/// String key-value storage.
pub trait VisibilityStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

/// In-memory [`VisibilityStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl VisibilityStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// Text and visibility of the overlay.
#[derive(Debug)]
pub struct OverlayModel<S: VisibilityStore> {
    store: S,
    text: String,
    dirty: bool,
}

impl<S: VisibilityStore> OverlayModel<S> {
    /// Seed the stored flag with `visible_by_default` unless one is stored.
    pub fn new(mut store: S, visible_by_default: bool) -> Self {
        if store.get(VISIBILITY_KEY).is_none() {
            store.set(VISIBILITY_KEY, flag(visible_by_default));
        }
        Self {
            store,
            text: Statistics::default().to_string(),
            dirty: true,
        }
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.store.get(VISIBILITY_KEY).as_deref() == Some("true")
    }

    /// CSS `display` value for the current visibility.
    #[must_use]
    pub fn display(&self) -> &'static str {
        if self.is_visible() { "block" } else { "none" }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether a repaint is due. Clears the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Forget the stored flag, so the next page load starts from the default.
    pub fn forget(&mut self) {
        self.store.remove(VISIBILITY_KEY);
    }
}

fn flag(visible: bool) -> &'static str {
    if visible { "true" } else { "false" }
}

impl<S: VisibilityStore> StatsSink for OverlayModel<S> {
    fn publish(&mut self, stats: &Statistics) {
        let text = stats.to_string();
        if text != self.text {
            self.text = text;
            self.dirty = true;
        }
    }

    fn toggle(&mut self) {
        let visible = !self.is_visible();
        self.store.set(VISIBILITY_KEY, flag(visible));
        self.dirty = true;
        debug!(target: "longchat::web", visible, "overlay visibility toggled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use longchat_core::stats::LoadedStats;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_seeds_store_once() {
        let overlay = OverlayModel::new(MemoryStore::default(), false);
        assert!(!overlay.is_visible());
        assert_eq!(overlay.display(), "none");
        assert_eq!(overlay.store().get(VISIBILITY_KEY).as_deref(), Some("false"));

        let mut store = MemoryStore::default();
        store.set(VISIBILITY_KEY, "true");
        let overlay = OverlayModel::new(store, false);
        assert!(overlay.is_visible());
    }

    #[test]
    fn toggle_persists() {
        let mut overlay = OverlayModel::new(MemoryStore::default(), false);
        overlay.take_dirty();
        overlay.toggle();
        assert!(overlay.take_dirty());
        assert!(overlay.is_visible());
        assert_eq!(overlay.store().get(VISIBILITY_KEY).as_deref(), Some("true"));
        overlay.toggle();
        assert_eq!(overlay.display(), "none");
    }

    #[test]
    fn publish_repaints_only_on_change() {
        let mut overlay = OverlayModel::new(MemoryStore::default(), true);
        assert_eq!(overlay.text(), "Waiting for messages...");
        assert!(overlay.take_dirty());

        overlay.publish(&Statistics::default());
        assert!(!overlay.take_dirty());

        let mut stats = Statistics::default();
        stats.apply_loaded(LoadedStats {
            visible_count: 20,
            total_count: 120,
        });
        overlay.publish(&stats);
        assert!(overlay.take_dirty());
        assert!(overlay.text().starts_with("Messages: 20 / 120"));
    }

    #[test]
    fn forget_clears_the_flag() {
        let mut overlay = OverlayModel::new(MemoryStore::default(), true);
        overlay.forget();
        assert_eq!(overlay.store().get(VISIBILITY_KEY), None);
        assert!(!overlay.is_visible());
    }
}
