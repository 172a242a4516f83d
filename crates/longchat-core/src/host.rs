#![forbid(unsafe_code)]

//! The host page, as seen by the engine.
//!
//! [`HostDom`] is the only way the engine touches the page. The browser
//! binding implements it over `web-sys`; [`crate::mem_dom::MemoryDom`]
//! implements it in memory for tests.
//!
//! Handles are cheap to clone and compare. All methods take `&self`: like the
//! DOM itself, implementations use interior mutability, which lets the
//! engine and the page (or a test acting as the page) share one tree.
//!
//! Geometry follows `getBoundingClientRect`: [`HostDom::top`] is measured from
//! the top of the browser viewport, so offsets between two nodes are simple
//! differences.

use core::fmt;

/// Raw scroll position of the container.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollMetrics {
    /// Distance from the top of the scrollable content to the top of the
    /// visible area.
    pub scroll_top: f64,
    /// Height of the visible area.
    pub client_height: f64,
    /// Height of the whole scrollable content.
    pub scroll_height: f64,
}

impl ScrollMetrics {
    #[must_use]
    pub const fn new(scroll_top: f64, client_height: f64, scroll_height: f64) -> Self {
        Self {
            scroll_top,
            client_height,
            scroll_height,
        }
    }

    /// Distance between the bottom of the visible area and the content end.
    #[must_use]
    pub fn distance_to_bottom(&self) -> f64 {
        self.scroll_height - (self.scroll_top + self.client_height)
    }
}

/// One batch of child-list changes, in the order the host observed them.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationBatch<N> {
    pub added: Vec<N>,
    pub removed: Vec<N>,
}

impl<N> Default for MutationBatch<N> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<N> MutationBatch<N> {
    #[must_use]
    pub fn added(nodes: Vec<N>) -> Self {
        Self {
            added: nodes,
            removed: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Append another batch's records after this one's.
    pub fn extend(&mut self, other: Self) {
        self.added.extend(other.added);
        self.removed.extend(other.removed);
    }
}

/// DOM capability the engine needs from its host.
pub trait HostDom {
    /// Element handle.
    type Node: Clone + PartialEq + fmt::Debug;

    /// First element in the document matching `selector`.
    fn query(&self, selector: &str) -> Option<Self::Node>;

    /// Descendants of `root` matching `selector`, in document order.
    fn query_all(&self, root: &Self::Node, selector: &str) -> Vec<Self::Node>;

    /// Whether `node` itself matches `selector`.
    fn matches(&self, node: &Self::Node, selector: &str) -> bool;

    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Whether `node` is `ancestor` or one of its descendants.
    fn contains(&self, ancestor: &Self::Node, node: &Self::Node) -> bool;

    /// Whether `node` is attached to the document.
    fn is_connected(&self, node: &Self::Node) -> bool;

    /// Whether `node` comes after `other` in document order.
    fn follows(&self, node: &Self::Node, other: &Self::Node) -> bool;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    fn set_attribute(&self, node: &Self::Node, name: &str, value: &str);

    /// Create a detached, empty block element of the given height, tagged
    /// with `attribute = value`. `None` if the host cannot create elements.
    fn create_placeholder(&self, height: f64, attribute: &str, value: &str) -> Option<Self::Node>;

    /// Resize a placeholder created by [`HostDom::create_placeholder`].
    fn set_placeholder_height(&self, placeholder: &Self::Node, height: f64);

    /// Put `new` where `old` is; `old` ends up detached.
    fn replace_with(&self, old: &Self::Node, new: &Self::Node);

    /// Insert `node` into `parent` before `reference` (append when `None`).
    fn insert_before(&self, parent: &Self::Node, node: &Self::Node, reference: Option<&Self::Node>);

    /// Remove `node` from its parent, if any.
    fn remove(&self, node: &Self::Node);

    /// Top edge of `node` relative to the browser viewport.
    fn top(&self, node: &Self::Node) -> f64;

    /// Rendered height of `node` (0 when detached or not laid out).
    fn height(&self, node: &Self::Node) -> f64;

    fn last_element_child(&self, node: &Self::Node) -> Option<Self::Node>;

    fn scroll_metrics(&self, container: &Self::Node) -> ScrollMetrics;

    fn set_scroll_top(&self, container: &Self::Node, scroll_top: f64);

    /// Drain child-list records the host observed but has not delivered yet.
    fn take_mutations(&self) -> MutationBatch<Self::Node> {
        MutationBatch::default()
    }

    /// Current page URL.
    fn location_href(&self) -> String;
}
