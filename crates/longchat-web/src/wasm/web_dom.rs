#![forbid(unsafe_code)]

//! [`HostDom`] over the real document.
//!
//! Element handles are `web_sys::Element`s; equality is JS identity. The
//! page's `MutationObserver` is shared with the engine so records produced
//! during a resync can be drained synchronously through `takeRecords`.

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::Array;
use longchat_core::host::{HostDom, MutationBatch, ScrollMetrics};
use tracing::trace;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlElement, MutationObserver, MutationRecord, Node, NodeList, Window};

#[derive(Debug)]
struct Inner {
    window: Window,
    document: Document,
    observer: RefCell<Option<MutationObserver>>,
}

/// Shared handle to the page.
#[derive(Debug, Clone)]
pub(crate) struct WebDom {
    inner: Rc<Inner>,
}

impl WebDom {
    pub(crate) fn new(window: Window, document: Document) -> Self {
        Self {
            inner: Rc::new(Inner {
                window,
                document,
                observer: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn document(&self) -> &Document {
        &self.inner.document
    }

    /// Observer whose pending records [`HostDom::take_mutations`] drains.
    pub(crate) fn set_observer(&self, observer: Option<MutationObserver>) {
        *self.inner.observer.borrow_mut() = observer;
    }
}

fn elements(list: &NodeList) -> Vec<Element> {
    (0..list.length())
        .filter_map(|i| list.get(i))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .collect()
}

/// Child-list records as a batch; text and attribute changes are dropped.
pub(crate) fn batch_from_records(records: &Array) -> MutationBatch<Element> {
    let mut batch = MutationBatch::default();
    for value in records.iter() {
        let Ok(record) = value.dyn_into::<MutationRecord>() else {
            continue;
        };
        if record.type_() != "childList" {
            continue;
        }
        batch.added.extend(elements(&record.added_nodes()));
        batch.removed.extend(elements(&record.removed_nodes()));
    }
    batch
}

fn set_height(element: &Element, height: f64) {
    if let Some(html) = element.dyn_ref::<HtmlElement>() {
        let _ = html.style().set_property("height", &format!("{height}px"));
    }
}

impl HostDom for WebDom {
    type Node = Element;

    fn query(&self, selector: &str) -> Option<Element> {
        self.inner.document.query_selector(selector).ok().flatten()
    }

    fn query_all(&self, root: &Element, selector: &str) -> Vec<Element> {
        root.query_selector_all(selector)
            .map(|list| elements(&list))
            .unwrap_or_default()
    }

    fn matches(&self, node: &Element, selector: &str) -> bool {
        node.matches(selector).unwrap_or(false)
    }

    fn parent(&self, node: &Element) -> Option<Element> {
        node.parent_element()
    }

    fn contains(&self, ancestor: &Element, node: &Element) -> bool {
        let node: &Node = node;
        ancestor.contains(Some(node))
    }

    fn is_connected(&self, node: &Element) -> bool {
        node.is_connected()
    }

    fn follows(&self, node: &Element, other: &Element) -> bool {
        other.compare_document_position(node) & Node::DOCUMENT_POSITION_FOLLOWING != 0
    }

    fn attribute(&self, node: &Element, name: &str) -> Option<String> {
        node.get_attribute(name)
    }

    fn set_attribute(&self, node: &Element, name: &str, value: &str) {
        if let Err(err) = node.set_attribute(name, value) {
            trace!(target: "longchat::web", name, ?err, "set_attribute failed");
        }
    }

    fn create_placeholder(&self, height: f64, attribute: &str, value: &str) -> Option<Element> {
        let placeholder = self.inner.document.create_element("div").ok()?;
        placeholder.set_attribute(attribute, value).ok()?;
        let _ = placeholder.set_attribute("aria-hidden", "true");
        set_height(&placeholder, height);
        Some(placeholder)
    }

    fn set_placeholder_height(&self, placeholder: &Element, height: f64) {
        set_height(placeholder, height);
    }

    fn replace_with(&self, old: &Element, new: &Element) {
        if let Err(err) = old.replace_with_with_node_1(new) {
            trace!(target: "longchat::web", ?err, "replace_with failed");
        }
    }

    fn insert_before(&self, parent: &Element, node: &Element, reference: Option<&Element>) {
        let reference = reference.map(AsRef::<Node>::as_ref);
        if let Err(err) = parent.insert_before(node, reference) {
            trace!(target: "longchat::web", ?err, "insert_before failed");
        }
    }

    fn remove(&self, node: &Element) {
        node.remove();
    }

    fn top(&self, node: &Element) -> f64 {
        node.get_bounding_client_rect().top()
    }

    fn height(&self, node: &Element) -> f64 {
        if node.is_connected() {
            node.get_bounding_client_rect().height()
        } else {
            0.0
        }
    }

    fn last_element_child(&self, node: &Element) -> Option<Element> {
        node.last_element_child()
    }

    fn scroll_metrics(&self, container: &Element) -> ScrollMetrics {
        ScrollMetrics::new(
            f64::from(container.scroll_top()),
            f64::from(container.client_height()),
            f64::from(container.scroll_height()),
        )
    }

    #[allow(clippy::cast_possible_truncation)]
    fn set_scroll_top(&self, container: &Element, scroll_top: f64) {
        container.set_scroll_top(scroll_top.round() as i32);
    }

    fn take_mutations(&self) -> MutationBatch<Element> {
        match self.inner.observer.borrow().as_ref() {
            Some(observer) => batch_from_records(&observer.take_records()),
            None => MutationBatch::default(),
        }
    }

    fn location_href(&self) -> String {
        self.inner.window.location().href().unwrap_or_default()
    }
}
