#![forbid(unsafe_code)]

//! The overlay box on the page, painted from an [`OverlayModel`].

use longchat_core::stats::{Statistics, StatsSink};
use tracing::{debug, trace};
use wasm_bindgen::JsCast;
use web_sys::{Document, HtmlElement, Storage};

use crate::boot::OVERLAY_ID;
use crate::overlay::{OverlayModel, OVERLAY_STYLE, VisibilityStore};

/// [`VisibilityStore`] over `localStorage`; a no-op when storage is blocked.
#[derive(Debug, Clone)]
pub(crate) struct LocalStore(pub(crate) Option<Storage>);

impl VisibilityStore for LocalStore {
    fn get(&self, key: &str) -> Option<String> {
        self.0.as_ref()?.get_item(key).ok().flatten()
    }

    fn set(&mut self, key: &str, value: &str) {
        if let Some(storage) = &self.0 {
            let _ = storage.set_item(key, value);
        }
    }

    fn remove(&mut self, key: &str) {
        if let Some(storage) = &self.0 {
            let _ = storage.remove_item(key);
        }
    }
}

/// Stats sink that renders into a fixed `<div>`.
#[derive(Debug)]
pub(crate) struct OverlaySink {
    model: OverlayModel<LocalStore>,
    element: Option<HtmlElement>,
}

fn find_or_create(document: &Document) -> Option<HtmlElement> {
    if let Some(existing) = document.get_element_by_id(OVERLAY_ID) {
        return existing.dyn_into::<HtmlElement>().ok();
    }
    let element = document.create_element("div").ok()?.dyn_into::<HtmlElement>().ok()?;
    element.set_id(OVERLAY_ID);
    let style = element.style();
    for (name, value) in OVERLAY_STYLE {
        let _ = style.set_property(name, value);
    }
    document.body()?.append_child(&element).ok()?;
    Some(element)
}

impl OverlaySink {
    pub(crate) fn new(document: &Document, storage: Option<Storage>, visible_by_default: bool) -> Self {
        let mut sink = Self {
            model: OverlayModel::new(LocalStore(storage), visible_by_default),
            element: find_or_create(document),
        };
        sink.paint();
        debug!(target: "longchat::web", attached = sink.element.is_some(), "debug overlay ready");
        sink
    }

    fn paint(&mut self) {
        if !self.model.take_dirty() {
            return;
        }
        let Some(element) = &self.element else {
            return;
        };
        element.set_inner_text(self.model.text());
        let _ = element.style().set_property("display", self.model.display());
        trace!(target: "longchat::web", "overlay painted");
    }

    /// Remove the box and forget the stored flag.
    pub(crate) fn destroy(&mut self) {
        if let Some(element) = self.element.take() {
            element.remove();
        }
        self.model.forget();
    }
}

impl StatsSink for OverlaySink {
    fn publish(&mut self, stats: &Statistics) {
        self.model.publish(stats);
        self.paint();
    }

    fn toggle(&mut self) {
        self.model.toggle();
        self.paint();
    }
}
