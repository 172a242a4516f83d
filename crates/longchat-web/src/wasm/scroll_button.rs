#![forbid(unsafe_code)]

//! Custom scroll-to-bottom button.
//!
//! The page's own button only scrolls, which lands on placeholders. This one
//! is a clone of it (so it looks the same) whose click runs
//! [`longchat_core::Virtualiser::jump_to_bottom`]. The native button stays
//! hidden while the clone is installed, and comes back on removal.
//!
//! The native button is rendered late, like the transcript; installation is
//! retried on a slow cadence from the host tick.

use core::time::Duration;

use longchat_core::logging::Verbosity;
use tracing::{debug, trace, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Event, HtmlElement};

use crate::boot::SCROLL_BUTTON_ID;

/// Spacing between attempts to find the native button.
const RETRY: Duration = Duration::from_millis(1000);

/// Attempts logged as warnings.
const LOUD_ATTEMPTS: u32 = 3;

struct Installed {
    native: HtmlElement,
    button: HtmlElement,
    click: Closure<dyn FnMut(Event)>,
}

impl Installed {
    fn is_live(&self) -> bool {
        self.button.is_connected() && self.native.is_connected()
    }

    fn remove(self) {
        let _ = self
            .button
            .remove_event_listener_with_callback("click", self.click.as_ref().unchecked_ref());
        self.button.remove();
        let _ = self.native.style().remove_property("display");
    }
}

#[derive(Default)]
pub(crate) struct ScrollButton {
    installed: Option<Installed>,
    attempts: u32,
    next_attempt: Duration,
}

impl ScrollButton {
    /// Install the clone if needed, then show it only away from the bottom.
    pub(crate) fn sync(&mut self, document: &Document, selector: &str, now: Duration, visible: bool) {
        if self.installed.as_ref().is_some_and(|i| !i.is_live()) {
            debug!(target: "longchat::web", "scroll button detached by the page; reinstalling");
            self.remove();
        }
        if self.installed.is_none() && now >= self.next_attempt {
            self.next_attempt = now + RETRY;
            self.install(document, selector);
        }
        if let Some(installed) = &self.installed {
            let display = if visible { "" } else { "none" };
            let _ = installed.button.style().set_property("display", display);
        }
    }

    fn install(&mut self, document: &Document, selector: &str) {
        self.attempts += 1;
        let Some(native) = document
            .query_selector(selector)
            .ok()
            .flatten()
            .and_then(|el| el.dyn_into::<HtmlElement>().ok())
        else {
            match Verbosity::for_attempt(self.attempts, LOUD_ATTEMPTS) {
                Verbosity::Warn => {
                    warn!(target: "longchat::web", attempt = self.attempts, "native scroll button not found; retrying");
                }
                Verbosity::Debug => {
                    debug!(target: "longchat::web", attempt = self.attempts, "native scroll button not found");
                }
                Verbosity::Trace => {
                    trace!(target: "longchat::web", attempt = self.attempts, "native scroll button not found");
                }
            }
            return;
        };
        let Some(parent) = native.parent_element() else {
            return;
        };
        let Some(button) = native
            .clone_node_with_deep(true)
            .ok()
            .and_then(|node| node.dyn_into::<HtmlElement>().ok())
        else {
            return;
        };
        button.set_id(SCROLL_BUTTON_ID);
        let _ = button.style().remove_property("display");

        let click = Closure::<dyn FnMut(Event)>::new(|event: Event| {
            event.prevent_default();
            event.stop_propagation();
            super::with_app(|app| {
                let now = app.now();
                app.virtualiser.jump_to_bottom(now);
            });
        });
        if button
            .add_event_listener_with_callback("click", click.as_ref().unchecked_ref())
            .is_err()
        {
            return;
        }
        if parent.append_child(&button).is_err() {
            return;
        }
        let _ = native.style().set_property("display", "none");
        debug!(target: "longchat::web", attempts = self.attempts, "custom scroll button installed");
        self.installed = Some(Installed { native, button, click });
    }

    /// Take the clone off the page and show the native button again.
    pub(crate) fn remove(&mut self) {
        if let Some(installed) = self.installed.take() {
            installed.remove();
        }
        self.attempts = 0;
        self.next_attempt = Duration::ZERO;
    }
}
