#![forbid(unsafe_code)]

//! Content-script entry point.
//!
//! [`boot`] runs when the module is instantiated. It builds the engine over
//! the live document and hooks it up:
//!
//! | Source | Engine call |
//! |--------|-------------|
//! | `scroll` on the container (document capture, passive) | `on_scroll` |
//! | `MutationObserver` on `<body>` (child list, subtree) | `on_mutations` |
//! | `popstate` | `check_url` |
//! | `setInterval` every [`TICK_INTERVAL_MS`] | `tick` |
//! | custom scroll button click | `jump_to_bottom` |
//!
//! Every listener is registered with the engine's lifecycle so
//! [`LongChatWeb::dispose`] removes all of them.

mod overlay;
mod scroll_button;
mod web_dom;

use core::time::Duration;
use std::cell::RefCell;

use js_sys::Array;
use longchat_core::Virtualiser;
use tracing::{info, trace};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
    AddEventListenerOptions, Document, Element, Event, MutationObserver, MutationObserverInit, Window,
};
use web_time::Instant;

use crate::boot::{CONFIG_STORAGE_KEY, TICK_INTERVAL_MS, load_config};
use crate::console::init_logging;
use overlay::OverlaySink;
use scroll_button::ScrollButton;
use web_dom::{WebDom, batch_from_records};

thread_local! {
    static APP: RefCell<Option<App>> = const { RefCell::new(None) };
}

pub(crate) struct App {
    pub(crate) virtualiser: Virtualiser<WebDom, OverlaySink>,
    button: ScrollButton,
    dom: WebDom,
    clock: Instant,
}

impl App {
    /// Engine clock: time since boot.
    pub(crate) fn now(&self) -> Duration {
        self.clock.elapsed()
    }

    fn tick(&mut self) {
        let now = self.now();
        self.virtualiser.tick(now);
        self.sync_button(now);
    }

    fn on_scroll(&mut self, target: Option<Element>) {
        let container = self.virtualiser.manager().and_then(|m| m.container());
        let on_container = matches!((&target, container), (Some(t), Some(c)) if t == c);
        if !on_container {
            return;
        }
        let now = self.now();
        self.virtualiser.on_scroll(now);
        self.sync_button(now);
    }

    fn on_records(&mut self, records: &Array) {
        let now = self.now();
        self.virtualiser.on_mutations(now, batch_from_records(records));
        self.sync_button(now);
    }

    fn sync_button(&mut self, now: Duration) {
        if self.virtualiser.manager().is_none() {
            return;
        }
        let visible = self.virtualiser.scroll_button_visible();
        let selector = &self.virtualiser.config().selectors.scroll_button;
        self.button.sync(self.dom.document(), selector, now, visible);
    }

    fn dispose(&mut self) {
        self.button.remove();
        self.virtualiser.dispose();
        self.virtualiser.sink_mut().destroy();
        self.dom.set_observer(None);
    }
}

/// Run `f` on the app unless it is missing or already borrowed.
pub(crate) fn with_app<R>(f: impl FnOnce(&mut App) -> R) -> Option<R> {
    APP.with(|cell| {
        let Ok(mut guard) = cell.try_borrow_mut() else {
            trace!(target: "longchat::web", "re-entrant event skipped");
            return None;
        };
        guard.as_mut().map(f)
    })
}

fn console_line(line: &str) {
    web_sys::console::log_1(&JsValue::from_str(line));
}

fn missing(what: &str) -> JsValue {
    JsValue::from_str(&format!("longchat: {what} not available"))
}

fn install_listeners(
    window: &Window,
    document: &Document,
    dom: &WebDom,
    virtualiser: &mut Virtualiser<WebDom, OverlaySink>,
) -> Result<(), JsValue> {
    let lifecycle = virtualiser.lifecycle_mut();

    let scroll = Closure::<dyn FnMut(Event)>::new(|event: Event| {
        let target = event.target().and_then(|t| t.dyn_into::<Element>().ok());
        with_app(|app| app.on_scroll(target));
    });
    let options = AddEventListenerOptions::new();
    options.set_capture(true);
    options.set_passive(true);
    document.add_event_listener_with_callback_and_add_event_listener_options(
        "scroll",
        scroll.as_ref().unchecked_ref(),
        &options,
    )?;
    let target = document.clone();
    lifecycle.register("scroll listener", move || {
        let _ = target.remove_event_listener_with_callback_and_bool(
            "scroll",
            scroll.as_ref().unchecked_ref(),
            true,
        );
    });

    let on_records = Closure::<dyn FnMut(Array, MutationObserver)>::new(
        |records: Array, _observer: MutationObserver| {
            with_app(|app| app.on_records(&records));
        },
    );
    let observer = MutationObserver::new(on_records.as_ref().unchecked_ref())?;
    let init = MutationObserverInit::new();
    init.set_child_list(true);
    init.set_subtree(true);
    let body = document.body().ok_or_else(|| missing("document body"))?;
    observer.observe_with_options(&body, &init)?;
    dom.set_observer(Some(observer.clone()));
    lifecycle.register("mutation observer", move || {
        observer.disconnect();
        drop(on_records);
    });

    let popstate = Closure::<dyn FnMut(Event)>::new(|_event: Event| {
        with_app(|app| {
            let now = app.now();
            app.virtualiser.check_url(now);
        });
    });
    window.add_event_listener_with_callback("popstate", popstate.as_ref().unchecked_ref())?;
    let target = window.clone();
    lifecycle.register("popstate listener", move || {
        let _ = target.remove_event_listener_with_callback("popstate", popstate.as_ref().unchecked_ref());
    });

    let tick = Closure::<dyn FnMut()>::new(|| {
        with_app(App::tick);
    });
    let handle = window.set_interval_with_callback_and_timeout_and_arguments_0(
        tick.as_ref().unchecked_ref(),
        TICK_INTERVAL_MS,
    )?;
    let target = window.clone();
    lifecycle.register("tick interval", move || {
        target.clear_interval_with_handle(handle);
        drop(tick);
    });

    Ok(())
}

/// Module start: build the engine and attach it to the page.
#[wasm_bindgen(start)]
pub fn boot() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();

    let window = web_sys::window().ok_or_else(|| missing("window"))?;
    let document = window.document().ok_or_else(|| missing("document"))?;
    let storage = window.local_storage().ok().flatten();
    let raw = storage
        .as_ref()
        .and_then(|s| s.get_item(CONFIG_STORAGE_KEY).ok().flatten());
    let config = load_config(raw.as_deref());
    init_logging(config.debug, console_line);
    info!(target: "longchat::web", version = env!("CARGO_PKG_VERSION"), "content script loaded");

    let dom = WebDom::new(window.clone(), document.clone());
    let overlay = OverlaySink::new(&document, storage, config.debug);
    let mut virtualiser = Virtualiser::with_sink(dom.clone(), config, overlay)
        .map_err(|err| JsValue::from_str(&err.to_string()))?;
    install_listeners(&window, &document, &dom, &mut virtualiser)?;

    let app = App {
        virtualiser,
        button: ScrollButton::default(),
        dom,
        clock: Instant::now(),
    };
    APP.with(|cell| *cell.borrow_mut() = Some(app));
    with_app(|app| {
        let now = app.now();
        app.virtualiser.start(now);
    });
    Ok(())
}

/// Handle exposed to the extension's JavaScript glue.
#[wasm_bindgen]
pub struct LongChatWeb {
    _private: (),
}

#[wasm_bindgen]
impl LongChatWeb {
    /// Show or hide the debug overlay.
    #[wasm_bindgen(js_name = toggleOverlay)]
    pub fn toggle_overlay() {
        with_app(|app| app.virtualiser.toggle_overlay());
    }

    /// Current statistics as JSON.
    #[wasm_bindgen(js_name = statsJson)]
    pub fn stats_json() -> String {
        with_app(|app| app.virtualiser.statistics().to_json()).unwrap_or_else(|| String::from("{}"))
    }

    #[wasm_bindgen(js_name = jumpToBottom)]
    pub fn jump_to_bottom() -> bool {
        with_app(|app| {
            let now = app.now();
            app.virtualiser.jump_to_bottom(now)
        })
        .unwrap_or(false)
    }

    /// Restore the page and detach from it for good.
    pub fn dispose() {
        let app = APP.with(|cell| cell.try_borrow_mut().ok().and_then(|mut guard| guard.take()));
        if let Some(mut app) = app {
            app.dispose();
        }
    }
}
