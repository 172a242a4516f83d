#![forbid(unsafe_code)]

//! A whole browsing session driven through the orchestrator: the page loads
//! late, the user reads history, a reply streams in, the user navigates to
//! another conversation, and finally the engine is torn down.

use std::time::Duration;

use longchat_core::config::{PLACEHOLDER_ATTRIBUTE, VirtualizerConfig};
use longchat_core::discovery::DiscoveryState;
use longchat_core::manager::{IngestOutcome, ScrollOutcome};
use longchat_core::mem_dom::{MemoryDom, NodeId};
use longchat_core::scroll::ScrollZone;
use longchat_core::stats::RecordingSink;
use longchat_core::window::Window;
use longchat_core::{HostDom, Virtualiser};
use pretty_assertions::assert_eq;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn config() -> VirtualizerConfig {
    VirtualizerConfig::default()
        .with_window_size(8)
        .with_window_step(4)
        .with_thresholds(200.0, 200.0)
}

fn render_conversation(dom: &MemoryDom, prefix: &str, n: usize) -> (NodeId, NodeId) {
    let main = dom.append_element(dom.body(), "main", &[], 0.0);
    let list = dom.append_element(main, "div", &[], 0.0);
    dom.make_scrollable(list, 600.0);
    for i in 0..n {
        let id = format!("conversation-turn-{prefix}-{i}");
        dom.append_element(list, "article", &[("data-testid", id.as_str())], 120.0);
    }
    (main, list)
}

#[test]
fn full_session() {
    let dom = MemoryDom::new();
    dom.set_location("https://chat.example/c/first");
    let mut v = Virtualiser::with_sink(dom.clone(), config(), RecordingSink::default()).expect("virtualiser");
    v.start(ms(0));
    assert_eq!(v.discovery_state(), DiscoveryState::Searching);

    // The page renders; the observer reports it before the retry timer fires.
    let (main, list) = render_conversation(&dom, "a", 30);
    let batch = dom.take_mutations();
    assert_eq!(v.on_mutations(ms(40), batch), IngestOutcome::Ignored);
    let manager = v.manager().expect("attached");
    assert_eq!(manager.container(), Some(&list));
    assert_eq!(manager.window(), Some(Window::new(22, 29)));
    assert_eq!(v.statistics().turns_total, 30);
    assert_eq!(v.statistics().turns_visible, 8);

    // The user asks for the newest message; forced scrolling settles.
    assert!(v.jump_to_bottom(ms(100)));
    assert!(v.is_force_scrolling());
    for t in (200..=1300).step_by(100) {
        v.tick(ms(t));
    }
    assert!(!v.is_force_scrolling());
    assert!(!v.scroll_button_visible());

    // A reply streams in: three nodes in one batch, one pipeline pass.
    let before = v.manager().expect("attached").counters();
    for i in 0..3 {
        let id = format!("conversation-turn-a-new-{i}");
        dom.append_element(list, "article", &[("data-testid", id.as_str())], 120.0);
    }
    let batch = dom.take_mutations();
    assert_eq!(v.on_mutations(ms(1400), batch), IngestOutcome::Appended(3));
    let after = v.manager().expect("attached").counters();
    assert_eq!(after.resyncs - before.resyncs, 1);
    assert_eq!(v.statistics().turns_total, 33);

    // Navigate: the page swaps the transcript and the URL.
    dom.remove(&main);
    dom.set_location("https://chat.example/c/second");
    let (_, second_list) = render_conversation(&dom, "b", 4);
    dom.clear_mutations();
    assert!(v.check_url(ms(1500)));
    assert_eq!(v.resets(), 1);
    let manager = v.manager().expect("re-attached");
    assert_eq!(manager.container(), Some(&second_list));
    assert_eq!(manager.loaded_stats().total_count, 4);

    // Teardown restores the page and stops every timer.
    v.dispose();
    assert!(v.is_disposed());
    assert_eq!(v.pending_timers(), 0);
    assert!(dom.query_all(&second_list, &format!("[{PLACEHOLDER_ATTRIBUTE}]")).is_empty());
    assert!(!v.sink().published.is_empty());
}

#[test]
fn reading_history_through_scroll_events() {
    let dom = MemoryDom::new();
    let main = dom.append_element(dom.body(), "main", &[], 0.0);
    dom.make_scrollable(main, 600.0);
    let items: Vec<NodeId> = (0..40)
        .map(|i| {
            let id = format!("conversation-turn-{i}");
            dom.append_element(main, "article", &[("data-testid", id.as_str())], 120.0)
        })
        .collect();
    let mut v = Virtualiser::new(dom.clone(), config()).expect("virtualiser");
    v.start(ms(0));
    assert_eq!(v.manager().and_then(|m| m.window()), Some(Window::new(32, 39)));

    // Scroll to just below the first rendered message.
    dom.set_scroll_top(&main, 32.0 * 120.0 + 40.0);
    let offset_before = dom.top(&items[33]) - dom.top(&main);
    assert_eq!(v.on_scroll(ms(100)), ScrollOutcome::Extended(ScrollZone::NearTop));
    assert_eq!(v.manager().and_then(|m| m.window()), Some(Window::new(28, 39)));
    assert_eq!(dom.top(&items[33]) - dom.top(&main), offset_before);

    // Events inside the suppression window are ignored.
    assert_eq!(v.on_scroll(ms(120)), ScrollOutcome::Suppressed);

    // Throttled events are picked up by the next tick.
    dom.set_scroll_top(&main, 28.0 * 120.0 + 40.0);
    assert_eq!(v.on_scroll(ms(200)), ScrollOutcome::Extended(ScrollZone::NearTop));
    dom.set_scroll_top(&main, 24.0 * 120.0 + 40.0);
    assert_eq!(v.on_scroll(ms(260)), ScrollOutcome::Extended(ScrollZone::NearTop));
    assert_eq!(v.on_scroll(ms(265)), ScrollOutcome::Suppressed);
    assert_eq!(v.manager().and_then(|m| m.window()), Some(Window::new(20, 39)));

    // Reaching the bottom shows no jump button; reading history does.
    assert!(v.scroll_button_visible());
    v.jump_to_bottom(ms(400));
    for t in (500..=2000).step_by(100) {
        v.tick(ms(t));
    }
    assert!(!v.scroll_button_visible());
    assert_eq!(v.manager().and_then(|m| m.window()), Some(Window::new(32, 39)));
}
