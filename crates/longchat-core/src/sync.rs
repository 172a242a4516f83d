#![forbid(unsafe_code)]

//! DOM reconciliation.
//!
//! Target state: every record inside the window has its real element in the
//! document; every record outside it is represented by a placeholder of the
//! element's last measured height, so the total scroll height stays put.
//!
//! # Algorithm
//!
//! 1. Diff current presence against the target. An empty diff returns
//!    immediately without a single read of layout or write to the tree, which
//!    is what makes back-to-back passes idempotent.
//! 2. Drain the host's pending mutation records (they belong to the page and
//!    are deferred for ingest), then raise the own-mutation flag.
//! 3. Capture the scroll anchor: the topmost fully visible slot and its
//!    offset from the container's top edge. Slots are in document order, so
//!    a binary search over their tops finds it.
//! 4. Swap elements and placeholders in place.
//! 5. Move `scrollTop` by however far the anchor drifted.
//! 6. Drain and discard the records our own writes produced; lower the flag.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Host removed a detached record's placeholder | element reinserted next to its neighbours |
//! | Host removed an attached element | left alone; the next rebuild drops it |
//! | Element measured at 0px (hidden) | previous height kept for the placeholder |

use crate::cache::{MessageRecord, Presence};
use crate::config::PLACEHOLDER_ATTRIBUTE;
use crate::host::{HostDom, MutationBatch};
use crate::window::Window;
use crate::{debug, trace, warn};

/// Anchor drift below this is treated as no drift.
const ANCHOR_EPSILON_PX: f64 = 0.5;

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SyncReport {
    /// Elements swapped out for placeholders.
    pub detached: usize,
    /// Elements put back in place of their placeholders.
    pub attached: usize,
    /// Elements reinserted after their placeholder vanished.
    pub reinserted: usize,
    /// `scrollTop` correction applied to keep the anchor still.
    pub anchor_shift: f64,
}

impl SyncReport {
    /// Whether the pass changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.detached == 0 && self.attached == 0 && self.reinserted == 0
    }
}

/// The reference slot used to keep the viewport still.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    /// Cache index of the anchored record.
    pub index: usize,
    /// Offset of its top edge below the container's top edge.
    pub offset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Detach,
    Attach,
    Reinsert,
}

/// Reconciles the document against the window.
#[derive(Debug, Clone)]
pub struct DomSynchronizer<N> {
    in_flight: bool,
    deferred: MutationBatch<N>,
    passes: u64,
}

impl<N> Default for DomSynchronizer<N> {
    fn default() -> Self {
        Self {
            in_flight: false,
            deferred: MutationBatch::default(),
            passes: 0,
        }
    }
}

impl<N: Clone + PartialEq> DomSynchronizer<N> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a pass is writing to the document right now. Mutation records
    /// produced meanwhile are ours, not the page's.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Passes that actually wrote to the document.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Page-authored records drained before our last pass.
    pub fn take_deferred(&mut self) -> MutationBatch<N> {
        std::mem::take(&mut self.deferred)
    }

    /// Make the document match `window`. See the module docs.
    pub fn resync<D: HostDom<Node = N>>(
        &mut self,
        dom: &D,
        records: &mut [MessageRecord<N>],
        window: Option<Window>,
        container: &N,
    ) -> SyncReport {
        let plan: Vec<(usize, Action)> = records
            .iter()
            .enumerate()
            .filter_map(|(idx, record)| {
                let wanted = window.is_some_and(|w| w.contains(idx));
                match (record.presence(dom), wanted) {
                    (Presence::Attached, false) => Some((idx, Action::Detach)),
                    (Presence::Placeholder, true) => Some((idx, Action::Attach)),
                    (Presence::Missing, true) if record.placeholder.is_some() => {
                        Some((idx, Action::Reinsert))
                    }
                    _ => None,
                }
            })
            .collect();
        if plan.is_empty() {
            return SyncReport::default();
        }

        self.begin(dom);
        let anchor = capture_anchor(dom, records, container);
        let mut report = SyncReport::default();

        for (idx, action) in plan {
            match action {
                Action::Detach => {
                    if detach(dom, &mut records[idx]) {
                        report.detached += 1;
                    }
                }
                Action::Attach => {
                    let record = &records[idx];
                    if let Some(placeholder) = &record.placeholder {
                        dom.replace_with(placeholder, &record.element);
                    }
                    report.attached += 1;
                }
                Action::Reinsert => {
                    reinsert(dom, records, idx, container);
                    report.reinserted += 1;
                }
            }
        }

        if let Some(anchor) = anchor {
            report.anchor_shift = restore_anchor(dom, records, container, anchor);
        }
        self.end(dom);
        self.passes += 1;

        debug!(
            target: "longchat::sync",
            detached = report.detached,
            attached = report.attached,
            reinserted = report.reinserted,
            anchor_shift = report.anchor_shift,
            "resync pass"
        );
        report
    }

    /// Put every detached element back. Used on disposal so the page is left
    /// as it was found.
    pub fn restore_all<D: HostDom<Node = N>>(&mut self, dom: &D, records: &[MessageRecord<N>]) -> usize {
        self.begin(dom);
        let mut restored = 0;
        for record in records {
            if record.presence(dom) == Presence::Placeholder
                && let Some(placeholder) = &record.placeholder
            {
                dom.replace_with(placeholder, &record.element);
                restored += 1;
            }
        }
        self.end(dom);
        restored
    }

    fn begin<D: HostDom<Node = N>>(&mut self, dom: &D) {
        self.deferred.extend(dom.take_mutations());
        self.in_flight = true;
    }

    fn end<D: HostDom<Node = N>>(&mut self, dom: &D) {
        let own = dom.take_mutations();
        trace!(
            target: "longchat::sync",
            added = own.added.len(),
            removed = own.removed.len(),
            "discarded own mutation records"
        );
        self.in_flight = false;
    }
}

fn detach<D: HostDom>(dom: &D, record: &mut MessageRecord<D::Node>) -> bool {
    let measured = dom.height(&record.element);
    let resized = measured > 0.0 && (measured - record.height).abs() > ANCHOR_EPSILON_PX;
    if measured > 0.0 {
        record.height = measured;
    }
    let placeholder = match &record.placeholder {
        Some(existing) => {
            if resized {
                dom.set_placeholder_height(existing, record.height);
            }
            existing.clone()
        }
        None => {
            let Some(created) = dom.create_placeholder(record.height, PLACEHOLDER_ATTRIBUTE, &record.id)
            else {
                warn!(target: "longchat::sync", id = %record.id, "cannot create placeholder; leaving message attached");
                return false;
            };
            record.placeholder = Some(created.clone());
            created
        }
    };
    dom.replace_with(&record.element, &placeholder);
    true
}

fn reinsert<D: HostDom>(dom: &D, records: &[MessageRecord<D::Node>], idx: usize, container: &D::Node) {
    let element = &records[idx].element;
    let next = records[idx + 1..]
        .iter()
        .find_map(|r| r.current_node(dom))
        .and_then(|node| dom.parent(node).map(|parent| (parent, node.clone())));
    match next {
        Some((parent, reference)) => dom.insert_before(&parent, element, Some(&reference)),
        None => {
            let parent = records[..idx]
                .iter()
                .rev()
                .find_map(|r| r.current_node(dom))
                .and_then(|node| dom.parent(node))
                .unwrap_or_else(|| container.clone());
            dom.insert_before(&parent, element, None);
        }
    }
}

/// Find the topmost fully visible slot (element or placeholder).
pub fn capture_anchor<D: HostDom>(
    dom: &D,
    records: &[MessageRecord<D::Node>],
    container: &D::Node,
) -> Option<Anchor> {
    let slots: Vec<(usize, &D::Node)> = records
        .iter()
        .enumerate()
        .filter_map(|(idx, r)| r.current_node(dom).map(|node| (idx, node)))
        .collect();
    if slots.is_empty() {
        return None;
    }
    let view_top = dom.top(container);
    let view_bottom = view_top + dom.scroll_metrics(container).client_height;

    let first_below = slots.partition_point(|(_, node)| dom.top(node) < view_top - ANCHOR_EPSILON_PX);
    let pick = match slots.get(first_below) {
        Some((_, node)) if dom.top(node) < view_bottom => first_below,
        _ => first_below.checked_sub(1)?,
    };
    let (index, node) = slots[pick];
    Some(Anchor {
        index,
        offset: dom.top(node) - view_top,
    })
}

fn restore_anchor<D: HostDom>(
    dom: &D,
    records: &[MessageRecord<D::Node>],
    container: &D::Node,
    anchor: Anchor,
) -> f64 {
    let Some(node) = records.get(anchor.index).and_then(|r| r.current_node(dom)) else {
        return 0.0;
    };
    let drift = dom.top(node) - dom.top(container) - anchor.offset;
    if drift.abs() <= ANCHOR_EPSILON_PX {
        return 0.0;
    }
    let before = dom.scroll_metrics(container).scroll_top;
    dom.set_scroll_top(container, before + drift);
    let applied = dom.scroll_metrics(container).scroll_top - before;
    trace!(target: "longchat::sync", drift, applied, "anchor restored");
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MessageCache;
    use crate::config::VirtualizerConfig;
    use crate::mem_dom::{MemoryDom, NodeId};
    use core::time::Duration;

    struct Fixture {
        dom: MemoryDom,
        main: NodeId,
        items: Vec<NodeId>,
        cache: MessageCache<NodeId>,
        sync: DomSynchronizer<NodeId>,
    }

    fn fixture(heights: &[f64]) -> Fixture {
        let dom = MemoryDom::new();
        let main = dom.append_element(dom.body(), "main", &[], 0.0);
        dom.make_scrollable(main, 100.0);
        let items: Vec<_> = heights
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let id = format!("m{i}");
                dom.append_element(main, "article", &[("data-testid", id.as_str())], *h)
            })
            .collect();
        let config = VirtualizerConfig::default().with_message_selector("article");
        let mut cache = MessageCache::new();
        cache.rebuild(&dom, &main, &config, Duration::ZERO);
        dom.clear_mutations();
        Fixture {
            dom,
            main,
            items,
            cache,
            sync: DomSynchronizer::new(),
        }
    }

    impl Fixture {
        fn resync(&mut self, window: Window) -> SyncReport {
            self.sync
                .resync(&self.dom, self.cache.records_mut(), Some(window), &self.main)
        }
    }

    #[test]
    fn detaches_outside_window_and_keeps_height() {
        let mut f = fixture(&[30.0, 40.0, 50.0, 60.0]);
        let before = f.dom.scroll_metrics(&f.main).scroll_height;
        let report = f.resync(Window::new(2, 3));
        assert_eq!(report.detached, 2);
        assert!(!f.dom.is_connected(&f.items[0]));
        assert!(!f.dom.is_connected(&f.items[1]));
        assert_eq!(f.dom.scroll_metrics(&f.main).scroll_height, before);
        assert_eq!(f.cache.records()[1].height(), 40.0);

        let ph = f.cache.records()[0].placeholder().copied().expect("placeholder");
        assert_eq!(f.dom.attribute(&ph, PLACEHOLDER_ATTRIBUTE), Some("m0".into()));
        assert_eq!(f.dom.children(f.main)[0], ph);
    }

    #[test]
    fn second_pass_writes_nothing() {
        let mut f = fixture(&[30.0; 8]);
        f.resync(Window::new(4, 7));
        let writes = f.dom.write_count();
        let report = f.resync(Window::new(4, 7));
        assert!(report.is_noop());
        assert_eq!(f.dom.write_count(), writes);
        assert_eq!(f.sync.passes(), 1);
    }

    #[test]
    fn reattaches_in_place() {
        let mut f = fixture(&[30.0; 6]);
        f.resync(Window::new(3, 5));
        let report = f.resync(Window::new(1, 5));
        assert_eq!(report.attached, 2);
        let children = f.dom.children(f.main);
        assert_eq!(children[1], f.items[1]);
        assert_eq!(children[2], f.items[2]);
    }

    #[test]
    fn anchor_holds_when_reattached_content_grew() {
        let mut f = fixture(&[50.0; 6]);
        f.resync(Window::new(3, 5));
        // Viewport shows items 3 and 4.
        f.dom.set_scroll_top(&f.main, 150.0);
        // Item 2 grew while detached (e.g. streamed content finished).
        f.dom.set_height(f.items[2], 80.0);

        let report = f.resync(Window::new(2, 5));
        assert_eq!(report.attached, 1);
        assert_eq!(report.anchor_shift, 30.0);
        let offset = f.dom.top(&f.items[3]) - f.dom.top(&f.main);
        assert_eq!(offset, 0.0);
    }

    #[test]
    fn own_writes_are_not_reported_as_page_mutations() {
        let mut f = fixture(&[30.0; 4]);
        let page = f.dom.append_element(f.dom.body(), "aside", &[], 0.0);
        f.resync(Window::new(2, 3));
        assert!(!f.sync.is_in_flight());
        assert!(f.dom.take_mutations().is_empty());
        assert_eq!(f.sync.take_deferred().added, vec![page]);
    }

    #[test]
    fn vanished_placeholder_reinserts_element() {
        let mut f = fixture(&[30.0; 4]);
        f.resync(Window::new(2, 3));
        let ph = f.cache.records()[1].placeholder().copied().expect("placeholder");
        f.dom.remove(&ph);

        let report = f.resync(Window::new(0, 3));
        assert_eq!(report.attached, 1);
        assert_eq!(report.reinserted, 1);
        let children = f.dom.children(f.main);
        assert_eq!(&children[..], &f.items[..]);
    }

    #[test]
    fn restore_all_puts_everything_back() {
        let mut f = fixture(&[30.0; 5]);
        f.resync(Window::new(3, 4));
        let restored = f.sync.restore_all(&f.dom, f.cache.records());
        assert_eq!(restored, 3);
        assert_eq!(f.dom.children(f.main), f.items);
    }
}
