#![forbid(unsafe_code)]

//! The virtual chat manager.
//!
//! Owns the container reference, the [`MessageCache`], the [`WindowTracker`]
//! and the [`DomSynchronizer`], and composes them into the pipeline
//!
//! ```text
//! rebuild_cache (or append) -> update_window -> resync_dom
//! ```
//!
//! which every trigger (scroll, mutation batch, jump to bottom) runs at most
//! once. Each step is also public so hosts can drive it by hand.
//!
//! # Invariants
//!
//! - `0 <= start <= end < cache.size()` whenever the cache is non-empty.
//! - Only this type mutates the cache, window, or container reference.
//! - Nothing here fails at runtime: a missing container, an id-less element,
//!   or an ambiguous scroll position all degrade to "do nothing this tick".

use core::time::Duration;

use crate::cache::MessageCache;
use crate::config::VirtualizerConfig;
use crate::discovery::locate_container;
use crate::error::VirtualizerError;
use crate::host::{HostDom, MutationBatch};
use crate::ingest::{self, RebuildReason};
use crate::scroll::{
    EdgeDistances, ForceScroll, ForceScrollStep, ScrollThrottle, ScrollZone, Suppression, Thresholds,
    is_near_bottom,
};
use crate::stats::{LoadedStats, ScrollStats};
use crate::sync::{DomSynchronizer, SyncReport};
use crate::window::{Window, WindowTracker};
use crate::{debug, info, warn};

/// How often each pipeline step has run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineCounters {
    pub rebuilds: u64,
    pub window_updates: u64,
    pub resyncs: u64,
}

/// Result of one scroll event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollOutcome {
    /// No container yet.
    Detached,
    /// Inside the auto-scroll suppression window.
    Suppressed,
    /// Inside the throttle interval; handled on a later tick.
    Deferred,
    Neutral,
    /// Both triggers held; nothing done.
    Ambiguous,
    /// Near an edge the window already reaches.
    AtEdge(ScrollZone),
    /// The window grew toward this zone and the page was resynced.
    Extended(ScrollZone),
}

impl ScrollOutcome {
    #[must_use]
    pub fn changed(&self) -> bool {
        matches!(self, Self::Extended(_))
    }
}

/// Result of one mutation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Ignored,
    /// This many trailing messages were appended.
    Appended(usize),
    Rebuilt(RebuildReason),
}

impl IngestOutcome {
    #[must_use]
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

/// Virtual windowing engine for one conversation.
#[derive(Debug)]
pub struct VirtualChatManager<D: HostDom> {
    dom: D,
    config: VirtualizerConfig,
    container: Option<D::Node>,
    cache: MessageCache<D::Node>,
    window: WindowTracker,
    sync: DomSynchronizer<D::Node>,
    suppression: Suppression,
    throttle: ScrollThrottle,
    now: Duration,
    counters: PipelineCounters,
}

impl<D: HostDom> VirtualChatManager<D> {
    /// Create a manager bound to `container`.
    ///
    /// # Errors
    ///
    /// Fails if the configuration does not validate or `container` is not
    /// part of the document.
    pub fn new(dom: D, config: VirtualizerConfig, container: D::Node) -> Result<Self, VirtualizerError> {
        config.validate()?;
        if !dom.is_connected(&container) {
            return Err(VirtualizerError::MissingCollaborator("conversation container"));
        }
        let window = WindowTracker::new(config.window_size, config.window_step);
        let throttle = ScrollThrottle::new(config.scroll_throttle());
        Ok(Self {
            dom,
            config,
            container: Some(container),
            cache: MessageCache::new(),
            window,
            sync: DomSynchronizer::new(),
            suppression: Suppression::default(),
            throttle,
            now: Duration::ZERO,
            counters: PipelineCounters::default(),
        })
    }

    // -- accessors ----------------------------------------------------------

    #[must_use]
    pub fn container(&self) -> Option<&D::Node> {
        self.container.as_ref()
    }

    #[must_use]
    pub fn dom(&self) -> &D {
        &self.dom
    }

    #[must_use]
    pub fn config(&self) -> &VirtualizerConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &MessageCache<D::Node> {
        &self.cache
    }

    #[must_use]
    pub fn window(&self) -> Option<Window> {
        self.window.window()
    }

    #[must_use]
    pub fn counters(&self) -> PipelineCounters {
        self.counters
    }

    #[must_use]
    pub fn is_suppressed(&self, now: Duration) -> bool {
        self.suppression.is_active(now)
    }

    #[must_use]
    pub fn loaded_stats(&self) -> LoadedStats {
        LoadedStats {
            visible_count: self.window.visible_count(),
            total_count: self.cache.size(),
        }
    }

    #[must_use]
    pub fn scroll_stats(&self) -> Option<ScrollStats> {
        self.container
            .as_ref()
            .map(|c| ScrollStats::from(self.dom.scroll_metrics(c)))
    }

    /// Whether the viewport is close enough to the end that a jump-to-bottom
    /// affordance is pointless.
    #[must_use]
    pub fn is_near_bottom(&self) -> bool {
        self.container.as_ref().is_none_or(|c| {
            is_near_bottom(&self.dom.scroll_metrics(c), self.config.dynamic_bottom_ratio)
        })
    }

    /// Move the engine clock forward. Earlier times are ignored.
    pub fn advance(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }

    // -- pipeline steps -----------------------------------------------------

    fn relocate_if_detached(&mut self) {
        if self.container.as_ref().is_some_and(|c| self.dom.is_connected(c)) {
            return;
        }
        let found = locate_container(&self.dom, &self.config);
        if found.is_some() {
            info!(target: "longchat::virtualiser", "container replaced by the page; following it");
        }
        self.container = found;
    }

    /// Rescan the container and replace the cache. Returns the new size.
    ///
    /// The window is refitted to the new size straight away, so it never
    /// points past the end of the cache between pipeline steps.
    pub fn rebuild_cache(&mut self) -> usize {
        self.relocate_if_detached();
        let Some(container) = self.container.clone() else {
            return 0;
        };
        self.counters.rebuilds += 1;
        let size = self.cache.rebuild(&self.dom, &container, &self.config, self.now);
        self.window.reclamp(size);
        size
    }

    fn fit_window_if_stale(&mut self) {
        let size = self.cache.size();
        if self.window.count() != size {
            self.window.reclamp(size);
        }
    }

    /// Fit the window to the current cache size.
    pub fn update_window(&mut self) {
        self.counters.window_updates += 1;
        self.window.reclamp(self.cache.size());
    }

    /// Reconcile the page with the window, against `container` or the
    /// manager's own container.
    pub fn resync_dom(&mut self, container: Option<&D::Node>) -> SyncReport {
        let Some(container) = container.or(self.container.as_ref()).cloned() else {
            return SyncReport::default();
        };
        self.counters.resyncs += 1;
        let report = self
            .sync
            .resync(&self.dom, self.cache.records_mut(), self.window.window(), &container);
        if report.anchor_shift != 0.0 {
            self.suppression.hold(self.now, self.config.auto_scroll_suppress());
        }
        report
    }

    /// `rebuild_cache` (when asked) then `update_window` then `resync_dom`.
    pub fn run_pipeline(&mut self, rebuild: bool) -> SyncReport {
        if rebuild {
            self.rebuild_cache();
        }
        self.update_window();
        self.resync_dom(None)
    }

    /// Append one trailing element. Returns whether the cache grew.
    pub fn add_new_node(&mut self, element: &D::Node) -> bool {
        self.cache.append(&self.dom, element, &self.config, self.now)
    }

    /// Reveal older history. Returns whether the window changed.
    pub fn scroll_window_up(&mut self) -> bool {
        let before = self.window.window();
        self.fit_window_if_stale();
        self.window.extend_backward() || self.window.window() != before
    }

    /// Reveal newer history. Returns whether the window changed.
    pub fn scroll_window_down(&mut self) -> bool {
        let before = self.window.window();
        self.fit_window_if_stale();
        self.window.extend_forward() || self.window.window() != before
    }

    /// Jump the window to the newest messages. Returns whether it changed.
    pub fn scroll_window_to_bottom(&mut self) -> bool {
        let before = self.window.window();
        self.window.reclamp(self.cache.size());
        self.window.slide_to_bottom();
        self.window.window() != before
    }

    // -- triggers -----------------------------------------------------------

    /// Handle a scroll event on the container.
    pub fn handle_scroll(&mut self, now: Duration) -> ScrollOutcome {
        self.advance(now);
        if self.container.is_none() {
            return ScrollOutcome::Detached;
        }
        if self.suppression.is_active(now) {
            return ScrollOutcome::Suppressed;
        }
        if !self.throttle.admit(now) {
            return ScrollOutcome::Deferred;
        }
        self.evaluate_scroll()
    }

    /// Periodic work: deferred mutation records and trailing scroll events.
    /// Returns whether anything changed.
    pub fn tick(&mut self, now: Duration) -> bool {
        self.advance(now);
        let mut changed = self.ingest(now, MutationBatch::default()).changed();
        if self.throttle.take_trailing(now) && !self.suppression.is_active(now) {
            changed |= self.evaluate_scroll().changed();
        }
        changed
    }

    fn rendered_edges(&self, container: &D::Node) -> EdgeDistances {
        let records = self.cache.records();
        let edges = self.window.window().and_then(|w| {
            let first = records.get(w.start)?.current_node(&self.dom)?;
            let last = records.get(w.end)?.current_node(&self.dom)?;
            Some(EdgeDistances::rendered(&self.dom, container, first, last))
        });
        edges.unwrap_or_else(|| EdgeDistances::raw(&self.dom.scroll_metrics(container)))
    }

    fn revealed_height(&self, from: usize, to: usize) -> f64 {
        self.cache
            .records()
            .get(from..to)
            .map_or(0.0, |slice| slice.iter().map(|r| r.height()).sum::<f64>())
    }

    fn evaluate_scroll(&mut self) -> ScrollOutcome {
        let Some(container) = self.container.clone() else {
            return ScrollOutcome::Detached;
        };
        let metrics = self.dom.scroll_metrics(&container);
        let thresholds = Thresholds::adaptive(&self.config, metrics.client_height);
        let distances = self.rendered_edges(&container);
        let zone = distances.classify(thresholds);

        let mut moved = false;
        match zone {
            ScrollZone::Neutral => return ScrollOutcome::Neutral,
            ScrollZone::Ambiguous => {
                warn!(
                    target: "longchat::scroll",
                    above = distances.above,
                    below = distances.below,
                    client_height = metrics.client_height,
                    "both scroll triggers active; adjust thresholds or window size"
                );
                return ScrollOutcome::Ambiguous;
            }
            ScrollZone::NearTop => {
                let mut above = distances.above;
                while above < thresholds.top {
                    let Some(before) = self.window.window() else { break };
                    if !self.scroll_window_up() {
                        break;
                    }
                    moved = true;
                    let start = self.window.window().map_or(before.start, |w| w.start);
                    above += self.revealed_height(start, before.start);
                }
            }
            ScrollZone::NearBottom => {
                let mut below = distances.below;
                while below < thresholds.bottom {
                    let Some(before) = self.window.window() else { break };
                    if !self.scroll_window_down() {
                        break;
                    }
                    moved = true;
                    let end = self.window.window().map_or(before.end, |w| w.end);
                    below += self.revealed_height(before.end + 1, end + 1);
                }
            }
        }

        if !moved {
            return ScrollOutcome::AtEdge(zone);
        }
        debug!(target: "longchat::scroll", ?zone, window = ?self.window.window(), "window extended");
        self.resync_dom(None);
        self.suppression.hold(self.now, self.config.auto_scroll_suppress());
        ScrollOutcome::Extended(zone)
    }

    /// Handle one batch of mutation records, plus any records deferred by
    /// the last resync. Runs the pipeline at most once.
    pub fn ingest(&mut self, now: Duration, batch: MutationBatch<D::Node>) -> IngestOutcome {
        self.advance(now);
        let mut all = self.sync.take_deferred();
        all.extend(batch);
        if all.is_empty() {
            return IngestOutcome::Ignored;
        }
        let Some(container) = self.container.clone() else {
            return IngestOutcome::Ignored;
        };

        let plan = ingest::plan(&self.dom, &self.cache, &container, &self.config, &all);
        if let Some(reason) = plan.rebuild {
            debug!(target: "longchat::ingest", %reason, "mutation batch needs a rebuild");
            self.run_pipeline(true);
            return IngestOutcome::Rebuilt(reason);
        }
        let appended = plan
            .appends
            .iter()
            .filter(|element| self.add_new_node(element))
            .count();
        if appended == 0 {
            return IngestOutcome::Ignored;
        }
        debug!(target: "longchat::ingest", appended, "new messages appended");
        self.run_pipeline(false);
        IngestOutcome::Appended(appended)
    }

    /// Rebuild, slide the window to the newest messages, and resync.
    /// Scroll events are suppressed for `jump_suppress_ms`.
    pub fn jump_to_bottom(&mut self, now: Duration) -> SyncReport {
        self.advance(now);
        self.suppression.hold(now, self.config.jump_suppress());
        self.rebuild_cache();
        self.update_window();
        self.scroll_window_to_bottom();
        self.resync_dom(None)
    }

    /// One step of a forced scroll to the last child.
    pub fn force_scroll_step(&mut self, force: &mut ForceScroll) -> ForceScrollStep {
        let Some(container) = self.container.clone() else {
            return ForceScrollStep::GaveUp;
        };
        self.suppression.hold(self.now, self.config.auto_scroll_suppress());
        force.step(&self.dom, &container)
    }

    /// Put every detached element back and forget all state. Returns how many
    /// elements were restored.
    pub fn dispose(&mut self) -> usize {
        let restored = self.sync.restore_all(&self.dom, self.cache.records());
        self.cache = MessageCache::new();
        self.window = WindowTracker::new(self.config.window_size, self.config.window_step);
        self.container = None;
        self.suppression.release();
        self.throttle.reset();
        debug!(target: "longchat::virtualiser", restored, "manager disposed");
        restored
    }
}
