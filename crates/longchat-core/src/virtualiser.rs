#![forbid(unsafe_code)]

//! Top-level orchestrator.
//!
//! [`Virtualiser`] is what a host embeds. It waits for the transcript
//! container, builds a [`VirtualChatManager`] around it, routes scroll and
//! mutation events to it, drives every timer from the host's tick, and starts
//! over when the page navigates to another conversation.
//!
//! # Lifecycle
//!
//! ```text
//! new -> start -> (tick | on_scroll | on_mutations | jump_to_bottom)* -> dispose
//!                   ^                                   |
//!                   +------ reset (URL changed) --------+
//! ```
//!
//! A reset drops the manager without restoring anything: the page is about
//! to replace the transcript, and stale placeholders are swept by the next
//! rebuild. Disposal, on the other hand, puts every detached element back.

use core::time::Duration;

use crate::config::VirtualizerConfig;
use crate::discovery::{ContainerDiscovery, DiscoveryState};
use crate::error::VirtualizerError;
use crate::host::{HostDom, MutationBatch};
use crate::lifecycle::Lifecycle;
use crate::manager::{IngestOutcome, ScrollOutcome, VirtualChatManager};
use crate::scroll::{ForceScroll, ForceScrollStep};
use crate::stats::{NullSink, Statistics, StatsSink};
use crate::timers::TimerQueue;
use crate::{debug, error, info};

/// Shortest delay for a repeating timer, so a zero interval cannot spin.
const MIN_REPEAT: Duration = Duration::from_millis(1);

/// What a scheduled timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    DiscoveryRetry,
    ForceScroll,
    UrlPoll,
}

/// Host-facing engine: discovery, timers, navigation, stats.
pub struct Virtualiser<D: HostDom + Clone, S: StatsSink = NullSink> {
    dom: D,
    config: VirtualizerConfig,
    sink: S,
    discovery: ContainerDiscovery,
    manager: Option<VirtualChatManager<D>>,
    timers: TimerQueue<TimerKind>,
    lifecycle: Lifecycle,
    stats: Statistics,
    href: String,
    force: Option<ForceScroll>,
    now: Duration,
    started: bool,
    disposed: bool,
    resets: u64,
}

impl<D: HostDom + Clone> Virtualiser<D, NullSink> {
    /// Create a virtualiser that publishes statistics nowhere.
    ///
    /// # Errors
    ///
    /// See [`Virtualiser::with_sink`].
    pub fn new(dom: D, config: VirtualizerConfig) -> Result<Self, VirtualizerError> {
        Self::with_sink(dom, config, NullSink)
    }
}

impl<D: HostDom + Clone, S: StatsSink> Virtualiser<D, S> {
    /// Create a virtualiser publishing statistics to `sink`.
    ///
    /// # Errors
    ///
    /// Fails if the configuration does not validate or the document has no
    /// `<body>`.
    pub fn with_sink(dom: D, config: VirtualizerConfig, sink: S) -> Result<Self, VirtualizerError> {
        config.validate()?;
        if dom.query("body").is_none() {
            return Err(VirtualizerError::MissingCollaborator("document body"));
        }
        let href = dom.location_href();
        let discovery = ContainerDiscovery::new(config.discovery_max_attempts);
        Ok(Self {
            dom,
            config,
            sink,
            discovery,
            manager: None,
            timers: TimerQueue::new(),
            lifecycle: Lifecycle::new(),
            stats: Statistics::default(),
            href,
            force: None,
            now: Duration::ZERO,
            started: false,
            disposed: false,
            resets: 0,
        })
    }

    // -- accessors ----------------------------------------------------------

    #[must_use]
    pub fn manager(&self) -> Option<&VirtualChatManager<D>> {
        self.manager.as_ref()
    }

    pub fn manager_mut(&mut self) -> Option<&mut VirtualChatManager<D>> {
        self.manager.as_mut()
    }

    #[must_use]
    pub fn config(&self) -> &VirtualizerConfig {
        &self.config
    }

    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    #[must_use]
    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Teardown registry; hosts put listener removal and UI cleanup here.
    pub fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Earliest time the host must call [`Virtualiser::tick`] by.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Navigation resets performed so far.
    #[must_use]
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Whether a forced scroll is in progress.
    #[must_use]
    pub fn is_force_scrolling(&self) -> bool {
        self.force.is_some()
    }

    /// Whether a jump-to-bottom button should be shown.
    #[must_use]
    pub fn scroll_button_visible(&self) -> bool {
        self.manager.as_ref().is_some_and(|m| !m.is_near_bottom())
    }

    // -- driving ------------------------------------------------------------

    fn schedule(&mut self, delay: Duration, kind: TimerKind) {
        self.timers.schedule(self.now, delay.max(MIN_REPEAT), kind);
    }

    /// Begin looking for the container and polling the URL.
    pub fn start(&mut self, now: Duration) {
        if self.started || self.disposed {
            return;
        }
        self.started = true;
        self.now = now;
        info!(target: "longchat::virtualiser", href = %self.href, "starting");
        self.schedule(self.config.url_poll(), TimerKind::UrlPoll);
        self.try_discover();
    }

    fn try_discover(&mut self) {
        if self.manager.is_some() {
            return;
        }
        match self.discovery.poll(&self.dom, &self.config) {
            Some(container) => self.attach(container),
            None if self.discovery.should_retry() => {
                if !self.timers.is_scheduled(&TimerKind::DiscoveryRetry) {
                    self.schedule(self.config.discovery_backoff(), TimerKind::DiscoveryRetry);
                }
            }
            None => {}
        }
    }

    fn attach(&mut self, container: D::Node) {
        self.timers.cancel_kind(&TimerKind::DiscoveryRetry);
        match VirtualChatManager::new(self.dom.clone(), self.config.clone(), container) {
            Ok(mut manager) => {
                manager.advance(self.now);
                manager.run_pipeline(true);
                info!(
                    target: "longchat::virtualiser",
                    messages = manager.loaded_stats().total_count,
                    "virtualiser attached"
                );
                self.manager = Some(manager);
                self.publish_stats();
            }
            Err(err) => error!(target: "longchat::virtualiser", %err, "cannot start manager"),
        }
    }

    /// Fire due timers and run periodic work.
    pub fn tick(&mut self, now: Duration) {
        if self.disposed {
            return;
        }
        self.now = self.now.max(now);
        while let Some(kind) = self.timers.pop_due(self.now) {
            match kind {
                TimerKind::DiscoveryRetry => self.try_discover(),
                TimerKind::ForceScroll => self.step_force_scroll(),
                TimerKind::UrlPoll => {
                    self.check_url(self.now);
                    self.schedule(self.config.url_poll(), TimerKind::UrlPoll);
                }
            }
        }
        if let Some(manager) = self.manager.as_mut() {
            manager.tick(self.now);
        }
        self.publish_stats();
    }

    /// Route a scroll event on the container.
    pub fn on_scroll(&mut self, now: Duration) -> ScrollOutcome {
        if self.disposed {
            return ScrollOutcome::Detached;
        }
        self.now = self.now.max(now);
        let outcome = match self.manager.as_mut() {
            Some(manager) => manager.handle_scroll(self.now),
            None => ScrollOutcome::Detached,
        };
        self.publish_stats();
        outcome
    }

    /// Route a batch of mutation records.
    ///
    /// While still searching for the container, any page mutation is a cue
    /// to look again without waiting for the backoff.
    pub fn on_mutations(&mut self, now: Duration, batch: MutationBatch<D::Node>) -> IngestOutcome {
        if self.disposed {
            return IngestOutcome::Ignored;
        }
        self.now = self.now.max(now);
        let Some(manager) = self.manager.as_mut() else {
            if self.started && self.discovery.should_retry() {
                self.try_discover();
            }
            return IngestOutcome::Ignored;
        };
        let outcome = manager.ingest(self.now, batch);
        self.publish_stats();
        outcome
    }

    /// Reset if the page URL changed. Returns whether it did.
    pub fn check_url(&mut self, now: Duration) -> bool {
        if self.disposed {
            return false;
        }
        let href = self.dom.location_href();
        if href == self.href {
            return false;
        }
        info!(target: "longchat::virtualiser", from = %self.href, to = %href, "navigation detected");
        self.href = href;
        self.reset(now);
        true
    }

    /// Drop the manager and search for the container again.
    pub fn reset(&mut self, now: Duration) {
        if self.disposed {
            return;
        }
        self.now = self.now.max(now);
        self.manager = None;
        self.force = None;
        self.timers.cancel_kind(&TimerKind::DiscoveryRetry);
        self.timers.cancel_kind(&TimerKind::ForceScroll);
        self.discovery.reset();
        self.stats = Statistics::default();
        self.resets += 1;
        debug!(target: "longchat::virtualiser", resets = self.resets, "reset");
        self.sink.publish(&self.stats);
        if self.started {
            self.try_discover();
        }
    }

    /// Show the newest messages and keep nudging the viewport until the last
    /// one is fully in view. Returns whether there was anything to jump in.
    pub fn jump_to_bottom(&mut self, now: Duration) -> bool {
        if self.disposed {
            return false;
        }
        self.now = self.now.max(now);
        let Some(manager) = self.manager.as_mut() else {
            return false;
        };
        manager.jump_to_bottom(self.now);
        self.force = Some(ForceScroll::new(&self.config));
        self.timers.cancel_kind(&TimerKind::ForceScroll);
        self.schedule(self.config.force_scroll_interval(), TimerKind::ForceScroll);
        self.publish_stats();
        true
    }

    fn step_force_scroll(&mut self) {
        if self.manager.is_none() {
            self.force = None;
        }
        let (Some(manager), Some(force)) = (self.manager.as_mut(), self.force.as_mut()) else {
            return;
        };
        match manager.force_scroll_step(force) {
            ForceScrollStep::Continue => {
                self.schedule(self.config.force_scroll_interval(), TimerKind::ForceScroll);
            }
            step => {
                debug!(target: "longchat::virtualiser", ?step, attempts = force.attempts(), "forced scroll finished");
                self.force = None;
            }
        }
    }

    /// Publish the current snapshot and flip the sink's visibility.
    pub fn toggle_overlay(&mut self) {
        self.publish_stats();
        self.sink.publish(&self.stats);
        self.sink.toggle();
    }

    fn publish_stats(&mut self) {
        let Some(manager) = self.manager.as_ref() else {
            return;
        };
        if self.stats.update(manager.loaded_stats(), manager.scroll_stats()) {
            self.sink.publish(&self.stats);
        }
    }

    /// Cancel every timer, restore the page, and run registered teardown.
    /// Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.timers.clear();
        self.force = None;
        let restored = self.manager.take().map_or(0, |mut m| m.dispose());
        let cleaned = self.lifecycle.cleanup_all();
        info!(target: "longchat::virtualiser", restored, cleaned, "disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem_dom::{MemoryDom, NodeId};
    use crate::stats::RecordingSink;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn config() -> VirtualizerConfig {
        VirtualizerConfig::default().with_window_size(5).with_window_step(2)
    }

    fn conversation(dom: &MemoryDom, n: usize) -> NodeId {
        let main = dom.append_element(dom.body(), "main", &[], 0.0);
        dom.make_scrollable(main, 300.0);
        for i in 0..n {
            let id = format!("conversation-turn-{i}");
            dom.append_element(main, "article", &[("data-testid", id.as_str())], 100.0);
        }
        dom.clear_mutations();
        main
    }

    #[test]
    fn attaches_once_container_appears() {
        let dom = MemoryDom::new();
        let mut v = Virtualiser::with_sink(dom.clone(), config(), RecordingSink::default()).expect("virtualiser");
        v.start(ms(0));
        assert!(v.manager().is_none());
        assert_eq!(v.discovery_state(), DiscoveryState::Searching);

        conversation(&dom, 8);
        v.tick(ms(499));
        assert!(v.manager().is_none());
        v.tick(ms(500));
        assert_eq!(v.discovery_state(), DiscoveryState::Found);
        assert_eq!(v.statistics().turns_total, 8);
        assert_eq!(v.statistics().turns_visible, 5);
        assert!(!v.sink().published.is_empty());
    }

    #[test]
    fn mutations_while_searching_retry_immediately() {
        let dom = MemoryDom::new();
        let mut v = Virtualiser::new(dom.clone(), config()).expect("virtualiser");
        v.start(ms(0));
        conversation(&dom, 3);
        v.on_mutations(ms(10), MutationBatch::default());
        assert!(v.manager().is_some());
    }

    #[test]
    fn url_change_resets() {
        let dom = MemoryDom::new();
        conversation(&dom, 8);
        let mut v = Virtualiser::new(dom.clone(), config()).expect("virtualiser");
        v.start(ms(0));
        assert!(v.manager().is_some());

        dom.set_location("https://chat.example/c/other");
        v.tick(ms(1000));
        assert_eq!(v.resets(), 1);
        assert!(v.manager().is_some());
        assert!(!v.check_url(ms(1001)));
    }

    #[test]
    fn jump_to_bottom_drives_force_scroll_timers() {
        let dom = MemoryDom::new();
        let main = conversation(&dom, 8);
        let mut v = Virtualiser::new(dom.clone(), config()).expect("virtualiser");
        v.start(ms(0));
        dom.set_scroll_top(&main, 0.0);

        assert!(v.jump_to_bottom(ms(10)));
        assert!(v.is_force_scrolling());
        v.tick(ms(110));
        v.tick(ms(210));
        assert!(!v.is_force_scrolling());
        let m = dom.scroll_metrics(&main);
        assert_eq!(m.distance_to_bottom(), 0.0);
        assert!(!v.scroll_button_visible());
    }

    #[test]
    fn dispose_cancels_timers_and_restores() {
        let dom = MemoryDom::new();
        let main = conversation(&dom, 8);
        let mut v = Virtualiser::new(dom.clone(), config()).expect("virtualiser");
        v.start(ms(0));
        let flag = std::rc::Rc::new(std::cell::Cell::new(false));
        let seen = std::rc::Rc::clone(&flag);
        v.lifecycle_mut().register("listener", move || seen.set(true));

        v.dispose();
        assert!(flag.get());
        assert_eq!(v.pending_timers(), 0);
        assert_eq!(dom.children(main).len(), 8);
        assert!(dom.query_all(&main, "[data-longchat-placeholder]").is_empty());
        v.tick(ms(5000));
        assert!(v.manager().is_none());
    }

    #[test]
    fn requires_a_body() {
        let dom = MemoryDom::new();
        dom.remove(&dom.body());
        let err = Virtualiser::new(dom, config()).err();
        assert_eq!(err, Some(VirtualizerError::MissingCollaborator("document body")));
    }
}
