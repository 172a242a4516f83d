#![forbid(unsafe_code)]

//! Scroll trigger integration.
//!
//! Turns raw container metrics into a decision: reveal older history, reveal
//! newer history, or do nothing.
//!
//! # Thresholds
//!
//! Each threshold is `min(configured, client_height / 2)`, so a short
//! container still has a neutral band in the middle. Distances are taken to
//! the edges of the *rendered* region (first and last attached entry), not
//! to the container edges: placeholders above the window are empty space
//! the user should never reach before more history is revealed. With no
//! placeholders, both measurements are the same.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Both triggers hold (container shorter than both thresholds) | [`ScrollZone::Ambiguous`], warning logged, no action |
//! | Scroll event inside the suppression window | ignored |
//! | Scroll event inside the throttle interval | deferred to the next tick |

use core::time::Duration;

use crate::config::VirtualizerConfig;
use crate::host::{HostDom, ScrollMetrics};
use crate::trace;

/// Where the viewport sits relative to the rendered region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollZone {
    NearTop,
    NearBottom,
    Neutral,
    /// Both conditions hold at once; the direction is undecidable.
    Ambiguous,
}

/// Trigger distances after adapting to the container height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub top: f64,
    pub bottom: f64,
}

impl Thresholds {
    #[must_use]
    pub fn adaptive(config: &VirtualizerConfig, client_height: f64) -> Self {
        let half = (client_height / 2.0).max(0.0);
        Self {
            top: config.top_threshold.min(half),
            bottom: config.bottom_threshold.min(half),
        }
    }
}

/// How much rendered content lies beyond each edge of the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeDistances {
    /// Rendered content above the viewport top.
    pub above: f64,
    /// Rendered content below the viewport bottom.
    pub below: f64,
}

impl EdgeDistances {
    /// Distances to the container's own content edges.
    #[must_use]
    pub fn raw(metrics: &ScrollMetrics) -> Self {
        Self {
            above: metrics.scroll_top,
            below: metrics.distance_to_bottom(),
        }
    }

    /// Distances to the top of `first` and the bottom of `last`.
    #[must_use]
    pub fn rendered<D: HostDom>(dom: &D, container: &D::Node, first: &D::Node, last: &D::Node) -> Self {
        let view_top = dom.top(container);
        let view_bottom = view_top + dom.scroll_metrics(container).client_height;
        Self {
            above: view_top - dom.top(first),
            below: dom.top(last) + dom.height(last) - view_bottom,
        }
    }

    #[must_use]
    pub fn classify(&self, thresholds: Thresholds) -> ScrollZone {
        let near_top = self.above < thresholds.top;
        let near_bottom = self.below < thresholds.bottom;
        match (near_top, near_bottom) {
            (true, true) => ScrollZone::Ambiguous,
            (true, false) => ScrollZone::NearTop,
            (false, true) => ScrollZone::NearBottom,
            (false, false) => ScrollZone::Neutral,
        }
    }
}

/// Scroll-button visibility test: within `ratio` of a screen of the end.
#[must_use]
pub fn is_near_bottom(metrics: &ScrollMetrics, ratio: f64) -> bool {
    metrics.scroll_top + metrics.client_height
        >= metrics.scroll_height - metrics.client_height * ratio
}

// ---------------------------------------------------------------------------
// Suppression
// ---------------------------------------------------------------------------

/// A span of time during which scroll events are ours, not the user's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressionWindow {
    pub since: Duration,
    pub duration: Duration,
}

impl SuppressionWindow {
    #[must_use]
    pub const fn new(since: Duration, duration: Duration) -> Self {
        Self { since, duration }
    }

    #[must_use]
    pub fn ends_at(&self) -> Duration {
        self.since.saturating_add(self.duration)
    }

    #[must_use]
    pub fn is_active(&self, now: Duration) -> bool {
        now >= self.since && now < self.ends_at()
    }

    /// Combine two windows, keeping whichever ends later.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        if other.ends_at() > self.ends_at() { other } else { self }
    }
}

/// Owned suppression state, queried by time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Suppression {
    window: Option<SuppressionWindow>,
}

impl Suppression {
    /// Suppress for `duration` from `now`. An already longer window wins.
    pub fn hold(&mut self, now: Duration, duration: Duration) {
        let next = SuppressionWindow::new(now, duration);
        self.window = Some(match self.window {
            Some(current) if current.is_active(now) => current.merge(next),
            _ => next,
        });
        trace!(target: "longchat::scroll", until_ms = next.ends_at().as_millis() as u64, "scroll suppressed");
    }

    /// End suppression now.
    pub fn release(&mut self) {
        self.window = None;
    }

    #[must_use]
    pub fn is_active(&self, now: Duration) -> bool {
        self.window.is_some_and(|w| w.is_active(now))
    }

    #[must_use]
    pub fn window(&self) -> Option<SuppressionWindow> {
        self.window
    }
}

// ---------------------------------------------------------------------------
// Throttle
// ---------------------------------------------------------------------------

/// Leading-edge throttle with a trailing pass.
///
/// The first event in an interval runs immediately; later ones collapse into
/// one pending pass, released by [`ScrollThrottle::take_trailing`] once the
/// interval has elapsed.
#[derive(Debug, Clone)]
pub struct ScrollThrottle {
    interval: Duration,
    last: Option<Duration>,
    pending: bool,
}

impl ScrollThrottle {
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            pending: false,
        }
    }

    fn elapsed(&self, now: Duration) -> bool {
        self.last
            .is_none_or(|last| now.saturating_sub(last) >= self.interval)
    }

    /// Whether an event at `now` should be handled right away.
    pub fn admit(&mut self, now: Duration) -> bool {
        if self.elapsed(now) {
            self.last = Some(now);
            self.pending = false;
            true
        } else {
            self.pending = true;
            false
        }
    }

    /// Whether a deferred event is due at `now`. Consumes it if so.
    pub fn take_trailing(&mut self, now: Duration) -> bool {
        if self.pending && self.elapsed(now) {
            self.pending = false;
            self.last = Some(now);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.pending = false;
    }
}

// ---------------------------------------------------------------------------
// Forced scroll
// ---------------------------------------------------------------------------

/// Outcome of one forced-scroll step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceScrollStep {
    /// Moved closer; step again after the interval.
    Continue,
    /// The last child's bottom is within tolerance of the viewport bottom.
    Settled,
    /// Out of attempts, or nothing to scroll to.
    GaveUp,
}

/// Repeatedly nudges the container until its last child is fully in view.
///
/// Layout keeps shifting for a while after a jump (images, streamed content),
/// so one assignment to `scrollTop` is not enough.
#[derive(Debug, Clone)]
pub struct ForceScroll {
    attempts: u32,
    max_attempts: u32,
    tolerance: f64,
}

impl ForceScroll {
    #[must_use]
    pub fn new(config: &VirtualizerConfig) -> Self {
        Self {
            attempts: 0,
            max_attempts: config.force_scroll_max_attempts,
            tolerance: config.force_scroll_tolerance_px,
        }
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn step<D: HostDom>(&mut self, dom: &D, container: &D::Node) -> ForceScrollStep {
        self.attempts += 1;
        let Some(last) = dom.last_element_child(container) else {
            return ForceScrollStep::GaveUp;
        };
        if self.attempts >= self.max_attempts {
            return ForceScrollStep::GaveUp;
        }
        let view_bottom = dom.top(container) + dom.scroll_metrics(container).client_height;
        let offset = dom.top(&last) + dom.height(&last) - view_bottom;
        trace!(target: "longchat::scroll", attempt = self.attempts, offset, "forced scroll step");
        if offset > self.tolerance {
            let scroll_top = dom.scroll_metrics(container).scroll_top;
            dom.set_scroll_top(container, scroll_top + offset);
            ForceScrollStep::Continue
        } else {
            ForceScrollStep::Settled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem_dom::MemoryDom;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn thresholds_adapt_to_short_containers() {
        let config = VirtualizerConfig::default();
        assert_eq!(
            Thresholds::adaptive(&config, 1000.0),
            Thresholds { top: 300.0, bottom: 300.0 }
        );
        assert_eq!(
            Thresholds::adaptive(&config, 200.0),
            Thresholds { top: 100.0, bottom: 100.0 }
        );
    }

    #[test]
    fn classify_zones() {
        let t = Thresholds { top: 100.0, bottom: 100.0 };
        let zone = |above, below| EdgeDistances { above, below }.classify(t);
        assert_eq!(zone(10.0, 500.0), ScrollZone::NearTop);
        assert_eq!(zone(500.0, 10.0), ScrollZone::NearBottom);
        assert_eq!(zone(500.0, 500.0), ScrollZone::Neutral);
        assert_eq!(zone(10.0, 10.0), ScrollZone::Ambiguous);
        assert_eq!(zone(100.0, 100.0), ScrollZone::Neutral);
    }

    #[test]
    fn raw_distances_match_metrics() {
        let m = ScrollMetrics::new(250.0, 400.0, 1000.0);
        assert_eq!(EdgeDistances::raw(&m), EdgeDistances { above: 250.0, below: 350.0 });
    }

    #[test]
    fn rendered_distances_skip_placeholders() {
        let dom = MemoryDom::new();
        let main = dom.append_element(dom.body(), "main", &[], 0.0);
        dom.make_scrollable(main, 100.0);
        let _spacer = dom.append_element(main, "div", &[], 500.0);
        let first = dom.append_element(main, "article", &[], 100.0);
        let last = dom.append_element(main, "article", &[], 100.0);
        dom.set_scroll_top(&main, 550.0);

        let d = EdgeDistances::rendered(&dom, &main, &first, &last);
        assert_eq!(d, EdgeDistances { above: 50.0, below: 50.0 });
    }

    #[test]
    fn near_bottom_uses_ratio_of_screen() {
        let m = ScrollMetrics::new(550.0, 400.0, 1000.0);
        assert!(is_near_bottom(&m, 0.2));
        assert!(!is_near_bottom(&m, 0.1));
    }

    #[test]
    fn suppression_expires_and_keeps_longest() {
        let mut s = Suppression::default();
        assert!(!s.is_active(ms(0)));
        s.hold(ms(100), ms(1500));
        s.hold(ms(200), ms(50));
        assert!(s.is_active(ms(1599)));
        assert!(!s.is_active(ms(1600)));
        s.hold(ms(2000), ms(50));
        assert_eq!(s.window(), Some(SuppressionWindow::new(ms(2000), ms(50))));
        s.release();
        assert!(!s.is_active(ms(2010)));
    }

    #[test]
    fn throttle_defers_to_trailing_edge() {
        let mut t = ScrollThrottle::new(ms(16));
        assert!(t.admit(ms(0)));
        assert!(!t.admit(ms(5)));
        assert!(!t.admit(ms(10)));
        assert!(t.has_pending());
        assert!(!t.take_trailing(ms(12)));
        assert!(t.take_trailing(ms(16)));
        assert!(!t.take_trailing(ms(40)));
        assert!(t.admit(ms(40)));
    }

    #[test]
    fn force_scroll_settles_on_last_child() {
        let dom = MemoryDom::new();
        let main = dom.append_element(dom.body(), "main", &[], 0.0);
        dom.make_scrollable(main, 100.0);
        for _ in 0..5 {
            dom.append_element(main, "article", &[], 100.0);
        }
        let mut force = ForceScroll::new(&VirtualizerConfig::default());
        assert_eq!(force.step(&dom, &main), ForceScrollStep::Continue);
        assert_eq!(dom.scroll_metrics(&main).scroll_top, 400.0);
        assert_eq!(force.step(&dom, &main), ForceScrollStep::Settled);
    }

    #[test]
    fn force_scroll_gives_up() {
        let dom = MemoryDom::new();
        let main = dom.append_element(dom.body(), "main", &[], 0.0);
        let config = VirtualizerConfig {
            force_scroll_max_attempts: 2,
            ..VirtualizerConfig::default()
        };
        let mut force = ForceScroll::new(&config);
        assert_eq!(force.step(&dom, &main), ForceScrollStep::GaveUp);

        dom.make_scrollable(main, 100.0);
        dom.append_element(main, "article", &[], 1000.0);
        let mut force = ForceScroll::new(&config);
        assert_eq!(force.step(&dom, &main), ForceScrollStep::Continue);
        assert_eq!(force.step(&dom, &main), ForceScrollStep::GaveUp);
    }
}
