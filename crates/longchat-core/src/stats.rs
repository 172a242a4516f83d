#![forbid(unsafe_code)]

//! Observability snapshot.
//!
//! [`Statistics`] merges what the manager knows (how many messages exist and
//! how many are attached) with the container's scroll metrics. Updates report
//! whether anything changed so sinks can skip redundant redraws.

use core::fmt;

use serde::Serialize;

use crate::host::ScrollMetrics;
use crate::trace;

/// Cache and window sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadedStats {
    pub visible_count: usize,
    pub total_count: usize,
}

/// Container scroll position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScrollStats {
    pub scroll_top: f64,
    pub client_height: f64,
    pub scroll_height: f64,
}

impl From<ScrollMetrics> for ScrollStats {
    fn from(m: ScrollMetrics) -> Self {
        Self {
            scroll_top: m.scroll_top,
            client_height: m.client_height,
            scroll_height: m.scroll_height,
        }
    }
}

/// Merged snapshot published to a [`StatsSink`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub turns_visible: usize,
    pub turns_total: usize,
    /// `None` until the first scroll measurement.
    pub scroll_top: Option<f64>,
    pub client_height: Option<f64>,
    pub scroll_height: Option<f64>,
}

fn set<T: PartialEq + fmt::Debug>(slot: &mut T, value: T, name: &'static str) -> bool {
    if *slot == value {
        return false;
    }
    trace!(target: "longchat::stats", field = name, value = ?value, "statistic changed");
    *slot = value;
    true
}

impl Statistics {
    /// Apply cache counts. Returns whether anything changed.
    pub fn apply_loaded(&mut self, loaded: LoadedStats) -> bool {
        let visible = set(&mut self.turns_visible, loaded.visible_count, "turns_visible");
        let total = set(&mut self.turns_total, loaded.total_count, "turns_total");
        visible | total
    }

    /// Apply scroll metrics. Returns whether anything changed.
    pub fn apply_scroll(&mut self, scroll: ScrollStats) -> bool {
        let top = set(&mut self.scroll_top, Some(scroll.scroll_top), "scroll_top");
        let client = set(&mut self.client_height, Some(scroll.client_height), "client_height");
        let height = set(&mut self.scroll_height, Some(scroll.scroll_height), "scroll_height");
        top | client | height
    }

    /// Apply both halves. Returns whether anything changed.
    pub fn update(&mut self, loaded: LoadedStats, scroll: Option<ScrollStats>) -> bool {
        let loaded_changed = self.apply_loaded(loaded);
        let scroll_changed = scroll.is_some_and(|s| self.apply_scroll(s));
        loaded_changed | scroll_changed
    }

    /// JSON rendering for host tooling.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

fn write_metric(f: &mut fmt::Formatter<'_>, name: &str, value: Option<f64>) -> fmt::Result {
    match value {
        Some(v) => write!(f, "\n{name}: {v:.0}"),
        None => write!(f, "\n{name}: null"),
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.turns_total == 0 {
            return f.write_str("Waiting for messages...");
        }
        write!(f, "Messages: {} / {}", self.turns_visible, self.turns_total)?;
        write!(f, "\nturns_visible: {}", self.turns_visible)?;
        write!(f, "\nturns_total: {}", self.turns_total)?;
        write_metric(f, "scroll_top", self.scroll_top)?;
        write_metric(f, "client_height", self.client_height)?;
        write_metric(f, "scroll_height", self.scroll_height)
    }
}

/// Receiver of statistics snapshots (the debug overlay in a browser).
pub trait StatsSink {
    fn publish(&mut self, stats: &Statistics);

    /// Flip visibility, for sinks that render something.
    fn toggle(&mut self) {}
}

/// Sink that drops every snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl StatsSink for NullSink {
    fn publish(&mut self, _stats: &Statistics) {}
}

/// Sink that keeps every snapshot, for tests and headless tools.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub published: Vec<Statistics>,
}

impl StatsSink for RecordingSink {
    fn publish(&mut self, stats: &Statistics) {
        self.published.push(stats.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn update_reports_changes_only() {
        let mut stats = Statistics::default();
        let loaded = LoadedStats {
            visible_count: 10,
            total_count: 50,
        };
        assert!(stats.update(loaded, None));
        assert!(!stats.update(loaded, None));

        let scroll = ScrollStats {
            scroll_top: 120.0,
            client_height: 400.0,
            scroll_height: 2000.0,
        };
        assert!(stats.update(loaded, Some(scroll)));
        assert!(!stats.update(loaded, Some(scroll)));
        assert!(stats.apply_scroll(ScrollStats {
            scroll_top: 121.0,
            ..scroll
        }));
    }

    #[test]
    fn renders_overlay_text() {
        let mut stats = Statistics::default();
        assert_eq!(stats.to_string(), "Waiting for messages...");

        stats.apply_loaded(LoadedStats {
            visible_count: 10,
            total_count: 50,
        });
        assert_eq!(
            stats.to_string(),
            "Messages: 10 / 50\nturns_visible: 10\nturns_total: 50\n\
             scroll_top: null\nclient_height: null\nscroll_height: null"
        );

        stats.apply_scroll(ScrollStats {
            scroll_top: 12.4,
            client_height: 400.0,
            scroll_height: 2000.0,
        });
        assert!(stats.to_string().ends_with("scroll_top: 12\nclient_height: 400\nscroll_height: 2000"));
    }

    #[test]
    fn serializes_to_json() {
        let stats = Statistics {
            turns_visible: 2,
            turns_total: 3,
            scroll_top: Some(1.5),
            client_height: None,
            scroll_height: None,
        };
        assert_eq!(
            stats.to_json(),
            r#"{"turns_visible":2,"turns_total":3,"scroll_top":1.5,"client_height":null,"scroll_height":null}"#
        );
    }

    #[test]
    fn recording_sink_keeps_snapshots() {
        let mut sink = RecordingSink::default();
        sink.publish(&Statistics::default());
        sink.toggle();
        assert_eq!(sink.published.len(), 1);
    }
}
