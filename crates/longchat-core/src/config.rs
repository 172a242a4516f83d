#![forbid(unsafe_code)]

//! Engine configuration.
//!
//! Durations are carried as integer milliseconds so the whole struct can be
//! handed over from the host as JSON (see [`VirtualizerConfig::from_json`]).
//! Missing fields fall back to [`Default`].

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

/// Attribute written onto placeholders; its value is the record id.
pub const PLACEHOLDER_ATTRIBUTE: &str = "data-longchat-placeholder";

/// CSS selectors used to find things on the host page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    /// Matches one chat message (a conversation turn).
    pub message: String,
    /// Fallback container lookup when no message exists yet.
    pub container: String,
    /// The page's native scroll-to-bottom button.
    pub scroll_button: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            message: r#"article[data-testid^="conversation-turn"]"#.to_string(),
            container: "main".to_string(),
            scroll_button: r#"button[data-testid="scroll-down-button"]"#.to_string(),
        }
    }
}

/// Configuration for the virtual windowing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualizerConfig {
    /// Minimum number of messages kept attached.
    pub window_size: usize,

    /// How many messages one window extension reveals.
    pub window_step: usize,

    /// Distance (px) from the rendered top that counts as "near the top".
    /// Capped at half the viewport height.
    pub top_threshold: f64,

    /// Distance (px) from the rendered bottom that counts as "near the bottom".
    /// Capped at half the viewport height.
    pub bottom_threshold: f64,

    /// Fraction of the viewport height used by the scroll button's
    /// near-bottom test.
    pub dynamic_bottom_ratio: f64,

    /// Scroll events are ignored for this long after the engine itself moved
    /// the window (ms).
    pub auto_scroll_suppress_ms: u64,

    /// Suppression held after an explicit jump to the bottom (ms).
    pub jump_suppress_ms: u64,

    /// Minimum spacing between handled scroll events (ms). Events inside the
    /// interval are deferred to the next tick.
    pub scroll_throttle_ms: u64,

    /// Fixed backoff between container discovery attempts (ms).
    pub discovery_backoff_ms: u64,

    /// Give up discovery after this many attempts. `0` retries forever.
    pub discovery_max_attempts: u32,

    /// Interval between forced scroll-to-bottom steps (ms).
    pub force_scroll_interval_ms: u64,

    /// Maximum forced scroll steps before giving up.
    pub force_scroll_max_attempts: u32,

    /// Forced scrolling stops once the last child is within this many px of
    /// the container's bottom edge.
    pub force_scroll_tolerance_px: f64,

    /// How often the current URL is compared against the last seen one (ms).
    pub url_poll_ms: u64,

    /// Host-provided stable id attribute.
    pub id_attribute: String,

    /// Attribute synthesized ids are persisted in.
    pub fallback_id_attribute: String,

    /// Host page selectors.
    pub selectors: Selectors,

    /// Enables console logging and the debug overlay in the web binding.
    pub debug: bool,
}

impl Default for VirtualizerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            window_step: 5,
            top_threshold: 300.0,
            bottom_threshold: 300.0,
            dynamic_bottom_ratio: 0.1,
            auto_scroll_suppress_ms: 50,
            jump_suppress_ms: 1500,
            scroll_throttle_ms: 16,
            discovery_backoff_ms: 500,
            discovery_max_attempts: 240,
            force_scroll_interval_ms: 100,
            force_scroll_max_attempts: 10,
            force_scroll_tolerance_px: 5.0,
            url_poll_ms: 1000,
            id_attribute: "data-testid".to_string(),
            fallback_id_attribute: "data-longchat-id".to_string(),
            selectors: Selectors::default(),
            debug: false,
        }
    }
}

impl VirtualizerConfig {
    /// Parse a (possibly partial) JSON object and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the minimum window size.
    #[must_use]
    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    /// Set the window growth step.
    #[must_use]
    pub fn with_window_step(mut self, step: usize) -> Self {
        self.window_step = step;
        self
    }

    /// Set both scroll thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, top: f64, bottom: f64) -> Self {
        self.top_threshold = top;
        self.bottom_threshold = bottom;
        self
    }

    /// Set the message selector.
    #[must_use]
    pub fn with_message_selector(mut self, selector: impl Into<String>) -> Self {
        self.selectors.message = selector.into();
        self
    }

    /// Set the fallback container selector.
    #[must_use]
    pub fn with_container_selector(mut self, selector: impl Into<String>) -> Self {
        self.selectors.container = selector.into();
        self
    }

    /// Set the scroll throttle interval.
    #[must_use]
    pub fn with_scroll_throttle_ms(mut self, ms: u64) -> Self {
        self.scroll_throttle_ms = ms;
        self
    }

    /// Set the discovery attempt bound (`0` = unbounded).
    #[must_use]
    pub fn with_discovery_max_attempts(mut self, attempts: u32) -> Self {
        self.discovery_max_attempts = attempts;
        self
    }

    /// Check every field for a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindowSize);
        }
        if self.window_step == 0 {
            return Err(ConfigError::ZeroWindowStep);
        }
        for (field, value) in [
            ("top_threshold", self.top_threshold),
            ("bottom_threshold", self.bottom_threshold),
            ("force_scroll_tolerance_px", self.force_scroll_tolerance_px),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidDistance { field, value });
            }
        }
        if !(0.0..=1.0).contains(&self.dynamic_bottom_ratio) {
            return Err(ConfigError::InvalidRatio(self.dynamic_bottom_ratio));
        }
        for (field, value) in [
            ("selectors.message", &self.selectors.message),
            ("selectors.container", &self.selectors.container),
            ("id_attribute", &self.id_attribute),
            ("fallback_id_attribute", &self.fallback_id_attribute),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyField(field));
            }
        }
        Ok(())
    }

    #[must_use]
    pub const fn auto_scroll_suppress(&self) -> Duration {
        Duration::from_millis(self.auto_scroll_suppress_ms)
    }

    #[must_use]
    pub const fn jump_suppress(&self) -> Duration {
        Duration::from_millis(self.jump_suppress_ms)
    }

    #[must_use]
    pub const fn scroll_throttle(&self) -> Duration {
        Duration::from_millis(self.scroll_throttle_ms)
    }

    #[must_use]
    pub const fn discovery_backoff(&self) -> Duration {
        Duration::from_millis(self.discovery_backoff_ms)
    }

    #[must_use]
    pub const fn force_scroll_interval(&self) -> Duration {
        Duration::from_millis(self.force_scroll_interval_ms)
    }

    #[must_use]
    pub const fn url_poll(&self) -> Duration {
        Duration::from_millis(self.url_poll_ms)
    }

    /// Selector matching either a message or one of our placeholders.
    #[must_use]
    pub fn message_or_placeholder_selector(&self) -> String {
        format!("{}, [{}]", self.selectors.message, PLACEHOLDER_ATTRIBUTE)
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// JSON could not be parsed into a config.
    Parse(String),
    /// `window_size` must be at least 1.
    ZeroWindowSize,
    /// `window_step` must be at least 1.
    ZeroWindowStep,
    /// A pixel distance was negative or not finite.
    InvalidDistance { field: &'static str, value: f64 },
    /// `dynamic_bottom_ratio` outside `0.0..=1.0`.
    InvalidRatio(f64),
    /// A selector or attribute name was blank.
    EmptyField(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "invalid config JSON: {msg}"),
            Self::ZeroWindowSize => write!(f, "window_size must be at least 1"),
            Self::ZeroWindowStep => write!(f, "window_step must be at least 1"),
            Self::InvalidDistance { field, value } => {
                write!(f, "{field} must be a finite non-negative distance, got {value}")
            }
            Self::InvalidRatio(value) => {
                write!(f, "dynamic_bottom_ratio must be within 0..=1, got {value}")
            }
            Self::EmptyField(field) => write!(f, "{field} must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(VirtualizerConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            VirtualizerConfig::from_json(r#"{"window_size": 10, "selectors": {"message": "article"}}"#)
                .expect("valid config");
        assert_eq!(config.window_size, 10);
        assert_eq!(config.window_step, 5);
        assert_eq!(config.selectors.message, "article");
        assert_eq!(config.selectors.container, "main");
    }

    #[test]
    fn rejects_zero_window() {
        let err = VirtualizerConfig::from_json(r#"{"window_size": 0}"#).unwrap_err();
        assert_eq!(err, ConfigError::ZeroWindowSize);
    }

    #[test]
    fn rejects_negative_threshold() {
        let config = VirtualizerConfig::default().with_thresholds(-1.0, 10.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDistance { field: "top_threshold", .. })
        ));
    }

    #[test]
    fn rejects_bad_ratio_and_blank_selector() {
        let mut config = VirtualizerConfig::default();
        config.dynamic_bottom_ratio = 1.5;
        assert_eq!(config.validate(), Err(ConfigError::InvalidRatio(1.5)));

        let config = VirtualizerConfig::default().with_message_selector("  ");
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyField("selectors.message"))
        );
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            VirtualizerConfig::from_json("{window_size"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn combined_selector_includes_placeholders() {
        let config = VirtualizerConfig::default().with_message_selector("article");
        assert_eq!(
            config.message_or_placeholder_selector(),
            "article, [data-longchat-placeholder]"
        );
    }
}
