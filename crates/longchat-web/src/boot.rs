#![forbid(unsafe_code)]

//! Startup settings for the content script.
//!
//! The extension may leave a JSON object under [`CONFIG_STORAGE_KEY`] in the
//! page's `localStorage`; anything it omits keeps its default. A malformed or
//! invalid value is reported and ignored rather than keeping the engine off
//! the page.

use longchat_core::VirtualizerConfig;
use tracing::warn;

/// `localStorage` key holding a partial [`VirtualizerConfig`] as JSON.
pub const CONFIG_STORAGE_KEY: &str = "longchatConfig";

/// Interval of the host tick that drives timers and deferred work (ms).
pub const TICK_INTERVAL_MS: i32 = 50;

/// Id given to the injected scroll-to-bottom button.
pub const SCROLL_BUTTON_ID: &str = "longchat-scroll-button";

/// Id given to the debug overlay element.
pub const OVERLAY_ID: &str = "longchat-debug-overlay";

/// Resolve the configuration from the stored JSON, if any.
#[must_use]
pub fn load_config(raw: Option<&str>) -> VirtualizerConfig {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return VirtualizerConfig::default();
    };
    match VirtualizerConfig::from_json(raw) {
        Ok(config) => config,
        Err(err) => {
            warn!(target: "longchat::web", %err, "ignoring stored configuration");
            VirtualizerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_or_blank_uses_defaults() {
        assert_eq!(load_config(None), VirtualizerConfig::default());
        assert_eq!(load_config(Some("  ")), VirtualizerConfig::default());
    }

    #[test]
    fn partial_json_overrides_fields() {
        let config = load_config(Some(r#"{"window_size": 40, "debug": true}"#));
        assert_eq!(config.window_size, 40);
        assert!(config.debug);
        assert_eq!(config.window_step, VirtualizerConfig::default().window_step);
    }

    #[test]
    fn invalid_values_fall_back() {
        assert_eq!(load_config(Some("{not json")), VirtualizerConfig::default());
        assert_eq!(load_config(Some(r#"{"window_size": 0}"#)), VirtualizerConfig::default());
    }
}
