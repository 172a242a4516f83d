#![forbid(unsafe_code)]

//! Container discovery.
//!
//! The chat page renders its transcript asynchronously, so the container is
//! usually not there when the engine starts. Discovery is a small state
//! machine polled by the orchestrator's retry timer:
//!
//! ```text
//! Searching --found--> Found
//!     |                  |
//!     +--max attempts--> Exhausted
//!     ^                  |
//!     +----navigation----+
//! ```
//!
//! The container is the parent of the first message element if any message
//! exists, otherwise the first element matching the container selector (an
//! empty "new chat" page still has one).

use crate::config::VirtualizerConfig;
use crate::host::HostDom;
use crate::logging::Verbosity;
use crate::{debug, trace, warn};

/// Attempts logged as warnings before quieting down.
const LOUD_ATTEMPTS: u32 = 3;

/// Where discovery stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Searching,
    Found,
    /// Gave up after the configured number of attempts.
    Exhausted,
}

/// Find the transcript container, if the page has rendered one.
pub fn locate_container<D: HostDom>(dom: &D, config: &VirtualizerConfig) -> Option<D::Node> {
    dom.query(&config.selectors.message)
        .and_then(|message| dom.parent(&message))
        .or_else(|| dom.query(&config.selectors.container))
}

/// Bounded retry state machine for [`locate_container`].
#[derive(Debug, Clone)]
pub struct ContainerDiscovery {
    state: DiscoveryState,
    attempts: u32,
    max_attempts: u32,
}

impl ContainerDiscovery {
    /// `max_attempts == 0` retries forever.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: DiscoveryState::Searching,
            attempts: 0,
            max_attempts,
        }
    }

    #[must_use]
    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether another poll should be scheduled.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        self.state == DiscoveryState::Searching
    }

    /// Make one attempt. Only searches while [`DiscoveryState::Searching`].
    pub fn poll<D: HostDom>(&mut self, dom: &D, config: &VirtualizerConfig) -> Option<D::Node> {
        if self.state != DiscoveryState::Searching {
            return None;
        }
        self.attempts += 1;
        if let Some(container) = locate_container(dom, config) {
            debug!(target: "longchat::discovery", attempts = self.attempts, "container found");
            self.state = DiscoveryState::Found;
            return Some(container);
        }

        let attempt = self.attempts;
        match Verbosity::for_attempt(attempt, LOUD_ATTEMPTS) {
            Verbosity::Warn => warn!(target: "longchat::discovery", attempt, "container not found; retrying"),
            Verbosity::Debug => debug!(target: "longchat::discovery", attempt, "container not found; retrying"),
            Verbosity::Trace => trace!(target: "longchat::discovery", attempt, "container not found; retrying"),
        }
        if self.max_attempts != 0 && attempt >= self.max_attempts {
            warn!(target: "longchat::discovery", attempt, "container search exhausted");
            self.state = DiscoveryState::Exhausted;
        }
        None
    }

    /// Start over, as after navigation.
    pub fn reset(&mut self) {
        self.state = DiscoveryState::Searching;
        self.attempts = 0;
    }
}
