#![forbid(unsafe_code)]

//! Browser binding for the longchat engine.
//!
//! On `wasm32` this crate is a content script: it boots on load, finds the
//! transcript through [`longchat_core::Virtualiser`], and wires page scroll,
//! `MutationObserver` records, `popstate`, and a tick interval into it. It
//! also owns the two pieces of injected UI, the debug overlay and the custom
//! scroll-to-bottom button.
//!
//! The target-independent parts (configuration loading, console logging,
//! overlay state) live in their own modules so they can be tested natively.

pub mod boot;
pub mod console;
pub mod overlay;

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::LongChatWeb;

/// Native builds compile this crate as a stub so `cargo check --workspace` stays
/// green on non-wasm targets.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Default)]
pub struct LongChatWeb;

#[cfg(not(target_arch = "wasm32"))]
impl LongChatWeb {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self
    }
}
