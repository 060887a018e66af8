//! Drive a list of visual effects from the frequency data of an audio source.
//!
//! A [`Visualizer`] binds an audio source to an analyser and, once started,
//! hands every registered [`Effect`] a fresh snapshot of frequency magnitudes
//! once per animation frame. The host (a browser, or the in-memory
//! [`platform::headless`] host) is injected as a [`platform::Platform`].

pub mod config;
pub mod effect;
pub mod error;
pub mod platform;
pub mod visualizer;

// Only compile browser bindings when targeting wasm32.
#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use config::{VisualizerConfig, DEFAULT_BUFFER_LENGTH};
pub use effect::{Effect, EffectHooks, IntoEffect};
pub use error::{EffectError, Result, VisualizerError};
pub use platform::{Platform, Visibility};
pub use visualizer::Visualizer;
