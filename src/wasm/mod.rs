//! Browser platform and JavaScript bindings.

use wasm_bindgen::prelude::*;

mod bindings;
mod effect;
mod platform;
mod render;

pub use bindings::WebVisualizer;
pub use effect::JsEffect;
pub use platform::{FrameRequest, VisibilityListener, WebAudioContext, WebPlatform};
pub use render::{bar_levels, SpectrumBars};

#[wasm_bindgen(start)]
pub fn main() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    // Each visualizer narrows the level from its own configuration.
    if console_log::init_with_level(log::Level::Trace).is_ok() {
        log::set_max_level(crate::VisualizerConfig::default().level().to_level_filter());
    }
    Ok(())
}
