/// Result alias that carries the crate's [`VisualizerError`].
pub type Result<T> = std::result::Result<T, VisualizerError>;

/// Errors surfaced by the visualizer controller and its platform layer.
#[derive(Debug, thiserror::Error)]
pub enum VisualizerError {
    /// No audio context capability exists on the host.
    #[error("AudioContext is not supported")]
    UnsupportedPlatform,
    /// An effect was registered without one of `render`, `show` or `hide`.
    #[error("effect must implement {missing}")]
    ContractViolation { missing: &'static str },
    #[error("effect index {index} is out of range for {len} effect(s)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("effect list is empty")]
    EmptyList,
    /// The effect list or sample buffer was touched from inside a render.
    #[error("visualizer is busy rendering")]
    Busy,
    /// One effect failed during a tick. Only ever reported, never returned.
    #[error("effect {index} failed to render: {source}")]
    Render {
        index: usize,
        #[source]
        source: EffectError,
    },
    #[error("failed to decode audio data: {0}")]
    Decode(String),
    /// A call into the host audio/graphics platform failed.
    #[error("platform call failed: {0}")]
    Platform(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl VisualizerError {
    pub fn platform<T: Into<String>>(msg: T) -> Self {
        Self::Platform(msg.into())
    }

    pub fn decode<T: Into<String>>(msg: T) -> Self {
        Self::Decode(msg.into())
    }
}

impl From<serde_json::Error> for VisualizerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}

/// Failure raised by an effect's render hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct EffectError(String);

impl EffectError {
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self(msg.into())
    }
}

impl From<&str> for EffectError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for EffectError {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(target_arch = "wasm32")]
pub(crate) use js::describe;

#[cfg(target_arch = "wasm32")]
mod js {
    use super::{EffectError, VisualizerError};
    use wasm_bindgen::{JsCast, JsValue};

    /// Best-effort message for a thrown JS value.
    pub(crate) fn describe(value: &JsValue) -> String {
        if let Some(error) = value.dyn_ref::<js_sys::Error>() {
            return String::from(error.message());
        }
        value.as_string().unwrap_or_else(|| format!("{value:?}"))
    }

    impl From<JsValue> for VisualizerError {
        fn from(value: JsValue) -> Self {
            Self::Platform(describe(&value))
        }
    }

    impl From<JsValue> for EffectError {
        fn from(value: JsValue) -> Self {
            Self(describe(&value))
        }
    }

    impl From<VisualizerError> for JsValue {
        fn from(value: VisualizerError) -> Self {
            js_sys::Error::new(&value.to_string()).into()
        }
    }
}
