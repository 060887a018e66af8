use js_sys::{ArrayBuffer, Function, Uint8Array};
use wasm_bindgen::prelude::*;
use web_sys::{AudioNode, HtmlCanvasElement, HtmlMediaElement};

use super::{JsEffect, SpectrumBars, WebAudioContext, WebPlatform};
use crate::error::describe;
use crate::{Visualizer, VisualizerConfig, VisualizerError};

type JsResult<T> = std::result::Result<T, JsValue>;

/// Accepts `undefined`, a buffer length, or an options object.
fn read_config(options: &JsValue) -> crate::Result<VisualizerConfig> {
    let config = if options.is_undefined() || options.is_null() {
        VisualizerConfig::default()
    } else if let Some(length) = options.as_f64() {
        if length < 1.0 || length.fract() != 0.0 {
            return Err(VisualizerError::Config(format!(
                "buffer length must be a positive integer, got {length}"
            )));
        }
        VisualizerConfig::with_buffer_length(length as usize)
    } else {
        let json = js_sys::JSON::stringify(options)?;
        VisualizerConfig::from_json(&String::from(json))?
    };
    config.validate()?;
    log::set_max_level(config.level().to_level_filter());
    Ok(config)
}

fn bytes(buffer: &ArrayBuffer) -> Vec<u8> {
    Uint8Array::new(buffer).to_vec()
}

/// JavaScript face of [`Visualizer`] running on the browser platform.
#[wasm_bindgen(js_name = Vizualizer)]
pub struct WebVisualizer {
    inner: Visualizer<WebPlatform>,
}

#[wasm_bindgen(js_class = Vizualizer)]
impl WebVisualizer {
    #[wasm_bindgen(js_name = withMedia)]
    pub fn with_media(url: &str, options: JsValue) -> JsResult<WebVisualizer> {
        let inner = Visualizer::with_media(WebPlatform::new()?, url, read_config(&options)?)?;
        Ok(Self { inner })
    }

    #[wasm_bindgen(js_name = withElement)]
    pub fn with_element(element: HtmlMediaElement, options: JsValue) -> JsResult<WebVisualizer> {
        let inner = Visualizer::with_element(WebPlatform::new()?, element, read_config(&options)?)?;
        Ok(Self { inner })
    }

    #[wasm_bindgen(js_name = withContextSource)]
    pub fn with_context_source(
        context: web_sys::AudioContext,
        source: AudioNode,
        options: JsValue,
    ) -> JsResult<WebVisualizer> {
        let inner = Visualizer::with_context_source(
            WebPlatform::new()?,
            WebAudioContext::from(context),
            source,
            read_config(&options)?,
        )?;
        Ok(Self { inner })
    }

    #[wasm_bindgen(js_name = withArrayBuffer)]
    pub fn with_array_buffer(buffer: ArrayBuffer, options: JsValue) -> JsResult<WebVisualizer> {
        let inner =
            Visualizer::with_array_buffer(WebPlatform::new()?, bytes(&buffer), read_config(&options)?)?;
        Ok(Self { inner })
    }

    /// Resolves to `false` when the loop was already running.
    pub fn start(&self) -> JsResult<bool> {
        Ok(self.inner.start()?)
    }

    pub fn stop(&self) -> bool {
        self.inner.stop()
    }

    #[wasm_bindgen(js_name = isRunning)]
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    #[wasm_bindgen(js_name = addEffect)]
    pub fn add_effect(&mut self, effect: JsValue) -> JsResult<usize> {
        Ok(self.inner.add_effect(JsEffect::new(effect)?)?)
    }

    /// Adds the built-in bar graph drawn on `canvas`.
    #[wasm_bindgen(js_name = addSpectrumBars)]
    pub fn add_spectrum_bars(&mut self, canvas: HtmlCanvasElement, bars: usize, color: &str) -> JsResult<usize> {
        Ok(self.inner.add_effect(SpectrumBars::new(canvas, bars, color)?)?)
    }

    #[wasm_bindgen(js_name = removeEffect)]
    pub fn remove_effect(&mut self, index: usize) -> JsResult<()> {
        self.inner.remove_effect(index)?;
        Ok(())
    }

    #[wasm_bindgen(js_name = popEffect)]
    pub fn pop_effect(&mut self) -> JsResult<()> {
        self.inner.pop_effect()?;
        Ok(())
    }

    #[wasm_bindgen(js_name = changeEffect)]
    pub fn change_effect(&mut self, effect: JsValue, index: Option<usize>) -> JsResult<()> {
        self.inner
            .change_effect(JsEffect::new(effect)?, index.unwrap_or(0))?;
        Ok(())
    }

    #[wasm_bindgen(js_name = effectCount)]
    pub fn effect_count(&self) -> JsResult<usize> {
        Ok(self.inner.effect_count()?)
    }

    #[wasm_bindgen(js_name = bufferLength)]
    pub fn buffer_length(&self) -> usize {
        self.inner.buffer_length()
    }

    #[wasm_bindgen(js_name = loadAudioContext)]
    pub fn load_audio_context(&mut self, context: web_sys::AudioContext) -> JsResult<()> {
        Ok(self.inner.load_audio_context(WebAudioContext::from(context))?)
    }

    #[wasm_bindgen(js_name = loadElement)]
    pub fn load_element(&mut self, element: HtmlMediaElement) -> JsResult<()> {
        Ok(self.inner.load_element(element)?)
    }

    #[wasm_bindgen(js_name = loadArrayBuffer)]
    pub fn load_array_buffer(&mut self, buffer: ArrayBuffer) {
        self.inner.load_array_buffer(bytes(&buffer));
    }

    #[wasm_bindgen(js_name = loadDataUrl)]
    pub fn load_data_url(&mut self, url: &str) -> JsResult<()> {
        Ok(self.inner.load_data_url(url)?)
    }

    /// `callback(message)` is invoked for every render, decode or
    /// scheduling failure.
    #[wasm_bindgen(js_name = onError)]
    pub fn on_error(&mut self, callback: Function) {
        self.inner.set_error_handler(move |err| {
            if let Err(thrown) = callback.call1(&JsValue::NULL, &JsValue::from_str(&err.to_string())) {
                log::error!("error callback threw: {}", describe(&thrown));
            }
        });
    }
}
