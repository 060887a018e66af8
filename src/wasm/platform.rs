use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use js_sys::{Function, Reflect, Uint8Array};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    AnalyserNode, AudioBuffer, AudioBufferSourceNode, AudioNode, Document, HtmlAudioElement,
    HtmlMediaElement, Window,
};

use crate::error::describe;
use crate::platform::{
    Analyser, AudioContext, ContextFactory, FrameScheduler, Visibility, VisibilityNotifier,
};
use crate::{Result, VisualizerError};

// Property holding the hidden flag, and the event announcing its changes,
// in the order browsers are probed.
const VISIBILITY_APIS: [(&str, &str); 4] = [
    ("hidden", "visibilitychange"),
    ("mozHidden", "mozvisibilitychange"),
    ("msHidden", "msvisibilitychange"),
    ("webkitHidden", "webkitvisibilitychange"),
];

#[derive(Default)]
struct FrameSlots {
    next: u64,
    // Closures must outlive their animation frame request.
    pending: HashMap<u64, (i32, Closure<dyn FnMut()>)>,
    // Keys whose closure has run and can be freed on the next request.
    spent: Vec<u64>,
}

/// Identifies one `requestAnimationFrame` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRequest {
    key: u64,
    id: i32,
}

/// The browser: Web Audio contexts, `requestAnimationFrame` and the page
/// visibility API of the current window.
#[derive(Clone)]
pub struct WebPlatform {
    window: Window,
    document: Document,
    frames: Rc<RefCell<FrameSlots>>,
}

impl WebPlatform {
    pub fn new() -> Result<Self> {
        let window = web_sys::window().ok_or_else(|| VisualizerError::platform("no window"))?;
        let document = window
            .document()
            .ok_or_else(|| VisualizerError::platform("no document"))?;
        Ok(Self {
            window,
            document,
            frames: Rc::new(RefCell::new(FrameSlots::default())),
        })
    }

    // Safari before 14.1 only exposes the prefixed constructor.
    fn webkit_context(&self) -> Option<web_sys::AudioContext> {
        let ctor = Reflect::get(&self.window, &JsValue::from_str("webkitAudioContext")).ok()?;
        let ctor = ctor.dyn_into::<Function>().ok()?;
        let context = Reflect::construct(&ctor, &js_sys::Array::new()).ok()?;
        Some(context.unchecked_into())
    }
}

impl ContextFactory for WebPlatform {
    type Context = WebAudioContext;

    fn create_context(&self) -> Result<WebAudioContext> {
        match web_sys::AudioContext::new() {
            Ok(context) => Ok(WebAudioContext::from(context)),
            Err(err) => {
                log::debug!("AudioContext unavailable ({}), trying webkitAudioContext", describe(&err));
                self.webkit_context()
                    .map(WebAudioContext::from)
                    .ok_or(VisualizerError::UnsupportedPlatform)
            }
        }
    }
}

impl FrameScheduler for WebPlatform {
    type Handle = FrameRequest;

    fn request_frame(&self, callback: Box<dyn FnOnce()>) -> Result<FrameRequest> {
        let mut slots = self.frames.borrow_mut();
        for key in std::mem::take(&mut slots.spent) {
            slots.pending.remove(&key);
        }
        let key = slots.next;
        slots.next += 1;

        let frames = Rc::downgrade(&self.frames);
        let mut callback = Some(callback);
        let closure = Closure::wrap(Box::new(move || {
            if let Some(callback) = callback.take() {
                callback();
            }
            if let Some(frames) = frames.upgrade() {
                frames.borrow_mut().spent.push(key);
            }
        }) as Box<dyn FnMut()>);

        let id = self
            .window
            .request_animation_frame(closure.as_ref().unchecked_ref())?;
        slots.pending.insert(key, (id, closure));
        Ok(FrameRequest { key, id })
    }

    fn cancel_frame(&self, handle: FrameRequest) {
        if let Err(err) = self.window.cancel_animation_frame(handle.id) {
            log::warn!("cancelAnimationFrame failed: {}", describe(&err));
        }
        self.frames.borrow_mut().pending.remove(&handle.key);
    }
}

/// A registered `visibilitychange` listener.
pub struct VisibilityListener {
    event: &'static str,
    closure: Closure<dyn FnMut()>,
}

impl VisibilityNotifier for WebPlatform {
    type Subscription = VisibilityListener;

    fn subscribe(&self, mut listener: Box<dyn FnMut(Visibility)>) -> Option<VisibilityListener> {
        let (property, event) = VISIBILITY_APIS.iter().copied().find(|(property, _)| {
            Reflect::has(&self.document, &JsValue::from_str(property)).unwrap_or(false)
        })?;

        let document = self.document.clone();
        let closure = Closure::wrap(Box::new(move || {
            let hidden = Reflect::get(&document, &JsValue::from_str(property))
                .ok()
                .and_then(|value| value.as_bool())
                .unwrap_or(false);
            listener(if hidden {
                Visibility::Hidden
            } else {
                Visibility::Visible
            });
        }) as Box<dyn FnMut()>);

        match self
            .document
            .add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
        {
            Ok(()) => Some(VisibilityListener { event, closure }),
            Err(err) => {
                log::warn!("cannot listen for {event}: {}", describe(&err));
                None
            }
        }
    }

    fn unsubscribe(&self, subscription: VisibilityListener) {
        let callback: &Function = subscription.closure.as_ref().unchecked_ref();
        if let Err(err) = self
            .document
            .remove_event_listener_with_callback(subscription.event, callback)
        {
            log::warn!("cannot remove {} listener: {}", subscription.event, describe(&err));
        }
    }
}

/// A Web Audio `AudioContext`.
#[derive(Clone, Debug)]
pub struct WebAudioContext {
    inner: web_sys::AudioContext,
}

impl From<web_sys::AudioContext> for WebAudioContext {
    fn from(inner: web_sys::AudioContext) -> Self {
        Self { inner }
    }
}

impl WebAudioContext {
    pub fn raw(&self) -> &web_sys::AudioContext {
        &self.inner
    }

    /// Source node playing `buffer`, as produced for decoded audio. It starts
    /// when connected.
    pub fn buffer_source(&self, buffer: &AudioBuffer) -> Result<AudioNode> {
        buffer_source(&self.inner, buffer)
    }
}

/// `fftSize` giving exactly `bins` frequency bins, when the API allows it.
fn fft_size_for(bins: usize) -> Option<u32> {
    let fft = bins.checked_mul(2)?;
    (fft.is_power_of_two() && (32..=32768).contains(&fft)).then_some(fft as u32)
}

fn buffer_source(context: &web_sys::AudioContext, buffer: &AudioBuffer) -> Result<AudioNode> {
    let node = context.create_buffer_source()?;
    node.set_buffer(Some(buffer));
    Ok(node.into())
}

impl Analyser for AnalyserNode {
    fn frequency_data(&self, out: &mut [u8]) {
        self.get_byte_frequency_data(out);
    }
}

impl AudioContext for WebAudioContext {
    type Element = HtmlMediaElement;
    type Source = AudioNode;
    type Analyser = AnalyserNode;

    fn create_analyser(&self, bins: usize) -> Result<AnalyserNode> {
        let analyser = self.inner.create_analyser()?;
        match fft_size_for(bins) {
            Some(fft) => analyser.set_fft_size(fft),
            None => log::warn!(
                "no fftSize yields {bins} bins; keeping {} bins",
                analyser.frequency_bin_count()
            ),
        }
        Ok(analyser)
    }

    fn create_element(&self, url: &str, cross_origin: Option<&str>) -> Result<HtmlMediaElement> {
        let audio = HtmlAudioElement::new()?;
        audio.set_cross_origin(cross_origin);
        audio.set_src(url);
        Ok(audio.into())
    }

    fn set_element_source(&self, element: &HtmlMediaElement, url: &str) -> Result<()> {
        element.set_src(url);
        Ok(())
    }

    fn element_source(&self, element: &HtmlMediaElement) -> Result<AudioNode> {
        Ok(self.inner.create_media_element_source(element)?.into())
    }

    // Decoded buffers only produce sound once started, so a buffer source
    // starts playing as soon as it is wired up.
    fn connect(&self, source: &AudioNode, analyser: &AnalyserNode) -> Result<()> {
        source.connect_with_audio_node(analyser)?;
        source.connect_with_audio_node(&self.inner.destination())?;
        if let Some(node) = source.dyn_ref::<AudioBufferSourceNode>() {
            node.start()?;
        }
        Ok(())
    }

    fn disconnect(&self, source: &AudioNode) {
        if let Some(node) = source.dyn_ref::<AudioBufferSourceNode>() {
            if let Err(err) = node.stop() {
                log::warn!("failed to stop buffer source: {}", describe(&err));
            }
        }
        if let Err(err) = source.disconnect() {
            log::warn!("failed to disconnect source: {}", describe(&err));
        }
    }

    fn decode(&self, data: Vec<u8>, done: Box<dyn FnOnce(Result<AudioNode>)>) {
        let bytes = Uint8Array::from(data.as_slice());
        let promise = match self.inner.decode_audio_data(&bytes.buffer()) {
            Ok(promise) => promise,
            Err(err) => return done(Err(VisualizerError::decode(describe(&err)))),
        };
        let context = self.inner.clone();
        spawn_local(async move {
            let result = match JsFuture::from(promise).await {
                Ok(buffer) => {
                    let buffer: AudioBuffer = buffer.unchecked_into();
                    buffer_source(&context, &buffer)
                }
                Err(err) => Err(VisualizerError::decode(describe(&err))),
            };
            done(result);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::fft_size_for;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn fft_size_matches_bin_count() {
        assert_eq!(fft_size_for(1024), Some(2048));
        assert_eq!(fft_size_for(16), Some(32));
        assert_eq!(fft_size_for(16384), Some(32768));
        assert_eq!(fft_size_for(8), None);
        assert_eq!(fft_size_for(1000), None);
    }
}
