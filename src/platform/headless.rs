//! In-memory platform with no browser behind it.
//!
//! Frames only advance when [`HeadlessPlatform::run_frame`] is called,
//! visibility changes when [`HeadlessPlatform::set_visibility`] is called, and
//! decodes stay pending until [`HeadlessPlatform::complete_decodes`] unless the
//! platform is switched to [`DecodeMode::Immediate`]. Audio is simulated:
//! elements and decoded buffers carry a fixed magnitude frame that connected
//! analysers report verbatim.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{Analyser, AudioContext, ContextFactory, FrameScheduler, Visibility, VisibilityNotifier};
use crate::{Result, VisualizerError};

/// When decode requests complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Held until [`HeadlessPlatform::complete_decodes`].
    Deferred,
    /// Completed inside the `decode` call.
    Immediate,
}

type Listener = Rc<RefCell<Box<dyn FnMut(Visibility)>>>;

struct PendingDecode {
    context: u64,
    data: Vec<u8>,
    done: Box<dyn FnOnce(Result<HeadlessSource>)>,
}

struct Inner {
    audio_supported: Cell<bool>,
    decode_mode: Cell<DecodeMode>,
    visibility: Cell<Visibility>,
    next_id: Cell<u64>,
    contexts_created: Cell<usize>,
    frames: RefCell<Vec<(u64, Box<dyn FnOnce()>)>>,
    listeners: RefCell<Vec<(u64, Listener)>>,
    decodes: RefCell<Vec<PendingDecode>>,
}

impl Inner {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

/// Shared handle to a simulated host. Clones drive the same host.
#[derive(Clone)]
pub struct HeadlessPlatform {
    inner: Rc<Inner>,
}

impl Default for HeadlessPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessPlatform {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                audio_supported: Cell::new(true),
                decode_mode: Cell::new(DecodeMode::Deferred),
                visibility: Cell::new(Visibility::Visible),
                next_id: Cell::new(1),
                contexts_created: Cell::new(0),
                frames: RefCell::new(Vec::new()),
                listeners: RefCell::new(Vec::new()),
                decodes: RefCell::new(Vec::new()),
            }),
        }
    }

    /// A host without any audio API.
    pub fn without_audio() -> Self {
        let platform = Self::new();
        platform.inner.audio_supported.set(false);
        platform
    }

    pub fn set_decode_mode(&self, mode: DecodeMode) {
        self.inner.decode_mode.set(mode);
    }

    /// Runs every frame callback that was pending when the call started, in
    /// request order. Callbacks requested meanwhile wait for the next call.
    /// Returns how many callbacks ran.
    pub fn run_frame(&self) -> usize {
        let due: Vec<u64> = self.inner.frames.borrow().iter().map(|(id, _)| *id).collect();
        let mut ran = 0;
        for id in due {
            let callback = {
                let mut frames = self.inner.frames.borrow_mut();
                let at = frames.iter().position(|(pending, _)| *pending == id);
                at.map(|at| frames.remove(at).1)
            };
            if let Some(callback) = callback {
                callback();
                ran += 1;
            }
        }
        ran
    }

    /// Runs `count` frames back to back.
    pub fn run_frames(&self, count: usize) -> usize {
        (0..count).map(|_| self.run_frame()).sum()
    }

    pub fn pending_frames(&self) -> usize {
        self.inner.frames.borrow().len()
    }

    pub fn visibility(&self) -> Visibility {
        self.inner.visibility.get()
    }

    /// Changes page visibility and notifies listeners if it differs.
    pub fn set_visibility(&self, visibility: Visibility) {
        if self.inner.visibility.replace(visibility) == visibility {
            return;
        }
        let listeners: Vec<Listener> =
            self.inner.listeners.borrow().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            let mut listener = listener.borrow_mut();
            (listener.as_mut())(visibility);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    pub fn contexts_created(&self) -> usize {
        self.inner.contexts_created.get()
    }

    pub fn pending_decodes(&self) -> usize {
        self.inner.decodes.borrow().len()
    }

    /// Completes every pending decode. Empty input fails to decode; anything
    /// else becomes a buffer source whose frame is the input bytes.
    pub fn complete_decodes(&self) -> usize {
        let pending = std::mem::take(&mut *self.inner.decodes.borrow_mut());
        let count = pending.len();
        for decode in pending {
            let result = decode_frame(decode.context, decode.data);
            (decode.done)(result);
        }
        count
    }
}

fn decode_frame(context: u64, data: Vec<u8>) -> Result<HeadlessSource> {
    if data.is_empty() {
        return Err(VisualizerError::decode("unable to decode audio data"));
    }
    Ok(HeadlessSource::new(context, Rc::new(RefCell::new(data))))
}

impl ContextFactory for HeadlessPlatform {
    type Context = HeadlessContext;

    fn create_context(&self) -> Result<HeadlessContext> {
        if !self.inner.audio_supported.get() {
            return Err(VisualizerError::UnsupportedPlatform);
        }
        self.inner.contexts_created.set(self.inner.contexts_created.get() + 1);
        Ok(HeadlessContext {
            id: self.inner.next_id(),
            host: self.inner.clone(),
        })
    }
}

impl FrameScheduler for HeadlessPlatform {
    type Handle = u64;

    fn request_frame(&self, callback: Box<dyn FnOnce()>) -> Result<u64> {
        let id = self.inner.next_id();
        self.inner.frames.borrow_mut().push((id, callback));
        Ok(id)
    }

    fn cancel_frame(&self, handle: u64) {
        self.inner.frames.borrow_mut().retain(|(id, _)| *id != handle);
    }
}

impl VisibilityNotifier for HeadlessPlatform {
    type Subscription = u64;

    fn subscribe(&self, listener: Box<dyn FnMut(Visibility)>) -> Option<u64> {
        let id = self.inner.next_id();
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(RefCell::new(listener))));
        Some(id)
    }

    fn unsubscribe(&self, subscription: u64) {
        self.inner.listeners.borrow_mut().retain(|(id, _)| *id != subscription);
    }
}

/// A simulated audio context.
#[derive(Clone)]
pub struct HeadlessContext {
    id: u64,
    host: Rc<Inner>,
}

impl HeadlessContext {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// A simulated `<audio>` element playing a fixed magnitude frame.
#[derive(Clone, Default)]
pub struct HeadlessElement {
    src: Rc<RefCell<String>>,
    cross_origin: Rc<RefCell<Option<String>>>,
    frame: Rc<RefCell<Vec<u8>>>,
    has_source: Rc<Cell<bool>>,
}

impl HeadlessElement {
    pub fn new(src: &str) -> Self {
        let element = Self::default();
        *element.src.borrow_mut() = src.to_owned();
        element
    }

    pub fn src(&self) -> String {
        self.src.borrow().clone()
    }

    pub fn cross_origin(&self) -> Option<String> {
        self.cross_origin.borrow().clone()
    }

    /// Sets what analysers fed by this element report.
    pub fn set_frame(&self, frame: &[u8]) {
        *self.frame.borrow_mut() = frame.to_vec();
    }
}

/// A simulated source node.
#[derive(Clone)]
pub struct HeadlessSource {
    context: u64,
    frame: Rc<RefCell<Vec<u8>>>,
    connected: Rc<Cell<bool>>,
}

impl HeadlessSource {
    fn new(context: u64, frame: Rc<RefCell<Vec<u8>>>) -> Self {
        Self {
            context,
            frame,
            connected: Rc::new(Cell::new(false)),
        }
    }

    /// A free-standing source, as a caller would build for
    /// [`crate::Visualizer::with_context_source`].
    pub fn for_context(context: &HeadlessContext, frame: &[u8]) -> Self {
        Self::new(context.id, Rc::new(RefCell::new(frame.to_vec())))
    }

    pub fn set_frame(&self, frame: &[u8]) {
        *self.frame.borrow_mut() = frame.to_vec();
    }

    /// Whether the source currently feeds an analyser and the output.
    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }
}

/// A simulated analyser reporting its input's frame, zero-padded to `bins`.
pub struct HeadlessAnalyser {
    bins: usize,
    input: RefCell<Option<HeadlessSource>>,
}

impl Analyser for HeadlessAnalyser {
    fn frequency_data(&self, out: &mut [u8]) {
        let n = out.len().min(self.bins);
        let input = self.input.borrow();
        match input.as_ref().filter(|source| source.is_connected()) {
            Some(source) => {
                let frame = source.frame.borrow();
                for (i, slot) in out[..n].iter_mut().enumerate() {
                    *slot = frame.get(i).copied().unwrap_or(0);
                }
            }
            None => out[..n].fill(0),
        }
    }
}

impl AudioContext for HeadlessContext {
    type Element = HeadlessElement;
    type Source = HeadlessSource;
    type Analyser = HeadlessAnalyser;

    fn create_analyser(&self, bins: usize) -> Result<HeadlessAnalyser> {
        Ok(HeadlessAnalyser {
            bins,
            input: RefCell::new(None),
        })
    }

    fn create_element(&self, url: &str, cross_origin: Option<&str>) -> Result<HeadlessElement> {
        let element = HeadlessElement::new(url);
        *element.cross_origin.borrow_mut() = cross_origin.map(str::to_owned);
        Ok(element)
    }

    fn set_element_source(&self, element: &HeadlessElement, url: &str) -> Result<()> {
        *element.src.borrow_mut() = url.to_owned();
        Ok(())
    }

    fn element_source(&self, element: &HeadlessElement) -> Result<HeadlessSource> {
        if element.has_source.replace(true) {
            return Err(VisualizerError::platform(
                "media element is already attached to a source node",
            ));
        }
        Ok(HeadlessSource::new(self.id, element.frame.clone()))
    }

    fn connect(&self, source: &HeadlessSource, analyser: &HeadlessAnalyser) -> Result<()> {
        if source.context != self.id {
            return Err(VisualizerError::platform(
                "source node belongs to a different audio context",
            ));
        }
        source.connected.set(true);
        *analyser.input.borrow_mut() = Some(source.clone());
        Ok(())
    }

    fn disconnect(&self, source: &HeadlessSource) {
        source.connected.set(false);
    }

    fn decode(&self, data: Vec<u8>, done: Box<dyn FnOnce(Result<HeadlessSource>)>) {
        match self.host.decode_mode.get() {
            DecodeMode::Immediate => done(decode_frame(self.id, data)),
            DecodeMode::Deferred => self.host.decodes.borrow_mut().push(PendingDecode {
                context: self.id,
                data,
                done,
            }),
        }
    }
}
