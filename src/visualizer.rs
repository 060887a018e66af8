//! The visualizer controller: one audio binding, an ordered effect list and a
//! cancellable render loop driven by the platform's frame scheduler.

use std::cell::{RefCell, RefMut};
use std::rc::{Rc, Weak};

use crate::effect::{Effect, IntoEffect};
use crate::platform::{
    Analyser, AudioContext, ContextFactory, Platform, Visibility, VisibilityNotifier,
};
use crate::{Result, VisualizerConfig, VisualizerError};

type Ctx<P> = <P as ContextFactory>::Context;
type ElementOf<P> = <Ctx<P> as AudioContext>::Element;
type SourceOf<P> = <Ctx<P> as AudioContext>::Source;
type ErrorHandler = Box<dyn FnMut(&VisualizerError)>;

/// Context, source and analyser currently wired together.
struct Binding<C: AudioContext> {
    context: C,
    analyser: C::Analyser,
    source: Option<C::Source>,
    element: Option<C::Element>,
    // Bumped on every rebinding; a decode finishing under an older value
    // has been superseded.
    generation: u64,
}

impl<C: AudioContext> Binding<C> {
    fn new(context: C, bins: usize) -> Result<Self> {
        let analyser = context.create_analyser(bins)?;
        Ok(Self {
            context,
            analyser,
            source: None,
            element: None,
            generation: 0,
        })
    }

    /// Connects `source` and releases the previous one. On failure the
    /// previous source stays bound.
    fn attach(&mut self, source: C::Source) -> Result<()> {
        self.context.connect(&source, &self.analyser)?;
        if let Some(old) = self.source.replace(source) {
            self.context.disconnect(&old);
        }
        Ok(())
    }

    fn detach(&mut self) {
        if let Some(old) = self.source.take() {
            self.context.disconnect(&old);
        }
    }

    fn bind_element(&mut self, element: C::Element) -> Result<()> {
        let source = self.context.element_source(&element)?;
        self.attach(source)?;
        self.element = Some(element);
        self.generation += 1;
        Ok(())
    }

    fn refresh(&self, samples: &mut [u8]) {
        match self.source {
            Some(_) => self.analyser.frequency_data(samples),
            None => samples.fill(0),
        }
    }
}

struct State<P: Platform> {
    binding: Binding<Ctx<P>>,
    frame: Option<P::Handle>,
    running: bool,
    paused_by_visibility: bool,
    ticks: u64,
}

// Effects and samples sit outside `state` so an effect may call back into
// the controller (for instance to stop it) while it renders.
struct Shared<P: Platform> {
    platform: P,
    config: VisualizerConfig,
    state: RefCell<State<P>>,
    effects: RefCell<Vec<Box<dyn Effect>>>,
    samples: RefCell<Vec<u8>>,
    on_error: RefCell<Option<ErrorHandler>>,
}

impl<P: Platform> Shared<P> {
    fn report(&self, err: VisualizerError) {
        match &err {
            VisualizerError::Render { .. } => log::warn!("{err}"),
            _ => log::error!("{err}"),
        }
        if let Ok(mut handler) = self.on_error.try_borrow_mut() {
            if let Some(handler) = handler.as_mut() {
                handler(&err);
            }
        }
    }

    fn effects_mut(&self) -> Result<RefMut<'_, Vec<Box<dyn Effect>>>> {
        self.effects.try_borrow_mut().map_err(|_| VisualizerError::Busy)
    }

    fn schedule(shared: &Rc<Self>) -> Result<()> {
        let weak: Weak<Self> = Rc::downgrade(shared);
        let handle = shared.platform.request_frame(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                Self::tick(&shared);
            }
        }))?;
        shared.state.borrow_mut().frame = Some(handle);
        Ok(())
    }

    fn tick(shared: &Rc<Self>) {
        {
            let mut state = shared.state.borrow_mut();
            state.frame = None;
            if !state.running {
                return;
            }
            state.ticks += 1;
            state.binding.refresh(&mut shared.samples.borrow_mut());
        }

        for failure in shared.render_effects() {
            shared.report(failure);
        }

        // An effect may have stopped and restarted the loop while rendering;
        // that restart already holds the frame.
        {
            let state = shared.state.borrow();
            if !state.running || state.frame.is_some() {
                return;
            }
        }
        if let Err(err) = Self::schedule(shared) {
            shared.state.borrow_mut().running = false;
            shared.report(err);
        }
    }

    fn render_effects(&self) -> Vec<VisualizerError> {
        let samples = self.samples.borrow();
        let mut effects = self.effects.borrow_mut();
        effects
            .iter_mut()
            .enumerate()
            .filter_map(|(index, effect)| {
                effect
                    .render(&samples)
                    .err()
                    .map(|source| VisualizerError::Render { index, source })
            })
            .collect()
    }

    fn start(shared: &Rc<Self>) -> Result<bool> {
        {
            let mut state = shared.state.borrow_mut();
            state.paused_by_visibility = false;
            if state.running {
                log::debug!("render loop already running");
                return Ok(false);
            }
            state.running = true;
        }
        if let Err(err) = Self::schedule(shared) {
            shared.state.borrow_mut().running = false;
            return Err(err);
        }
        log::debug!("render loop started");
        Ok(true)
    }

    fn stop(&self) -> bool {
        let (was_running, frame) = {
            let mut state = self.state.borrow_mut();
            state.paused_by_visibility = false;
            (std::mem::replace(&mut state.running, false), state.frame.take())
        };
        if let Some(handle) = frame {
            self.platform.cancel_frame(handle);
        }
        if was_running {
            log::debug!("render loop stopped");
        }
        was_running
    }

    fn visibility_changed(shared: &Rc<Self>, visibility: Visibility) {
        match visibility {
            Visibility::Hidden => {
                if shared.stop() {
                    shared.state.borrow_mut().paused_by_visibility = true;
                    log::debug!("page hidden, render loop paused");
                }
            }
            Visibility::Visible => {
                let paused = shared.state.borrow().paused_by_visibility;
                if paused {
                    log::debug!("page visible, resuming render loop");
                    if let Err(err) = Self::start(shared) {
                        shared.report(err);
                    }
                }
            }
        }
    }

    fn begin_decode(shared: &Rc<Self>, data: Vec<u8>) {
        let (context, generation) = {
            let mut state = shared.state.borrow_mut();
            state.binding.generation += 1;
            (state.binding.context.clone(), state.binding.generation)
        };
        let weak = Rc::downgrade(shared);
        context.decode(
            data,
            Box::new(move |result| {
                if let Some(shared) = weak.upgrade() {
                    shared.finish_decode(generation, result);
                }
            }),
        );
    }

    fn finish_decode(&self, generation: u64, result: Result<SourceOf<P>>) {
        let outcome = {
            let mut state = self.state.borrow_mut();
            let binding = &mut state.binding;
            if binding.generation != generation {
                log::debug!("discarding decode superseded by a newer binding");
                return;
            }
            match result {
                Ok(source) => binding.attach(source).map(|()| {
                    binding.element = None;
                }),
                Err(err) => {
                    binding.detach();
                    Err(err)
                }
            }
        };
        match outcome {
            Ok(()) => log::debug!("decoded audio bound"),
            Err(err) => self.report(err),
        }
    }
}

/// Binds an audio source to an analyser and renders a list of effects from
/// its frequency data once per frame.
///
/// Dropping the visualizer stops the loop, hides every effect and removes
/// the visibility listener.
pub struct Visualizer<P: Platform> {
    shared: Rc<Shared<P>>,
    subscription: Option<P::Subscription>,
}

impl<P: Platform> Visualizer<P> {
    /// Plays `url` through a new media element and audio context.
    pub fn with_media(platform: P, url: &str, config: VisualizerConfig) -> Result<Self> {
        config.validate()?;
        let context = platform.create_context()?;
        let element = context.create_element(url, config.cross_origin.as_deref())?;
        let mut binding = Binding::new(context, config.buffer_length)?;
        binding.bind_element(element)?;
        Ok(Self::from_binding(platform, binding, config))
    }

    /// Plays an existing media element through a new audio context.
    pub fn with_element(platform: P, element: ElementOf<P>, config: VisualizerConfig) -> Result<Self> {
        config.validate()?;
        let context = platform.create_context()?;
        let mut binding = Binding::new(context, config.buffer_length)?;
        binding.bind_element(element)?;
        Ok(Self::from_binding(platform, binding, config))
    }

    /// Analyses a source the caller already built on its own context.
    pub fn with_context_source(
        platform: P,
        context: Ctx<P>,
        source: SourceOf<P>,
        config: VisualizerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut binding = Binding::new(context, config.buffer_length)?;
        binding.attach(source)?;
        Ok(Self::from_binding(platform, binding, config))
    }

    /// Decodes `data` on a new audio context. Until decoding finishes, ticks
    /// render a zeroed buffer; a failed decode is reported and leaves the
    /// visualizer without a source.
    pub fn with_array_buffer(platform: P, data: Vec<u8>, config: VisualizerConfig) -> Result<Self> {
        config.validate()?;
        let context = platform.create_context()?;
        let binding = Binding::new(context, config.buffer_length)?;
        let visualizer = Self::from_binding(platform, binding, config);
        Shared::begin_decode(&visualizer.shared, data);
        Ok(visualizer)
    }

    fn from_binding(platform: P, binding: Binding<Ctx<P>>, config: VisualizerConfig) -> Self {
        let samples = vec![0; config.buffer_length];
        let pause_when_hidden = config.pause_when_hidden;
        let shared = Rc::new(Shared {
            platform,
            config,
            state: RefCell::new(State {
                binding,
                frame: None,
                running: false,
                paused_by_visibility: false,
                ticks: 0,
            }),
            effects: RefCell::new(Vec::new()),
            samples: RefCell::new(samples),
            on_error: RefCell::new(None),
        });

        let subscription = if pause_when_hidden {
            let weak = Rc::downgrade(&shared);
            let subscription = shared.platform.subscribe(Box::new(move |visibility| {
                if let Some(shared) = weak.upgrade() {
                    Shared::visibility_changed(&shared, visibility);
                }
            }));
            if subscription.is_none() {
                log::warn!("page visibility is not observable; render loop keeps running when hidden");
            }
            subscription
        } else {
            None
        };

        Self {
            shared,
            subscription,
        }
    }

    /// Schedules the loop for the next frame. Returns `Ok(false)` without
    /// scheduling anything when the loop is already running.
    pub fn start(&self) -> Result<bool> {
        Shared::start(&self.shared)
    }

    /// Cancels the next scheduled tick. Returns whether the loop was running.
    pub fn stop(&self) -> bool {
        self.shared.stop()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.borrow().running
    }

    /// Validates `effect`, appends it and shows it. Returns its index.
    pub fn add_effect<E: IntoEffect>(&mut self, effect: E) -> Result<usize> {
        let effect = effect.into_effect()?;
        let mut effects = self.shared.effects_mut()?;
        effects.push(effect);
        let index = effects.len() - 1;
        effects[index].show();
        Ok(index)
    }

    /// Hides and removes the effect at `index`; later effects shift down.
    pub fn remove_effect(&mut self, index: usize) -> Result<Box<dyn Effect>> {
        let mut effects = self.shared.effects_mut()?;
        let len = effects.len();
        if index >= len {
            return Err(VisualizerError::IndexOutOfRange { index, len });
        }
        effects[index].hide();
        Ok(effects.remove(index))
    }

    /// Hides and removes the last effect.
    pub fn pop_effect(&mut self) -> Result<Box<dyn Effect>> {
        let len = self.shared.effects_mut()?.len();
        if len == 0 {
            return Err(VisualizerError::EmptyList);
        }
        self.remove_effect(len - 1)
    }

    /// Replaces the effect at `index`: the old one is hidden, then `effect`
    /// is installed and shown. Returns the old effect.
    pub fn change_effect<E: IntoEffect>(&mut self, effect: E, index: usize) -> Result<Box<dyn Effect>> {
        let effect = effect.into_effect()?;
        let mut effects = self.shared.effects_mut()?;
        let len = effects.len();
        let slot = effects
            .get_mut(index)
            .ok_or(VisualizerError::IndexOutOfRange { index, len })?;
        slot.hide();
        let old = std::mem::replace(slot, effect);
        slot.show();
        Ok(old)
    }

    /// Hides and removes every effect in list order.
    pub fn clear_effects(&mut self) -> Result<usize> {
        let mut effects = self.shared.effects_mut()?;
        for effect in effects.iter_mut() {
            effect.hide();
        }
        let count = effects.len();
        effects.clear();
        Ok(count)
    }

    /// Number of installed effects. Fails with [`VisualizerError::Busy`] when
    /// called from inside an effect's `render`.
    pub fn effect_count(&self) -> Result<usize> {
        self.shared
            .effects
            .try_borrow()
            .map(|effects| effects.len())
            .map_err(|_| VisualizerError::Busy)
    }

    /// Rebinds to `context` with a fresh analyser. The previous source and
    /// element belonged to the old context and are released; the sample
    /// buffer keeps its length and is refreshed once.
    pub fn load_audio_context(&mut self, context: Ctx<P>) -> Result<()> {
        let mut samples = self
            .shared
            .samples
            .try_borrow_mut()
            .map_err(|_| VisualizerError::Busy)?;
        let mut state = self.shared.state.borrow_mut();
        let binding = &mut state.binding;
        let len = samples.len();
        let analyser = context.create_analyser(len)?;
        binding.detach();
        binding.context = context;
        binding.analyser = analyser;
        binding.element = None;
        binding.generation += 1;
        *samples = vec![0; len];
        binding.refresh(&mut samples);
        Ok(())
    }

    /// Plays `element` through the current context and analyser.
    pub fn load_element(&mut self, element: ElementOf<P>) -> Result<()> {
        self.shared.state.borrow_mut().binding.bind_element(element)
    }

    /// Decodes `data` and, once decoded, plays it through the current
    /// context and analyser. The current source keeps playing meanwhile.
    pub fn load_array_buffer(&mut self, data: Vec<u8>) {
        Shared::begin_decode(&self.shared, data);
    }

    /// Points the bound media element at `url`, creating the element first
    /// if the binding has none.
    pub fn load_data_url(&mut self, url: &str) -> Result<()> {
        let mut state = self.shared.state.borrow_mut();
        let binding = &mut state.binding;
        match &binding.element {
            Some(element) => binding.context.set_element_source(element, url),
            None => {
                let element = binding
                    .context
                    .create_element(url, self.shared.config.cross_origin.as_deref())?;
                binding.bind_element(element)
            }
        }
    }

    /// Installs the callback that receives render, decode and scheduling
    /// failures. They are logged either way.
    pub fn set_error_handler<F: FnMut(&VisualizerError) + 'static>(&mut self, handler: F) {
        *self.shared.on_error.borrow_mut() = Some(Box::new(handler));
    }

    pub fn buffer_length(&self) -> usize {
        self.shared.samples.borrow().len()
    }

    /// Copy of the sample buffer as of the last refresh.
    pub fn samples(&self) -> Vec<u8> {
        self.shared.samples.borrow().clone()
    }

    pub fn has_source(&self) -> bool {
        self.shared.state.borrow().binding.source.is_some()
    }

    /// The context the visualizer is currently bound to.
    pub fn context(&self) -> Ctx<P> {
        self.shared.state.borrow().binding.context.clone()
    }

    pub fn tick_count(&self) -> u64 {
        self.shared.state.borrow().ticks
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.shared.config
    }
}

impl<P: Platform> Drop for Visualizer<P> {
    fn drop(&mut self) {
        self.shared.stop();
        if let Some(subscription) = self.subscription.take() {
            self.shared.platform.unsubscribe(subscription);
        }
        if let Ok(mut effects) = self.shared.effects.try_borrow_mut() {
            for effect in effects.iter_mut() {
                effect.hide();
            }
            effects.clear();
        }
    }
}
