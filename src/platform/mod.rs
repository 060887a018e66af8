//! Capabilities the controller needs from its host.
//!
//! The controller never talks to a browser directly. It is handed a
//! [`Platform`] at construction, which bundles three capabilities: creating
//! audio contexts, scheduling frame callbacks and reporting page visibility.

pub mod headless;

use crate::Result;

/// Whether the host page is currently in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// A frequency analyser node.
pub trait Analyser: 'static {
    /// Writes the current frequency magnitudes into `out`. Bins the analyser
    /// does not produce are left untouched.
    fn frequency_data(&self, out: &mut [u8]);
}

/// Handle onto a host audio context and the graph operations it offers.
///
/// Implementations are cheap clones of an underlying host object.
pub trait AudioContext: Clone + 'static {
    /// A playable media handle (an `<audio>` element in the browser).
    type Element: Clone + 'static;
    type Source: 'static;
    type Analyser: Analyser;

    /// Creates an analyser producing `bins` frequency magnitudes per snapshot.
    fn create_analyser(&self, bins: usize) -> Result<Self::Analyser>;

    /// Creates a detached media element loading `url`.
    fn create_element(&self, url: &str, cross_origin: Option<&str>) -> Result<Self::Element>;

    fn set_element_source(&self, element: &Self::Element, url: &str) -> Result<()>;

    /// Derives a source node that plays `element` through this context.
    fn element_source(&self, element: &Self::Element) -> Result<Self::Source>;

    /// Connects `source` to both `analyser` and the context output.
    fn connect(&self, source: &Self::Source, analyser: &Self::Analyser) -> Result<()>;

    fn disconnect(&self, source: &Self::Source);

    /// Decodes encoded audio and builds a buffer source from it.
    ///
    /// `done` is called exactly once. It may run before `decode` returns.
    fn decode(&self, data: Vec<u8>, done: Box<dyn FnOnce(Result<Self::Source>)>);
}

/// Creates audio contexts.
pub trait ContextFactory {
    type Context: AudioContext;

    /// Fails with [`crate::VisualizerError::UnsupportedPlatform`] when the host
    /// has no audio API.
    fn create_context(&self) -> Result<Self::Context>;
}

/// Schedules callbacks for the next display frame.
pub trait FrameScheduler {
    type Handle: Copy + std::fmt::Debug + 'static;

    fn request_frame(&self, callback: Box<dyn FnOnce()>) -> Result<Self::Handle>;

    /// A cancelled callback must never run.
    fn cancel_frame(&self, handle: Self::Handle);
}

/// Reports foreground/background transitions of the host page.
pub trait VisibilityNotifier {
    type Subscription: 'static;

    /// Returns `None` when the host cannot report visibility.
    fn subscribe(&self, listener: Box<dyn FnMut(Visibility)>) -> Option<Self::Subscription>;

    fn unsubscribe(&self, subscription: Self::Subscription);
}

/// Everything a [`crate::Visualizer`] needs from its host.
pub trait Platform: ContextFactory + FrameScheduler + VisibilityNotifier + 'static {}

impl<T> Platform for T where T: ContextFactory + FrameScheduler + VisibilityNotifier + 'static {}
