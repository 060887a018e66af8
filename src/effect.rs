//! The capability set every visual effect provides.
//!
//! Rust effects implement [`Effect`] and are checked by the compiler. Effects
//! assembled at runtime ([`EffectHooks`], or JavaScript objects on wasm) are
//! checked when they are registered through [`IntoEffect`].

use crate::{EffectError, Result, VisualizerError};

/// A single visual treatment of the frequency data.
pub trait Effect {
    /// Draws one frame from `samples`.
    ///
    /// The slice is only valid for the duration of the call; the controller
    /// overwrites it on the next tick. Copy it if it must outlive the call.
    fn render(&mut self, samples: &[u8]) -> std::result::Result<(), EffectError>;

    /// Called once when the effect becomes active.
    fn show(&mut self);

    /// Called once when the effect becomes inactive. Must release or hide
    /// whatever the effect has drawn.
    fn hide(&mut self);
}

impl<E: Effect + ?Sized> Effect for Box<E> {
    fn render(&mut self, samples: &[u8]) -> std::result::Result<(), EffectError> {
        (**self).render(samples)
    }

    fn show(&mut self) {
        (**self).show()
    }

    fn hide(&mut self) {
        (**self).hide()
    }
}

/// Conversion performed by the controller when an effect is registered.
pub trait IntoEffect {
    fn into_effect(self) -> Result<Box<dyn Effect>>;
}

impl<E: Effect + 'static> IntoEffect for E {
    fn into_effect(self) -> Result<Box<dyn Effect>> {
        Ok(Box::new(self))
    }
}

type RenderHook = Box<dyn FnMut(&[u8]) -> std::result::Result<(), EffectError>>;
type LifecycleHook = Box<dyn FnMut()>;

/// An effect built from closures.
///
/// Any hook may be left out while building; registering the table with a
/// missing hook fails with [`VisualizerError::ContractViolation`].
#[derive(Default)]
pub struct EffectHooks {
    render: Option<RenderHook>,
    show: Option<LifecycleHook>,
    hide: Option<LifecycleHook>,
}

impl EffectHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render<F>(mut self, f: F) -> Self
    where
        F: FnMut(&[u8]) -> std::result::Result<(), EffectError> + 'static,
    {
        self.render = Some(Box::new(f));
        self
    }

    pub fn show<F: FnMut() + 'static>(mut self, f: F) -> Self {
        self.show = Some(Box::new(f));
        self
    }

    pub fn hide<F: FnMut() + 'static>(mut self, f: F) -> Self {
        self.hide = Some(Box::new(f));
        self
    }
}

impl IntoEffect for EffectHooks {
    fn into_effect(self) -> Result<Box<dyn Effect>> {
        let render = self.render.ok_or(VisualizerError::ContractViolation {
            missing: "render(samples)",
        })?;
        let hide = self.hide.ok_or(VisualizerError::ContractViolation { missing: "hide()" })?;
        let show = self.show.ok_or(VisualizerError::ContractViolation { missing: "show()" })?;
        Ok(Box::new(HookEffect { render, show, hide }))
    }
}

struct HookEffect {
    render: RenderHook,
    show: LifecycleHook,
    hide: LifecycleHook,
}

impl Effect for HookEffect {
    fn render(&mut self, samples: &[u8]) -> std::result::Result<(), EffectError> {
        (self.render)(samples)
    }

    fn show(&mut self) {
        (self.show)()
    }

    fn hide(&mut self) {
        (self.hide)()
    }
}
