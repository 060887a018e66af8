use js_sys::{Function, Reflect, Uint8Array};
use wasm_bindgen::{JsCast, JsValue};

use crate::error::describe;
use crate::{Effect, EffectError, Result, VisualizerError};

fn method(target: &JsValue, name: &str) -> Option<Function> {
    Reflect::get(target, &JsValue::from_str(name))
        .ok()?
        .dyn_into::<Function>()
        .ok()
}

/// A JavaScript object used as an effect.
///
/// The object needs `renderEffect(dataArray)` (or `render(dataArray)`),
/// `show()` and `hide()` methods. Each render receives its own copy of the
/// sample buffer.
pub struct JsEffect {
    target: JsValue,
    render: Function,
    show: Function,
    hide: Function,
}

impl JsEffect {
    pub fn new(target: JsValue) -> Result<Self> {
        let render = method(&target, "renderEffect")
            .or_else(|| method(&target, "render"))
            .ok_or(VisualizerError::ContractViolation {
                missing: "renderEffect(dataArray)",
            })?;
        let hide = method(&target, "hide").ok_or(VisualizerError::ContractViolation { missing: "hide()" })?;
        let show = method(&target, "show").ok_or(VisualizerError::ContractViolation { missing: "show()" })?;
        Ok(Self {
            target,
            render,
            show,
            hide,
        })
    }

    pub fn target(&self) -> &JsValue {
        &self.target
    }

    fn call_lifecycle(&self, hook: &Function, name: &str) {
        if let Err(err) = hook.call0(&self.target) {
            log::error!("effect {name}() threw: {}", describe(&err));
        }
    }
}

impl Effect for JsEffect {
    fn render(&mut self, samples: &[u8]) -> std::result::Result<(), EffectError> {
        let data = Uint8Array::from(samples);
        self.render.call1(&self.target, &data)?;
        Ok(())
    }

    fn show(&mut self) {
        self.call_lifecycle(&self.show, "show");
    }

    fn hide(&mut self) {
        self.call_lifecycle(&self.hide, "hide");
    }
}
