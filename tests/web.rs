#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Function, Object, Reflect};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{AudioBufferSourceNode, HtmlCanvasElement};
use wasm_bindgen_test::*;

use vizualizer::platform::{AudioContext, ContextFactory, VisibilityNotifier};
use vizualizer::wasm::{JsEffect, SpectrumBars, WebPlatform};
use vizualizer::{Effect, EffectHooks, Visualizer, VisualizerConfig, VisualizerError};

wasm_bindgen_test_configure!(run_in_browser);

fn js_effect(methods: &[&str]) -> JsValue {
    let object = Object::new();
    for name in methods {
        Reflect::set(&object, &JsValue::from_str(name), &Function::new_no_args("")).unwrap();
    }
    object.into()
}

#[wasm_bindgen_test]
fn js_object_missing_hide_violates_the_contract() {
    match JsEffect::new(js_effect(&["renderEffect", "show"])) {
        Err(VisualizerError::ContractViolation { missing }) => assert_eq!(missing, "hide()"),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("effect without hide() accepted"),
    }
}

#[wasm_bindgen_test]
fn js_object_with_every_hook_renders() {
    let mut effect = JsEffect::new(js_effect(&["render", "show", "hide"])).unwrap();
    effect.show();
    assert!(effect.render(&[1, 2, 3]).is_ok());
    effect.hide();
}

#[wasm_bindgen_test]
fn throwing_render_becomes_an_effect_error() {
    let object = Object::new();
    Reflect::set(&object, &"renderEffect".into(), &Function::new_no_args("throw new Error('nope')"))
        .unwrap();
    Reflect::set(&object, &"show".into(), &Function::new_no_args("")).unwrap();
    Reflect::set(&object, &"hide".into(), &Function::new_no_args("")).unwrap();

    let mut effect = JsEffect::new(object.into()).unwrap();
    let err = effect.render(&[0; 4]).unwrap_err();
    assert_eq!(err.to_string(), "nope");
}

#[wasm_bindgen_test]
fn browser_provides_an_audio_context_and_visibility() {
    let platform = WebPlatform::new().unwrap();
    assert!(platform.create_context().is_ok());
    let subscription = platform.subscribe(Box::new(|_| {})).expect("visibility API");
    platform.unsubscribe(subscription);
}

#[wasm_bindgen_test]
fn loop_starts_and_stops_on_the_browser_scheduler() {
    let platform = WebPlatform::new().unwrap();
    let mut viz = Visualizer::with_media(platform, "data:,", VisualizerConfig::with_buffer_length(256))
        .unwrap();
    let shown = Rc::new(RefCell::new(false));
    let s = shown.clone();
    viz.add_effect(
        EffectHooks::new()
            .render(|samples| {
                assert_eq!(samples.len(), 256);
                Ok(())
            })
            .show(move || *s.borrow_mut() = true)
            .hide(|| {}),
    )
    .unwrap();

    assert!(*shown.borrow());
    assert!(viz.start().unwrap());
    assert!(viz.is_running());
    assert!(viz.stop());
    assert!(!viz.is_running());
}

#[wasm_bindgen_test]
fn decoded_buffer_source_plays_once_connected() {
    let context = WebPlatform::new().unwrap().create_context().unwrap();
    let buffer = context.raw().create_buffer(1, 128, 44_100.0).unwrap();
    let source = context.buffer_source(&buffer).unwrap();
    let analyser = context.create_analyser(64).unwrap();
    context.connect(&source, &analyser).unwrap();

    // A buffer source can only be started once.
    let node: &AudioBufferSourceNode = source.unchecked_ref();
    assert!(node.start().is_err());
    context.disconnect(&source);
}

#[wasm_bindgen_test]
fn spectrum_bars_hide_their_canvas_again() {
    let document = web_sys::window().unwrap().document().unwrap();
    let canvas: HtmlCanvasElement = document.create_element("canvas").unwrap().unchecked_into();
    let mut bars = SpectrumBars::new(canvas.clone(), 8, "#fff").unwrap();

    bars.show();
    assert_eq!(canvas.style().get_property_value("display").unwrap(), "block");
    bars.render(&[128; 32]).unwrap();
    bars.hide();
    assert_eq!(canvas.style().get_property_value("display").unwrap(), "none");
    // A second hide has no listener left to remove.
    bars.hide();
}
