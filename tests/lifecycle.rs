#![cfg(not(target_arch = "wasm32"))]

use std::cell::RefCell;
use std::rc::Rc;

use vizualizer::platform::headless::{HeadlessElement, HeadlessPlatform, HeadlessSource};
use vizualizer::platform::ContextFactory;
use vizualizer::{
    Effect, EffectError, EffectHooks, Visibility, Visualizer, VisualizerConfig, VisualizerError,
};

type Journal = Rc<RefCell<Vec<String>>>;

/// Records every hook call and every buffer it is handed.
struct Probe {
    name: &'static str,
    journal: Journal,
    frames: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl Probe {
    fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: journal.clone(),
            frames: Rc::default(),
        }
    }

    fn log(&self, hook: &str) {
        self.journal.borrow_mut().push(format!("{}.{hook}", self.name));
    }
}

impl Effect for Probe {
    fn render(&mut self, samples: &[u8]) -> Result<(), EffectError> {
        self.log("render");
        self.frames.borrow_mut().push(samples.to_vec());
        Ok(())
    }

    fn show(&mut self) {
        self.log("show");
    }

    fn hide(&mut self) {
        self.log("hide");
    }
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.borrow().clone()
}

fn count(journal: &Journal, entry: &str) -> usize {
    journal.borrow().iter().filter(|e| *e == entry).count()
}

fn element_visualizer(platform: &HeadlessPlatform, frame: &[u8], len: usize) -> Visualizer<HeadlessPlatform> {
    let element = HeadlessElement::new("song.ogg");
    element.set_frame(frame);
    Visualizer::with_element(platform.clone(), element, VisualizerConfig::with_buffer_length(len))
        .unwrap()
}

#[test]
fn effects_render_in_insertion_order() {
    let platform = HeadlessPlatform::new();
    let journal = Journal::default();
    let mut viz = element_visualizer(&platform, &[1, 2, 3], 8);
    viz.add_effect(Probe::new("a", &journal)).unwrap();
    viz.add_effect(Probe::new("b", &journal)).unwrap();
    viz.add_effect(Probe::new("c", &journal)).unwrap();

    viz.start().unwrap();
    assert_eq!(platform.run_frame(), 1);

    assert_eq!(
        entries(&journal),
        ["a.show", "b.show", "c.show", "a.render", "b.render", "c.render"]
    );
}

#[test]
fn removing_hides_once_and_shifts_later_effects_down() {
    let platform = HeadlessPlatform::new();
    let journal = Journal::default();
    let mut viz = element_visualizer(&platform, &[], 4);
    for name in ["a", "b", "c"] {
        viz.add_effect(Probe::new(name, &journal)).unwrap();
    }

    viz.remove_effect(1).unwrap();
    assert_eq!(count(&journal, "b.hide"), 1);
    assert_eq!(viz.effect_count().unwrap(), 2);

    journal.borrow_mut().clear();
    viz.start().unwrap();
    platform.run_frame();
    assert_eq!(entries(&journal), ["a.render", "c.render"]);

    // index 1 is now "c"
    viz.remove_effect(1).unwrap();
    assert_eq!(count(&journal, "c.hide"), 1);

    match viz.remove_effect(5) {
        Err(VisualizerError::IndexOutOfRange { index: 5, len: 1 }) => {}
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
    assert_eq!(viz.effect_count().unwrap(), 1);
}

#[test]
fn changing_an_effect_hides_the_old_one_before_showing_the_new() {
    let platform = HeadlessPlatform::new();
    let journal = Journal::default();
    let mut viz = element_visualizer(&platform, &[], 4);
    viz.add_effect(Probe::new("a", &journal)).unwrap();
    viz.add_effect(Probe::new("b", &journal)).unwrap();
    viz.start().unwrap();
    platform.run_frame();
    journal.borrow_mut().clear();

    viz.change_effect(Probe::new("c", &journal), 1).unwrap();
    assert_eq!(entries(&journal), ["b.hide", "c.show"]);

    platform.run_frames(3);
    assert_eq!(count(&journal, "b.render"), 0);
    assert_eq!(count(&journal, "c.render"), 3);
    assert_eq!(count(&journal, "a.render"), 3);
}

#[test]
fn changing_an_effect_out_of_range_is_an_error() {
    let platform = HeadlessPlatform::new();
    let journal = Journal::default();
    let mut viz = element_visualizer(&platform, &[], 4);
    viz.add_effect(Probe::new("a", &journal)).unwrap();

    let err = viz.change_effect(Probe::new("d", &journal), 7).err().unwrap();
    assert!(matches!(err, VisualizerError::IndexOutOfRange { index: 7, len: 1 }));
    assert_eq!(count(&journal, "d.show"), 0);
    assert_eq!(count(&journal, "a.hide"), 0);
    assert_eq!(viz.effect_count().unwrap(), 1);
}

#[test]
fn change_effect_at_zero_replaces_the_first_effect() {
    let platform = HeadlessPlatform::new();
    let journal = Journal::default();
    let mut viz = element_visualizer(&platform, &[], 4);
    viz.add_effect(Probe::new("a", &journal)).unwrap();
    viz.change_effect(Probe::new("b", &journal), 0).unwrap();
    assert_eq!(entries(&journal), ["a.show", "a.hide", "b.show"]);
}

#[test]
fn incomplete_effects_are_rejected_at_registration() {
    let platform = HeadlessPlatform::new();
    let mut viz = element_visualizer(&platform, &[], 4);
    viz.add_effect(EffectHooks::new().render(|_| Ok(())).show(|| {}).hide(|| {}))
        .unwrap();

    let incomplete = [
        EffectHooks::new().show(|| {}).hide(|| {}),
        EffectHooks::new().render(|_| Ok(())).hide(|| {}),
        EffectHooks::new().render(|_| Ok(())).show(|| {}),
    ];
    for hooks in incomplete {
        let err = viz.add_effect(hooks).unwrap_err();
        assert!(matches!(err, VisualizerError::ContractViolation { .. }));
        assert_eq!(viz.effect_count().unwrap(), 1);
    }

    let err = viz
        .change_effect(EffectHooks::new().render(|_| Ok(())), 0)
        .err().unwrap();
    assert!(matches!(err, VisualizerError::ContractViolation { .. }));
}

#[test]
fn nothing_renders_after_stop() {
    let platform = HeadlessPlatform::new();
    let journal = Journal::default();
    let mut viz = element_visualizer(&platform, &[], 4);
    viz.add_effect(Probe::new("a", &journal)).unwrap();

    viz.start().unwrap();
    platform.run_frames(2);
    assert!(viz.stop());

    platform.run_frames(10);
    assert_eq!(count(&journal, "a.render"), 2);
    assert_eq!(platform.pending_frames(), 0);
    assert!(!viz.is_running());
}

#[test]
fn restarting_keeps_a_single_loop() {
    let platform = HeadlessPlatform::new();
    let journal = Journal::default();
    let mut viz = element_visualizer(&platform, &[], 4);
    viz.add_effect(Probe::new("a", &journal)).unwrap();

    viz.start().unwrap();
    viz.stop();
    viz.start().unwrap();
    assert!(!viz.start().unwrap());
    assert_eq!(platform.pending_frames(), 1);

    platform.run_frames(4);
    assert_eq!(count(&journal, "a.render"), 4);
    assert_eq!(platform.pending_frames(), 1);
}

type Slot = Rc<RefCell<Option<Visualizer<HeadlessPlatform>>>>;

#[test]
fn restarting_from_inside_render_keeps_a_single_loop() {
    let platform = HeadlessPlatform::new();
    let slot: Slot = Rc::default();
    *slot.borrow_mut() = Some(element_visualizer(&platform, &[], 4));
    let renders = Rc::new(RefCell::new(0));

    let (s, r) = (slot.clone(), renders.clone());
    let effect = EffectHooks::new()
        .render(move |_| {
            *r.borrow_mut() += 1;
            if *r.borrow() == 1 {
                let viz = s.borrow();
                let viz = viz.as_ref().unwrap();
                assert!(viz.stop());
                assert!(viz.start().unwrap());
            }
            Ok(())
        })
        .show(|| {})
        .hide(|| {});
    {
        let mut viz = slot.borrow_mut();
        let viz = viz.as_mut().unwrap();
        viz.add_effect(effect).unwrap();
        viz.start().unwrap();
    }

    platform.run_frame();
    assert_eq!(platform.pending_frames(), 1);
    platform.run_frames(3);
    assert_eq!(*renders.borrow(), 4);

    let viz = slot.borrow_mut().take().unwrap();
    assert!(viz.stop());
    assert_eq!(platform.pending_frames(), 0);
}

#[test]
fn effect_list_is_busy_while_rendering() {
    let platform = HeadlessPlatform::new();
    let slot: Slot = Rc::default();
    *slot.borrow_mut() = Some(element_visualizer(&platform, &[], 4));
    let outcomes = Rc::new(RefCell::new(Vec::new()));

    let (s, o) = (slot.clone(), outcomes.clone());
    let effect = EffectHooks::new()
        .render(move |_| {
            let mut viz = s.borrow_mut();
            let viz = viz.as_mut().unwrap();
            let added = viz.add_effect(EffectHooks::new().render(|_| Ok(())).show(|| {}).hide(|| {}));
            o.borrow_mut().push(matches!(added, Err(VisualizerError::Busy)));
            o.borrow_mut().push(matches!(viz.pop_effect(), Err(VisualizerError::Busy)));
            o.borrow_mut().push(matches!(viz.effect_count(), Err(VisualizerError::Busy)));
            Ok(())
        })
        .show(|| {})
        .hide(|| {});
    {
        let mut viz = slot.borrow_mut();
        let viz = viz.as_mut().unwrap();
        viz.add_effect(effect).unwrap();
        viz.start().unwrap();
    }

    platform.run_frame();
    assert_eq!(*outcomes.borrow(), vec![true, true, true]);

    let viz = slot.borrow_mut().take().unwrap();
    assert_eq!(viz.effect_count().unwrap(), 1);
    assert!(viz.is_running());
}

#[test]
fn popping_drains_the_list_from_the_end() {
    let platform = HeadlessPlatform::new();
    let journal = Journal::default();
    let mut viz = element_visualizer(&platform, &[], 4);
    viz.add_effect(Probe::new("a", &journal)).unwrap();
    viz.add_effect(Probe::new("b", &journal)).unwrap();

    viz.pop_effect().unwrap();
    assert_eq!(count(&journal, "b.hide"), 1);
    assert_eq!(count(&journal, "a.hide"), 0);
    assert_eq!(viz.effect_count().unwrap(), 1);

    viz.pop_effect().unwrap();
    assert_eq!(count(&journal, "a.hide"), 1);
    assert_eq!(viz.effect_count().unwrap(), 0);

    assert!(matches!(viz.pop_effect(), Err(VisualizerError::EmptyList)));
}

#[test]
fn failed_decode_is_reported_once_and_renders_silence() {
    let platform = HeadlessPlatform::new();
    let journal = Journal::default();
    let mut viz =
        Visualizer::with_array_buffer(platform.clone(), Vec::new(), VisualizerConfig::with_buffer_length(16))
            .unwrap();
    let decode_failures = Rc::new(RefCell::new(0));
    let failures = decode_failures.clone();
    viz.set_error_handler(move |err| {
        if matches!(err, VisualizerError::Decode(_)) {
            *failures.borrow_mut() += 1;
        }
    });
    let probe = Probe::new("a", &journal);
    let frames = probe.frames.clone();
    viz.add_effect(probe).unwrap();
    viz.start().unwrap();

    platform.run_frame();
    assert_eq!(platform.complete_decodes(), 1);
    platform.run_frames(3);

    assert_eq!(*decode_failures.borrow(), 1);
    assert!(!viz.has_source());
    assert_eq!(frames.borrow().len(), 4);
    assert!(frames.borrow().iter().all(|f| *f == vec![0; 16]));
    assert!(viz.is_running());
}

#[test]
fn every_render_gets_the_requested_length() {
    let platform = HeadlessPlatform::new();
    let journal = Journal::default();
    let loud: Vec<u8> = (0..2048).map(|i| (i % 251) as u8).collect();
    let mut viz = element_visualizer(&platform, &loud, 512);
    let probe = Probe::new("a", &journal);
    let frames = probe.frames.clone();
    viz.add_effect(probe).unwrap();

    viz.start().unwrap();
    platform.run_frames(5);
    viz.load_array_buffer(vec![7; 100]);
    platform.complete_decodes();
    platform.run_frames(5);

    assert_eq!(frames.borrow().len(), 10);
    assert!(frames.borrow().iter().all(|f| f.len() == 512));
    assert_eq!(frames.borrow()[0][..4], loud[..4]);
    assert_eq!(frames.borrow()[9][99..101], [7, 0]);
    assert_eq!(viz.buffer_length(), 512);
}

#[test]
fn hidden_page_pauses_and_visible_page_resumes() {
    let platform = HeadlessPlatform::new();
    let journal = Journal::default();
    let mut viz = element_visualizer(&platform, &[], 4);
    viz.add_effect(Probe::new("a", &journal)).unwrap();
    viz.start().unwrap();

    platform.set_visibility(Visibility::Hidden);
    assert!(!viz.is_running());
    assert_eq!(platform.run_frames(3), 0);

    platform.set_visibility(Visibility::Visible);
    assert!(viz.is_running());
    platform.run_frames(2);
    assert_eq!(count(&journal, "a.render"), 2);
}

#[test]
fn visibility_does_not_restart_a_loop_the_caller_stopped() {
    let platform = HeadlessPlatform::new();
    let viz = element_visualizer(&platform, &[], 4);

    viz.start().unwrap();
    platform.set_visibility(Visibility::Hidden);
    viz.stop();
    platform.set_visibility(Visibility::Visible);
    assert!(!viz.is_running());

    platform.set_visibility(Visibility::Hidden);
    platform.set_visibility(Visibility::Visible);
    assert!(!viz.is_running());
    assert_eq!(platform.pending_frames(), 0);
}

#[test]
fn each_visualizer_subscribes_to_visibility_once() {
    let platform = HeadlessPlatform::new();
    let first = element_visualizer(&platform, &[], 4);
    let second = element_visualizer(&platform, &[], 4);
    assert_eq!(platform.listener_count(), 2);
    drop(first);
    assert_eq!(platform.listener_count(), 1);
    drop(second);
    assert_eq!(platform.listener_count(), 0);
}

#[test]
fn construction_without_audio_support_fails() {
    let platform = HeadlessPlatform::without_audio();
    assert!(matches!(
        Visualizer::with_media(platform.clone(), "a.mp3", VisualizerConfig::default()),
        Err(VisualizerError::UnsupportedPlatform)
    ));
    assert!(matches!(
        Visualizer::with_element(platform.clone(), HeadlessElement::new("a.mp3"), VisualizerConfig::default()),
        Err(VisualizerError::UnsupportedPlatform)
    ));
    assert!(matches!(
        Visualizer::with_array_buffer(platform.clone(), vec![1], VisualizerConfig::default()),
        Err(VisualizerError::UnsupportedPlatform)
    ));
    assert_eq!(platform.listener_count(), 0);
}

#[test]
fn zero_length_buffer_is_rejected_before_any_context_exists() {
    let platform = HeadlessPlatform::new();
    let result = Visualizer::with_media(platform.clone(), "a.mp3", VisualizerConfig::with_buffer_length(0));
    assert!(matches!(result, Err(VisualizerError::Config(_))));
    assert_eq!(platform.contexts_created(), 0);
}

#[test]
fn media_url_binds_a_source_immediately() {
    let platform = HeadlessPlatform::new();
    let viz = Visualizer::with_media(platform.clone(), "a.mp3", VisualizerConfig::default()).unwrap();
    assert!(viz.has_source());
    assert_eq!(viz.buffer_length(), 1024);
    assert_eq!(platform.contexts_created(), 1);
}

#[test]
fn caller_supplied_context_and_source_are_used_as_is() {
    let platform = HeadlessPlatform::new();
    let context = platform.create_context().unwrap();
    let source = HeadlessSource::for_context(&context, &[10, 20, 30]);
    let viz = Visualizer::with_context_source(
        platform.clone(),
        context.clone(),
        source.clone(),
        VisualizerConfig::with_buffer_length(4),
    )
    .unwrap();

    assert!(source.is_connected());
    assert_eq!(viz.context().id(), context.id());
    assert_eq!(platform.contexts_created(), 1);

    viz.start().unwrap();
    platform.run_frame();
    assert_eq!(viz.samples(), [10, 20, 30, 0]);

    source.set_frame(&[1, 1, 1, 1]);
    platform.run_frame();
    assert_eq!(viz.samples(), [1, 1, 1, 1]);
}

#[test]
fn source_from_another_context_is_refused() {
    let platform = HeadlessPlatform::new();
    let ours = platform.create_context().unwrap();
    let theirs = platform.create_context().unwrap();
    let source = HeadlessSource::for_context(&theirs, &[1]);
    let result = Visualizer::with_context_source(platform, ours, source, VisualizerConfig::default());
    assert!(matches!(result, Err(VisualizerError::Platform(_))));
}

#[test]
fn loading_an_element_replaces_the_source() {
    let platform = HeadlessPlatform::new();
    let context = platform.create_context().unwrap();
    let first = HeadlessSource::for_context(&context, &[5; 4]);
    let mut viz = Visualizer::with_context_source(
        platform.clone(),
        context,
        first.clone(),
        VisualizerConfig::with_buffer_length(4),
    )
    .unwrap();

    let element = HeadlessElement::new("next.ogg");
    element.set_frame(&[9; 4]);
    viz.load_element(element.clone()).unwrap();
    assert!(!first.is_connected());

    viz.start().unwrap();
    platform.run_frame();
    assert_eq!(viz.samples(), [9; 4]);

    viz.load_data_url("other.ogg").unwrap();
    assert_eq!(element.src(), "other.ogg");

    // an element only ever feeds one source node
    assert!(matches!(viz.load_element(element), Err(VisualizerError::Platform(_))));
}

#[test]
fn loading_a_context_keeps_length_and_effects_but_drops_the_source() {
    let platform = HeadlessPlatform::new();
    let journal = Journal::default();
    let mut viz = element_visualizer(&platform, &[200; 64], 64);
    viz.add_effect(Probe::new("a", &journal)).unwrap();
    viz.start().unwrap();
    platform.run_frame();
    assert_eq!(viz.samples(), vec![200; 64]);

    let fresh = platform.create_context().unwrap();
    viz.load_audio_context(fresh.clone()).unwrap();
    assert_eq!(viz.context().id(), fresh.id());
    assert!(!viz.has_source());
    assert_eq!(viz.samples(), vec![0; 64]);
    assert_eq!(viz.effect_count().unwrap(), 1);
    assert!(viz.is_running());

    // no element is bound any more, so a data url builds one on the new context
    viz.load_data_url("data:audio/ogg;base64,AAAA").unwrap();
    assert!(viz.has_source());
    platform.run_frame();
    assert_eq!(count(&journal, "a.render"), 2);
}

#[test]
fn broken_effect_does_not_stop_its_neighbours() {
    let platform = HeadlessPlatform::new();
    let journal = Journal::default();
    let mut viz = element_visualizer(&platform, &[], 4);
    let reported = Rc::new(RefCell::new(Vec::new()));
    let sink = reported.clone();
    viz.set_error_handler(move |err| sink.borrow_mut().push(err.to_string()));

    viz.add_effect(Probe::new("a", &journal)).unwrap();
    viz.add_effect(
        EffectHooks::new()
            .render(|_| Err("no canvas".into()))
            .show(|| {})
            .hide(|| {}),
    )
    .unwrap();
    viz.add_effect(Probe::new("c", &journal)).unwrap();

    viz.start().unwrap();
    platform.run_frames(2);

    assert_eq!(count(&journal, "a.render"), 2);
    assert_eq!(count(&journal, "c.render"), 2);
    assert_eq!(
        *reported.borrow(),
        ["effect 1 failed to render: no canvas", "effect 1 failed to render: no canvas"]
    );
    assert!(viz.is_running());
}

#[test]
fn clearing_hides_every_effect_in_order() {
    let platform = HeadlessPlatform::new();
    let journal = Journal::default();
    let mut viz = element_visualizer(&platform, &[], 4);
    viz.add_effect(Probe::new("a", &journal)).unwrap();
    viz.add_effect(Probe::new("b", &journal)).unwrap();
    journal.borrow_mut().clear();

    assert_eq!(viz.clear_effects().unwrap(), 2);
    assert_eq!(entries(&journal), ["a.hide", "b.hide"]);
    assert_eq!(viz.effect_count().unwrap(), 0);
}
