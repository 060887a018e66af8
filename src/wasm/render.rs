use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{window, CanvasRenderingContext2d, HtmlCanvasElement};

use crate::error::describe;
use crate::{Effect, EffectError, Result, VisualizerError};

/// Averages `samples` into `bars` buckets, each scaled to `0.0..=1.0`.
pub fn bar_levels(samples: &[u8], bars: usize) -> Vec<f64> {
    if samples.is_empty() || bars == 0 {
        return Vec::new();
    }
    let bars = bars.min(samples.len());
    (0..bars)
        .map(|i| {
            let bucket = &samples[i * samples.len() / bars..(i + 1) * samples.len() / bars];
            let sum: u32 = bucket.iter().map(|&v| u32::from(v)).sum();
            f64::from(sum) / (bucket.len() as f64 * 255.0)
        })
        .collect()
}

/// Bar graph of the spectrum drawn on a 2D canvas that tracks the window
/// size while shown.
pub struct SpectrumBars {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    bars: usize,
    color: String,
    resize: Option<Closure<dyn FnMut()>>,
}

impl SpectrumBars {
    pub fn new(canvas: HtmlCanvasElement, bars: usize, color: &str) -> Result<Self> {
        let ctx = canvas
            .get_context("2d")?
            .ok_or_else(|| VisualizerError::platform("2d canvas not supported"))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| VisualizerError::platform("context is not a CanvasRenderingContext2d"))?;
        Ok(Self {
            canvas,
            ctx,
            bars: bars.max(1),
            color: color.to_owned(),
            resize: None,
        })
    }

    fn fit_to_window(canvas: &HtmlCanvasElement) {
        let Some(window) = window() else { return };
        let size = |value: std::result::Result<JsValue, JsValue>| value.ok().and_then(|v| v.as_f64());
        if let (Some(w), Some(h)) = (size(window.inner_width()), size(window.inner_height())) {
            canvas.set_width(w as u32);
            canvas.set_height(h as u32);
        }
    }

    fn set_display(&self, display: &str) {
        if let Err(err) = self.canvas.style().set_property("display", display) {
            log::warn!("cannot set canvas display: {}", describe(&err));
        }
    }

    fn clear(&self) {
        let (w, h) = (f64::from(self.canvas.width()), f64::from(self.canvas.height()));
        self.ctx.clear_rect(0.0, 0.0, w, h);
    }
}

impl Effect for SpectrumBars {
    fn render(&mut self, samples: &[u8]) -> std::result::Result<(), EffectError> {
        self.clear();
        let levels = bar_levels(samples, self.bars);
        if levels.is_empty() {
            return Ok(());
        }
        let (w, h) = (f64::from(self.canvas.width()), f64::from(self.canvas.height()));
        let bar_w = w / levels.len() as f64;
        self.ctx.set_fill_style_str(&self.color);
        for (i, level) in levels.iter().enumerate() {
            let bar_h = level * h;
            self.ctx
                .fill_rect(i as f64 * bar_w, h - bar_h, (bar_w - 1.0).max(1.0), bar_h);
        }
        Ok(())
    }

    fn show(&mut self) {
        self.set_display("block");
        Self::fit_to_window(&self.canvas);

        let canvas = self.canvas.clone();
        let resize = Closure::wrap(Box::new(move || Self::fit_to_window(&canvas)) as Box<dyn FnMut()>);
        if let Some(window) = window() {
            if let Err(err) =
                window.add_event_listener_with_callback("resize", resize.as_ref().unchecked_ref())
            {
                log::warn!("cannot track window size: {}", describe(&err));
            }
        }
        self.resize = Some(resize);
    }

    fn hide(&mut self) {
        self.clear();
        self.set_display("none");
        if let (Some(window), Some(resize)) = (window(), self.resize.take()) {
            // The listener must be gone before its closure is dropped.
            if let Err(err) =
                window.remove_event_listener_with_callback("resize", resize.as_ref().unchecked_ref())
            {
                log::warn!("cannot stop tracking window size: {}", describe(&err));
            }
        }
    }
}
