//! In-memory stand-ins for the desktop, the OCR engine and the external
//! collaborators. Test builds only.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use image::{Rgb, RgbImage};

use crate::core::control::RunControl;
use crate::core::coords::{ScreenPoint, ScreenRect};
use crate::core::desktop::Desktop;
use crate::core::ocr::{TextFragment, TextRecognizer};
use crate::core::worker::EventSink;
use crate::environment::{BrowserLauncher, EgressInfo, EgressProbe, RegionSwitcher};
use crate::error::{AutomationError, AutomationResult};
use crate::settings::{AppSettings, RgbColor};

pub const BACKGROUND: Rgb<u8> = Rgb([30, 30, 30]);

/// A 1000x800 page with a white prompt area at (200,520,600,160) and a
/// generate-button block at (760,650,20,10).
pub fn synthetic_page() -> RgbImage {
    let mut frame = RgbImage::from_pixel(1000, 800, BACKGROUND);
    paint(&mut frame, ScreenRect::new(200, 520, 600, 160), Rgb([255, 255, 255]));
    paint(&mut frame, ScreenRect::new(760, 650, 20, 10), Rgb([41, 25, 32]));
    frame
}

pub fn paint(frame: &mut RgbImage, rect: ScreenRect, color: Rgb<u8>) {
    for y in rect.y..rect.y + rect.height {
        for x in rect.x..rect.x + rect.width {
            if x >= 0 && y >= 0 && (x as u32) < frame.width() && (y as u32) < frame.height() {
                frame.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

/// Defaults with every wait shortened, files under `dir` and no region switch.
pub fn fast_settings(dir: &Path) -> AppSettings {
    let mut settings = AppSettings::default();
    settings.page.settle_wait_secs = 0.0;
    settings.page.tool_load_wait_secs = 0.0;
    settings.region.enabled = false;
    settings.ocr.timeout_secs = 2.0;
    settings.watch.initial_wait_secs = 0.0;
    settings.watch.settle_secs = 0.0;
    settings.watch.poll_interval_secs = 0.01;
    settings.watch.timeout_secs = 0.05;
    settings.timing.browser_load_wait_secs = 0.0;
    settings.timing.inter_prompt_delay_secs = 0.0;
    settings.timing.after_prompt_click_secs = 0.0;
    settings.timing.after_download_secs = 0.0;
    settings.paths.coordinate_cache = dir.join("coordinates_cache.json");
    settings.paths.debug_dir = dir.join("debug");
    settings
}

pub struct FakeState {
    pub frame: RgbImage,
    /// Consumed front to back by `pixel`; `pixel_default` afterwards.
    pub pixel_script: VecDeque<Result<RgbColor, String>>,
    pub pixel_default: RgbColor,
    pub failing_clicks: Vec<ScreenPoint>,
    pub clicks: Vec<ScreenPoint>,
    pub typed: Vec<String>,
    pub clears: usize,
    pub captures: Vec<Option<ScreenRect>>,
    pub pixel_reads: usize,
    /// Simulated time each capture takes.
    pub capture_delay: Duration,
}

/// Scripted desktop. Clones share state, so a test keeps one handle while the
/// code under test owns another.
#[derive(Clone)]
pub struct FakeDesktop {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDesktop {
    pub fn new(frame: RgbImage) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                frame,
                pixel_script: VecDeque::new(),
                pixel_default: (0, 0, 0),
                failing_clicks: Vec::new(),
                clicks: Vec::new(),
                typed: Vec::new(),
                clears: 0,
                captures: Vec::new(),
                pixel_reads: 0,
                capture_delay: Duration::ZERO,
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn boxed(&self) -> Box<dyn Desktop> {
        Box::new(self.clone())
    }
}

impl Desktop for FakeDesktop {
    fn screen_size(&self) -> (i32, i32) {
        let state = self.state();
        (state.frame.width() as i32, state.frame.height() as i32)
    }

    fn capture(&mut self, region: Option<ScreenRect>) -> AutomationResult<RgbImage> {
        let delay = self.state().capture_delay;
        thread::sleep(delay);
        let mut state = self.state();
        state.captures.push(region);
        let (w, h) = (state.frame.width() as i32, state.frame.height() as i32);
        let rect = region.unwrap_or_else(|| ScreenRect::full(w, h)).clamped(w, h);
        if rect.is_empty() {
            return Err(AutomationError::Screen("empty capture region".to_string()));
        }
        Ok(image::imageops::crop_imm(
            &state.frame,
            rect.x as u32,
            rect.y as u32,
            rect.width as u32,
            rect.height as u32,
        )
        .to_image())
    }

    fn pixel(&mut self, _point: ScreenPoint) -> AutomationResult<RgbColor> {
        let mut state = self.state();
        state.pixel_reads += 1;
        match state.pixel_script.pop_front() {
            Some(Ok(color)) => Ok(color),
            Some(Err(reason)) => Err(AutomationError::Screen(reason)),
            None => Ok(state.pixel_default),
        }
    }

    fn click(&mut self, point: ScreenPoint) -> AutomationResult<()> {
        let mut state = self.state();
        if state.failing_clicks.contains(&point) {
            return Err(AutomationError::Input(format!("click rejected at ({}, {})", point.x, point.y)));
        }
        state.clicks.push(point);
        Ok(())
    }

    fn clear_field(&mut self) -> AutomationResult<()> {
        self.state().clears += 1;
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> AutomationResult<()> {
        self.state().typed.push(text.to_string());
        Ok(())
    }
}

/// Recognizer returning canned fragments; counts its calls.
#[derive(Clone, Default)]
pub struct ScriptedRecognizer {
    fragments: Vec<TextFragment>,
    calls: Arc<Mutex<usize>>,
    delay: Duration,
}

impl ScriptedRecognizer {
    pub fn new(fragments: Vec<TextFragment>) -> Self {
        Self {
            fragments,
            calls: Arc::default(),
            delay: Duration::ZERO,
        }
    }

    /// Make every recognition take `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn line(text: &str, left: i32, top: i32, right: i32, bottom: i32, confidence: f32) -> TextFragment {
        TextFragment {
            text: text.to_string(),
            left,
            top,
            right,
            bottom,
            confidence,
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&mut self, _image: &RgbImage) -> AutomationResult<Vec<TextFragment>> {
        *self.calls.lock().unwrap() += 1;
        thread::sleep(self.delay);
        Ok(self.fragments.clone())
    }
}

/// Probe that replays answers in order, then repeats the last one.
pub struct ScriptedProbe {
    answers: Mutex<VecDeque<Option<EgressInfo>>>,
    last: Mutex<Option<EgressInfo>>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedProbe {
    pub fn new(answers: Vec<Option<EgressInfo>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            last: Mutex::new(None),
            calls: Arc::default(),
        }
    }

    pub fn repeating(answer: Option<EgressInfo>) -> Self {
        let probe = Self::new(Vec::new());
        *probe.last.lock().unwrap() = answer;
        probe
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl EgressProbe for ScriptedProbe {
    fn egress(&self) -> Option<EgressInfo> {
        *self.calls.lock().unwrap() += 1;
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.answers.lock().unwrap().pop_front() {
            *last = next;
        }
        last.clone()
    }
}

#[derive(Clone, Default)]
pub struct FakeBrowser {
    pub fail: bool,
    pub opened: Arc<Mutex<Vec<String>>>,
}

impl BrowserLauncher for FakeBrowser {
    fn open(&self, url: &str) -> bool {
        self.opened.lock().unwrap().push(url.to_string());
        !self.fail
    }
}

#[derive(Clone, Default)]
pub struct FakeSwitcher {
    pub succeed: bool,
    pub connects: Arc<Mutex<usize>>,
    pub disconnects: Arc<Mutex<usize>>,
}

impl RegionSwitcher for FakeSwitcher {
    fn connect(&mut self, control: &RunControl, _events: &EventSink) -> AutomationResult<bool> {
        control.checkpoint()?;
        *self.connects.lock().unwrap() += 1;
        Ok(self.succeed)
    }

    fn disconnect(&mut self, _events: &EventSink) -> bool {
        *self.disconnects.lock().unwrap() += 1;
        true
    }
}
