use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::RgbImage;
use regex::Regex;

use crate::automation::context::{secs_to_duration, AutomationContext};
use crate::automation::detection::{find_generate_button, find_prompt_area, prompt_click_point};
use crate::calibration::{
    CoordinateCache, DOWNLOAD_BUTTON_CLICK, GENERATE_BUTTON_CLICK, OPEN_TOOL_CLICK, PROMPT_CLICK, PROMPT_RECT,
};
use crate::core::coords::{RelativeRegion, ScreenPoint, ScreenRect};
use crate::core::ocr::{best_match, confidence_schedule, TextRecognizer};
use crate::error::AutomationResult;
use crate::settings::{AppSettings, ScanSettings};

const OCR_RETRY_DELAY: Duration = Duration::from_millis(300);
const DEBUG_TEXT_CHARS: usize = 20;

/// UI elements of the target page the automation interacts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    OpenToolButton,
    PromptInput,
    GenerateButton,
    DownloadButton,
}

impl Element {
    pub fn cache_key(self) -> &'static str {
        match self {
            Element::OpenToolButton => OPEN_TOOL_CLICK,
            Element::PromptInput => PROMPT_CLICK,
            Element::GenerateButton => GENERATE_BUTTON_CLICK,
            Element::DownloadButton => DOWNLOAD_BUTTON_CLICK,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Element::OpenToolButton => "open tool button",
            Element::PromptInput => "prompt input",
            Element::GenerateButton => "generate button",
            Element::DownloadButton => "download button",
        }
    }
}

/// One OCR pass: a text searched in a screen region with a falling confidence ladder.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrSearch {
    pub text: String,
    pub region: RelativeRegion,
    pub initial_confidence: f32,
    pub min_confidence: f32,
    pub step: f32,
    pub timeout_secs: f64,
}

/// Ways of finding an element, tried in the order given.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Cache,
    Ocr(OcrSearch),
    /// Solid color area grown from a seed; the prompt input.
    PromptScan,
    /// Button color in the far corner of the prompt area.
    GenerateScan,
    ConfiguredDefault(ScreenPoint),
}

impl Strategy {
    fn name(&self) -> &'static str {
        match self {
            Strategy::Cache => "cache",
            Strategy::Ocr(_) => "ocr",
            Strategy::PromptScan => "prompt scan",
            Strategy::GenerateScan => "generate scan",
            Strategy::ConfiguredDefault(_) => "configured default",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateSource {
    Cache,
    Ocr,
    ColorScan,
    ConfiguredDefault,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Located {
    pub point: ScreenPoint,
    /// Area of the element when the strategy knows it.
    pub rect: Option<ScreenRect>,
    pub confidence: f32,
    pub source: LocateSource,
}

/// Result of one strategy. A miss is an ordinary value; only a stop is an error.
#[derive(Debug, Clone, PartialEq)]
pub enum LocateAttempt {
    Found(Located),
    Missed(String),
}

/// Strategies for `element` in their usual order.
pub fn default_strategies(element: Element, settings: &AppSettings) -> Vec<Strategy> {
    match element {
        Element::OpenToolButton => vec![
            Strategy::Cache,
            Strategy::Ocr(OcrSearch {
                text: settings.page.open_tool_text.clone(),
                region: settings.page.open_tool_region,
                initial_confidence: settings.ocr.precise_initial_confidence,
                min_confidence: settings.ocr.precise_min_confidence,
                step: settings.ocr.confidence_step,
                timeout_secs: settings.ocr.timeout_secs,
            }),
            Strategy::Ocr(OcrSearch {
                text: settings.page.open_tool_text.clone(),
                region: RelativeRegion::FULL,
                initial_confidence: settings.ocr.fallback_initial_confidence,
                min_confidence: settings.ocr.fallback_min_confidence,
                step: settings.ocr.confidence_step,
                timeout_secs: settings.ocr.timeout_secs,
            }),
        ],
        Element::PromptInput => vec![Strategy::Cache, Strategy::PromptScan],
        Element::GenerateButton => vec![Strategy::Cache, Strategy::GenerateScan],
        Element::DownloadButton => vec![
            Strategy::Cache,
            Strategy::ConfiguredDefault(settings.download.default_point),
        ],
    }
}

/// Resolves elements to screen coordinates and remembers dynamic finds.
pub struct Locator {
    cache: CoordinateCache,
    recognizer: Option<Box<dyn TextRecognizer>>,
    scan: ScanSettings,
    debug_dir: PathBuf,
}

impl Locator {
    pub fn new(
        cache: CoordinateCache,
        recognizer: Option<Box<dyn TextRecognizer>>,
        scan: ScanSettings,
        debug_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cache,
            recognizer,
            scan,
            debug_dir: debug_dir.into(),
        }
    }

    pub fn cache(&self) -> &CoordinateCache {
        &self.cache
    }

    /// Try `strategies` in order; the first hit wins. Hits from anything but the
    /// cache are written to the cache before returning. `Ok(None)` when every
    /// strategy missed.
    pub fn locate(
        &mut self,
        ctx: &mut AutomationContext,
        element: Element,
        strategies: &[Strategy],
    ) -> AutomationResult<Option<Located>> {
        for strategy in strategies {
            ctx.checkpoint()?;
            match self.attempt(ctx, element, strategy)? {
                LocateAttempt::Found(located) => {
                    tracing::info!(
                        element = element.label(),
                        strategy = strategy.name(),
                        x = located.point.x,
                        y = located.point.y,
                        confidence = located.confidence,
                        "element located"
                    );
                    if located.source != LocateSource::Cache {
                        self.remember(element, &located);
                    }
                    return Ok(Some(located));
                }
                LocateAttempt::Missed(reason) => {
                    tracing::debug!(element = element.label(), strategy = strategy.name(), %reason, "strategy missed");
                }
            }
        }
        ctx.error(format!("Could not locate the {}.", element.label()));
        Ok(None)
    }

    /// Forget the cached position of `element` so the next lookup searches again.
    pub fn invalidate(&mut self, element: Element) {
        if self.cache.remove(element.cache_key()) {
            tracing::info!(element = element.label(), "cached coordinate invalidated");
        }
        if element == Element::PromptInput {
            self.cache.remove(PROMPT_RECT);
        }
    }

    fn remember(&mut self, element: Element, located: &Located) {
        self.cache.insert(element.cache_key(), located.point);
        if element == Element::PromptInput {
            if let Some(rect) = located.rect {
                self.cache.insert(PROMPT_RECT, rect);
            }
        }
    }

    fn attempt(
        &mut self,
        ctx: &mut AutomationContext,
        element: Element,
        strategy: &Strategy,
    ) -> AutomationResult<LocateAttempt> {
        match strategy {
            Strategy::Cache => Ok(self.from_cache(element)),
            Strategy::Ocr(search) => self.search_text(ctx, element, search),
            Strategy::PromptScan => Ok(self.scan_prompt(ctx)),
            Strategy::GenerateScan => Ok(self.scan_generate(ctx)),
            Strategy::ConfiguredDefault(point) => Ok(LocateAttempt::Found(Located {
                point: *point,
                rect: None,
                confidence: 1.0,
                source: LocateSource::ConfiguredDefault,
            })),
        }
    }

    fn from_cache(&self, element: Element) -> LocateAttempt {
        let Some(point) = self.cache.point(element.cache_key()) else {
            return LocateAttempt::Missed("not cached".to_string());
        };
        let rect = match element {
            Element::PromptInput => self.cache.rect(PROMPT_RECT),
            _ => None,
        };
        LocateAttempt::Found(Located {
            point,
            rect,
            confidence: 1.0,
            source: LocateSource::Cache,
        })
    }

    fn scan_prompt(&self, ctx: &mut AutomationContext) -> LocateAttempt {
        let frame = match ctx.desktop.capture(None) {
            Ok(frame) => frame,
            Err(e) => return LocateAttempt::Missed(format!("capture failed: {}", e)),
        };
        match find_prompt_area(&frame, &self.scan) {
            Some(rect) => LocateAttempt::Found(Located {
                point: prompt_click_point(rect, &self.scan, ctx.screen_width, ctx.screen_height),
                rect: Some(rect),
                confidence: 1.0,
                source: LocateSource::ColorScan,
            }),
            None => LocateAttempt::Missed("no prompt-colored area of the expected size".to_string()),
        }
    }

    fn scan_generate(&self, ctx: &mut AutomationContext) -> LocateAttempt {
        let frame = match ctx.desktop.capture(None) {
            Ok(frame) => frame,
            Err(e) => return LocateAttempt::Missed(format!("capture failed: {}", e)),
        };
        let Some(prompt) = self
            .cache
            .rect(PROMPT_RECT)
            .or_else(|| find_prompt_area(&frame, &self.scan))
        else {
            return LocateAttempt::Missed("prompt area unknown".to_string());
        };
        match find_generate_button(&frame, prompt, &self.scan) {
            Some(point) => LocateAttempt::Found(Located {
                point,
                rect: None,
                confidence: 1.0,
                source: LocateSource::ColorScan,
            }),
            None => LocateAttempt::Missed("button color not found next to the prompt area".to_string()),
        }
    }

    fn search_text(
        &mut self,
        ctx: &mut AutomationContext,
        element: Element,
        search: &OcrSearch,
    ) -> AutomationResult<LocateAttempt> {
        let Some(recognizer) = self.recognizer.as_mut() else {
            return Ok(LocateAttempt::Missed("OCR engine not loaded".to_string()));
        };

        let region = if search.region == RelativeRegion::FULL {
            None
        } else {
            Some(search.region.to_screen(ctx.screen_width, ctx.screen_height))
        };
        let (origin_x, origin_y) = region.map(|r| (r.x, r.y)).unwrap_or((0, 0));
        // Paused time does not count against the search
        let budget = ctx.control.budget(secs_to_duration(search.timeout_secs));

        ctx.status(format!(
            "Searching for '{}' by OCR in region {}...",
            search.text,
            search.region.label()
        ));

        let mut last_frame: Option<RgbImage> = None;
        for threshold in confidence_schedule(search.initial_confidence, search.min_confidence, search.step) {
            ctx.checkpoint()?;
            if budget.expired() {
                break;
            }

            let frame = match ctx.desktop.capture(region) {
                Ok(frame) => frame,
                Err(e) => {
                    ctx.error(format!("OCR capture failed (threshold {:.2}): {}", threshold, e));
                    ctx.wait(OCR_RETRY_DELAY)?;
                    continue;
                }
            };
            if budget.expired() {
                last_frame = Some(frame);
                break;
            }

            match recognizer.recognize(&frame) {
                Ok(fragments) => {
                    if let Some(hit) = best_match(&fragments, &search.text, threshold) {
                        let (cx, cy) = hit.center();
                        let point = ScreenPoint::new(cx + origin_x, cy + origin_y);
                        ctx.status(format!(
                            "Text '{}' found at ({}, {}) with confidence {:.2} (threshold {:.2}).",
                            hit.text, point.x, point.y, hit.confidence, threshold
                        ));
                        return Ok(LocateAttempt::Found(Located {
                            point,
                            rect: None,
                            confidence: hit.confidence,
                            source: LocateSource::Ocr,
                        }));
                    }
                    tracing::debug!(threshold, lines = fragments.len(), "no OCR match at this threshold");
                }
                Err(e) => {
                    ctx.error(format!("OCR failed (threshold {:.2}): {}", threshold, e));
                    ctx.wait(OCR_RETRY_DELAY)?;
                }
            }
            last_frame = Some(frame);
        }

        ctx.error(format!(
            "'{}' not found by OCR in region {} (down to confidence {:.2}).",
            search.text,
            search.region.label(),
            search.min_confidence
        ));
        if let Some(frame) = last_frame {
            match save_debug_capture(&self.debug_dir, element, &search.text, &search.region, &frame) {
                Ok(path) => ctx.error(format!("Debug screenshot saved: {}", path.display())),
                Err(e) => tracing::warn!(error = %e, "debug screenshot not saved"),
            }
        }
        Ok(LocateAttempt::Missed(format!("'{}' not recognized", search.text)))
    }
}

fn file_safe(text: &str) -> String {
    let text: String = text.chars().take(DEBUG_TEXT_CHARS).collect();
    match Regex::new(r"[^A-Za-z0-9]") {
        Ok(re) => re.replace_all(&text, "_").into_owned(),
        Err(_) => "text".to_string(),
    }
}

/// File name of a failed-search screenshot: element, searched text, region and time.
pub fn debug_file_name(element: Element, text: &str, region: &RelativeRegion) -> String {
    format!(
        "debug_ocr_fail_{}_{}_{}_{}.png",
        file_safe(element.label()),
        file_safe(text),
        region.label().replace('.', ""),
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    )
}

fn save_debug_capture(
    dir: &Path,
    element: Element,
    text: &str,
    region: &RelativeRegion,
    frame: &RgbImage,
) -> Result<PathBuf, String> {
    fs::create_dir_all(dir).map_err(|e| format!("Failed to create debug directory: {}", e))?;
    let path = dir.join(debug_file_name(element, text, region));
    frame
        .save(&path)
        .map_err(|e| format!("Failed to write screenshot: {}", e))?;
    Ok(path)
}
