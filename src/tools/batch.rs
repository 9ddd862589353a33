use std::fmt;
use std::path::PathBuf;

use crate::automation::context::{secs_to_duration, AutomationContext};
use crate::automation::interaction::click_at;
use crate::automation::locator::{default_strategies, Element, Locator};
use crate::calibration::CoordinateCache;
use crate::core::control::{RunControl, TaskState};
use crate::core::desktop::Desktop;
use crate::core::ocr::TextRecognizer;
use crate::core::worker::EventSink;
use crate::environment::{BrowserLauncher, EgressProbe, RegionSwitcher};
use crate::error::{AutomationError, AutomationResult};
use crate::prompts::PromptBatch;
use crate::settings::AppSettings;
use crate::tools::prompt_sequence::run_prompt;

pub type DesktopFactory = Box<dyn FnOnce() -> AutomationResult<Box<dyn Desktop>> + Send>;
pub type RecognizerFactory = Box<dyn FnOnce() -> AutomationResult<Box<dyn TextRecognizer>> + Send>;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadingPrompts,
    PreparingEnvironment,
    PreparingPage,
    ProcessingPrompts,
    Finished,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::LoadingPrompts => "loading prompts",
            Stage::PreparingEnvironment => "preparing environment",
            Stage::PreparingPage => "preparing page",
            Stage::ProcessingPrompts => "processing prompts",
            Stage::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of a run; its `Display` is the summary line.
#[derive(Debug, Clone, PartialEq)]
pub enum RunSummary {
    Completed {
        processed: usize,
        total: usize,
        stopped: bool,
    },
    PromptLoadFailed(String),
    EnvironmentFailure {
        stage: Stage,
        reason: String,
    },
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunSummary::Completed {
                processed,
                total,
                stopped,
            } => {
                if *stopped {
                    write!(f, "Stopped by user. ")?;
                }
                write!(f, "Processed {}/{}.", processed, total)
            }
            RunSummary::PromptLoadFailed(reason) => write!(f, "Prompt loading failed: {}", reason),
            RunSummary::EnvironmentFailure { stage, reason } => {
                write!(f, "Environment failure ({}): {}", stage, reason)
            }
        }
    }
}

/// Which part of the prompt file to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub prompt_file: PathBuf,
    pub start: usize,
    pub end: usize,
}

/// External collaborators of a run. `switcher` is `None` when region switching is off.
pub struct Collaborators {
    pub probe: Box<dyn EgressProbe>,
    pub browser: Box<dyn BrowserLauncher>,
    pub switcher: Option<Box<dyn RegionSwitcher>>,
}

/// One batch run, moved onto the worker thread.
///
/// The desktop and the OCR engine are built there through the factories, since
/// only the worker may touch the screen.
pub struct BatchRunner {
    settings: AppSettings,
    request: BatchRequest,
    collaborators: Collaborators,
    open_desktop: Option<DesktopFactory>,
    load_recognizer: Option<RecognizerFactory>,
    stage: Stage,
    processed: usize,
    total: usize,
    region_connected: bool,
}

impl BatchRunner {
    pub fn new(
        settings: AppSettings,
        request: BatchRequest,
        collaborators: Collaborators,
        open_desktop: DesktopFactory,
        load_recognizer: RecognizerFactory,
    ) -> Self {
        Self {
            settings,
            request,
            collaborators,
            open_desktop: Some(open_desktop),
            load_recognizer: Some(load_recognizer),
            stage: Stage::LoadingPrompts,
            processed: 0,
            total: 0,
            region_connected: false,
        }
    }

    /// Execute the whole run. Every exit path, a stop included, passes through
    /// the same cleanup.
    pub fn run(mut self, control: RunControl, events: EventSink) -> RunSummary {
        let result = self.execute(&control, &events);

        if self.region_connected {
            if let Some(switcher) = self.collaborators.switcher.as_mut() {
                if !switcher.disconnect(&events) {
                    events.error("VPN disconnect failed; disconnect manually.");
                }
            }
        }

        let stage = self.stage;
        self.stage = Stage::Finished;
        let summary = match result {
            Ok(summary) => summary,
            Err(AutomationError::Cancelled) => RunSummary::Completed {
                processed: self.processed,
                total: self.total,
                stopped: true,
            },
            Err(e) => RunSummary::EnvironmentFailure {
                stage,
                reason: e.to_string(),
            },
        };
        tracing::info!(%summary, "run finished");
        summary
    }

    fn execute(&mut self, control: &RunControl, events: &EventSink) -> AutomationResult<RunSummary> {
        self.stage = Stage::LoadingPrompts;
        events.status("Loading prompts...");
        let batch = match PromptBatch::load(&self.request.prompt_file, self.request.start, self.request.end) {
            Ok(batch) => batch,
            Err(e) => {
                events.error(format!("Prompt loading failed: {}", e));
                return Ok(RunSummary::PromptLoadFailed(e.to_string()));
            }
        };
        self.total = batch.len();
        events.status(format!(
            "Loaded {} prompts (lines {}-{}).",
            batch.len(),
            batch.start,
            batch.end
        ));
        events.progress(0, self.total);
        events.image_count(0, self.total);
        control.checkpoint()?;

        self.stage = Stage::PreparingEnvironment;
        let desktop = match self.open_desktop.take() {
            Some(open) => open()?,
            None => return Err(AutomationError::Internal("desktop already consumed".to_string())),
        };
        let recognizer = match self.load_recognizer.take().map(|load| load()) {
            Some(Ok(recognizer)) => Some(recognizer),
            Some(Err(e)) => {
                events.error(format!("OCR unavailable, only cached positions can be used: {}", e));
                None
            }
            None => None,
        };
        let mut ctx = AutomationContext::new(desktop, control.clone(), events.clone());
        let cache = CoordinateCache::load(&self.settings.paths.coordinate_cache);
        if cache.is_empty() {
            events.status("No saved coordinates; elements will be searched on screen.");
        } else {
            events.status(format!(
                "Using {} saved coordinates from {}.",
                cache.len(),
                cache.path().display()
            ));
        }
        let mut locator = Locator::new(
            cache,
            recognizer,
            self.settings.scan.clone(),
            &self.settings.paths.debug_dir,
        );

        if let Some(reason) = self.prepare_region(control, events)? {
            return Ok(self.environment_failure(reason));
        }
        if let Some(reason) = self.open_browser(&ctx)? {
            return Ok(self.environment_failure(reason));
        }

        self.stage = Stage::PreparingPage;
        if let Some(reason) = self.open_tool(&mut ctx, &mut locator)? {
            return Ok(self.environment_failure(reason));
        }

        self.stage = Stage::ProcessingPrompts;
        let total = batch.len();
        for (index, prompt) in batch.prompts.iter().enumerate() {
            ctx.checkpoint()?;
            let line = batch.start + index;
            ctx.status(format!("Processing prompt #{} ({}/{})", line, index + 1, total));
            ctx.events.image_count(index + 1, total);

            match run_prompt(&mut ctx, &mut locator, &self.settings, prompt) {
                Ok(()) => {
                    self.processed += 1;
                    ctx.events.progress(self.processed, total);
                    tracing::info!(line, processed = self.processed, total, "prompt done");
                }
                Err(AutomationError::Cancelled) => return Err(AutomationError::Cancelled),
                Err(e) => ctx.error(format!("Prompt #{} skipped: {}", line, e)),
            }

            ctx.checkpoint()?;
            if index + 1 < total {
                ctx.wait_secs(self.settings.timing.inter_prompt_delay_secs)?;
            }
        }

        Ok(RunSummary::Completed {
            processed: self.processed,
            total: self.total,
            stopped: control.state() == TaskState::StopRequested,
        })
    }

    fn environment_failure(&self, reason: String) -> RunSummary {
        RunSummary::EnvironmentFailure {
            stage: self.stage,
            reason,
        }
    }

    /// Switch the egress region when needed. `Some(reason)` ends the run.
    fn prepare_region(&mut self, control: &RunControl, events: &EventSink) -> AutomationResult<Option<String>> {
        let region = &self.settings.region;
        let Some(switcher) = self.collaborators.switcher.as_mut() else {
            events.status("Region switch disabled.");
            return Ok(None);
        };
        let target = region.target_country.to_uppercase();

        events.status("Checking the current egress location...");
        match self.collaborators.probe.egress() {
            Some(info) if info.country_code == target => {
                events.status(format!("Already in {} (IP {}); region switch skipped.", target, info.ip));
                return Ok(None);
            }
            Some(info) => events.status(format!("Current country {}, switching to {}.", info.country_code, target)),
            None => events.error("Current egress location unknown; trying the region switch anyway."),
        }
        control.checkpoint()?;

        self.region_connected = switcher.connect(control, events)?;
        if self.region_connected {
            return Ok(None);
        }
        if region.required {
            Ok(Some(format!("could not switch the region to {}", target)))
        } else {
            events.error(format!("Region switch to {} failed; continuing without it.", target));
            Ok(None)
        }
    }

    fn open_browser(&self, ctx: &AutomationContext) -> AutomationResult<Option<String>> {
        let url = &self.settings.page.target_url;
        ctx.status(format!("Opening {} ...", url));
        if !self.collaborators.browser.open(url) {
            return Ok(Some(format!("browser could not open {}", url)));
        }

        let total = secs_to_duration(self.settings.timing.browser_load_wait_secs);
        let step = secs_to_duration(self.settings.timing.browser_countdown_step_secs);
        let mut remaining = total;
        while !remaining.is_zero() {
            ctx.status(format!("Waiting for the page to load... {}s left", remaining.as_secs()));
            let slice = if step.is_zero() { remaining } else { remaining.min(step) };
            ctx.wait(slice)?;
            remaining -= slice;
        }
        ctx.checkpoint()?;
        Ok(None)
    }

    /// Press the "open tool" button once so the prompt UI appears.
    fn open_tool(&self, ctx: &mut AutomationContext, locator: &mut Locator) -> AutomationResult<Option<String>> {
        ctx.status("Preparing the page...");
        ctx.wait_secs(self.settings.page.settle_wait_secs)?;

        let strategies = default_strategies(Element::OpenToolButton, &self.settings);
        let Some(button) = locator.locate(ctx, Element::OpenToolButton, &strategies)? else {
            return Ok(Some(format!(
                "'{}' button not found on the page",
                self.settings.page.open_tool_text
            )));
        };
        click_at(ctx, button.point)?;
        ctx.status(format!(
            "Clicked '{}'; waiting for the tool to load...",
            self.settings.page.open_tool_text
        ));
        ctx.wait_secs(self.settings.page.tool_load_wait_secs)?;
        Ok(None)
    }
}
