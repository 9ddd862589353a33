use crate::automation::context::AutomationContext;
use crate::automation::interaction::{clear_and_type, clear_field, click_at};
use crate::automation::locator::{default_strategies, Element, Located, Locator};
use crate::automation::pixel_watch::{watch_for_change, WatchOutcome};
use crate::error::{AutomationError, AutomationResult};
use crate::settings::AppSettings;

const PREVIEW_CHARS: usize = 30;

fn preview(prompt: &str) -> String {
    let mut short: String = prompt.chars().take(PREVIEW_CHARS).collect();
    if prompt.chars().count() > PREVIEW_CHARS {
        short.push_str("...");
    }
    short
}

fn require(
    locator: &mut Locator,
    ctx: &mut AutomationContext,
    element: Element,
    settings: &AppSettings,
) -> AutomationResult<Located> {
    let strategies = default_strategies(element, settings);
    locator
        .locate(ctx, element, &strategies)?
        .ok_or_else(|| AutomationError::ElementNotFound(element.label().to_string()))
}

/// Run one prompt through the page: focus the input, type, generate, wait for
/// the result, download it and clear the input again.
///
/// Any error other than `Cancelled` fails only this prompt.
pub fn run_prompt(
    ctx: &mut AutomationContext,
    locator: &mut Locator,
    settings: &AppSettings,
    prompt: &str,
) -> AutomationResult<()> {
    ctx.status(format!("Entering prompt '{}'", preview(prompt)));

    // Focus the input. Re-located every time; the page re-renders it between prompts.
    let input = require(locator, ctx, Element::PromptInput, settings)?;
    click_at(ctx, input.point)?;
    ctx.wait_secs(settings.timing.after_prompt_click_secs)?;

    clear_and_type(ctx, prompt)?;

    let generate = require(locator, ctx, Element::GenerateButton, settings)?;
    if let Err(e) = click_at(ctx, generate.point) {
        if !e.is_cancelled() {
            ctx.error(format!(
                "Generate click at ({}, {}) failed: {}",
                generate.point.x, generate.point.y, e
            ));
            locator.invalidate(Element::GenerateButton);
        }
        return Err(e);
    }
    ctx.status("Generation started, waiting for the result...");

    match watch_for_change(ctx, &settings.watch)? {
        WatchOutcome::Changed(_) => ctx.status("Generation finished."),
        WatchOutcome::TimedOut => {
            return Err(AutomationError::Timeout(format!(
                "image generation did not finish within {}s",
                settings.watch.timeout_secs
            )))
        }
    }

    let download = require(locator, ctx, Element::DownloadButton, settings)?;
    click_at(ctx, download.point)?;
    ctx.wait_secs(settings.timing.after_download_secs)?;
    ctx.status("Download started.");

    click_at(ctx, input.point)?;
    clear_field(ctx)
}
