use crate::automation::context::AutomationContext;
use crate::core::coords::ScreenPoint;
use crate::error::AutomationResult;

// Every simulated input is bracketed by checkpoints so a stop issued while the
// input was in flight is honoured before the next one.

pub fn click_at(ctx: &mut AutomationContext, point: ScreenPoint) -> AutomationResult<()> {
    ctx.checkpoint()?;
    tracing::debug!(x = point.x, y = point.y, "click");
    ctx.desktop.click(point)?;
    ctx.checkpoint()
}

pub fn clear_field(ctx: &mut AutomationContext) -> AutomationResult<()> {
    ctx.checkpoint()?;
    ctx.desktop.clear_field()?;
    ctx.checkpoint()
}

pub fn type_text(ctx: &mut AutomationContext, text: &str) -> AutomationResult<()> {
    ctx.checkpoint()?;
    tracing::debug!(chars = text.chars().count(), "typing");
    ctx.desktop.type_text(text)?;
    ctx.checkpoint()
}

pub fn clear_and_type(ctx: &mut AutomationContext, text: &str) -> AutomationResult<()> {
    clear_field(ctx)?;
    type_text(ctx, text)
}
