use std::time::Duration;

use crate::automation::context::{secs_to_duration, AutomationContext};
use crate::error::AutomationResult;
use crate::settings::{RgbColor, WatchSettings};

const MIN_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The pixel left the in-progress color; carries the color seen.
    Changed(RgbColor),
    TimedOut,
}

/// Wait for the generation to finish: poll the watched pixel until it no longer
/// shows the in-progress color.
///
/// The timeout counts polling time actually waited, so a pause does not use it
/// up. A failed pixel read is retried after twice the poll interval.
pub fn watch_for_change(ctx: &mut AutomationContext, watch: &WatchSettings) -> AutomationResult<WatchOutcome> {
    let timeout = secs_to_duration(watch.timeout_secs);
    let interval = secs_to_duration(watch.poll_interval_secs).max(MIN_POLL);

    ctx.wait_secs(watch.initial_wait_secs)?;

    let mut waited = Duration::ZERO;
    loop {
        ctx.checkpoint()?;
        let delay = match ctx.desktop.pixel(watch.pixel) {
            Ok(color) if color != watch.in_progress_color => {
                tracing::debug!(?color, waited_ms = waited.as_millis() as u64, "watched pixel changed");
                ctx.wait_secs(watch.settle_secs)?;
                return Ok(WatchOutcome::Changed(color));
            }
            Ok(_) => interval,
            Err(e) => {
                tracing::debug!(error = %e, "pixel read failed, backing off");
                interval * 2
            }
        };

        if waited >= timeout {
            tracing::warn!(
                x = watch.pixel.x,
                y = watch.pixel.y,
                timeout_secs = watch.timeout_secs,
                "watched pixel never changed"
            );
            return Ok(WatchOutcome::TimedOut);
        }
        ctx.wait(delay)?;
        waited += delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::control::RunControl;
    use crate::core::worker::EventSink;
    use crate::error::AutomationError;
    use crate::testing::{synthetic_page, FakeDesktop};
    use std::time::Instant;

    const BUSY: RgbColor = (217, 217, 217);

    fn quick_watch() -> WatchSettings {
        WatchSettings {
            in_progress_color: BUSY,
            timeout_secs: 0.1,
            poll_interval_secs: 0.02,
            initial_wait_secs: 0.0,
            settle_secs: 0.0,
            ..WatchSettings::default()
        }
    }

    fn context(desktop: &FakeDesktop) -> (AutomationContext, RunControl) {
        let control = RunControl::new();
        control.begin_run().unwrap();
        let (events, _rx) = EventSink::channel();
        (AutomationContext::new(desktop.boxed(), control.clone(), events), control)
    }

    #[test]
    fn test_times_out_when_pixel_never_changes() {
        let desktop = FakeDesktop::new(synthetic_page());
        desktop.state().pixel_default = BUSY;
        let (mut ctx, _control) = context(&desktop);

        let started = Instant::now();
        let outcome = watch_for_change(&mut ctx, &quick_watch()).unwrap();
        assert_eq!(outcome, WatchOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(desktop.state().pixel_reads >= 5);
    }

    #[test]
    fn test_returns_as_soon_as_pixel_changes() {
        let desktop = FakeDesktop::new(synthetic_page());
        {
            let mut state = desktop.state();
            state.pixel_script.extend([Ok(BUSY), Ok(BUSY), Ok((255, 255, 255))]);
            state.pixel_default = BUSY;
        }
        let (mut ctx, _control) = context(&desktop);

        let watch = WatchSettings {
            timeout_secs: 30.0,
            ..quick_watch()
        };
        let started = Instant::now();
        let outcome = watch_for_change(&mut ctx, &watch).unwrap();
        assert_eq!(outcome, WatchOutcome::Changed((255, 255, 255)));
        assert_eq!(desktop.state().pixel_reads, 3);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_read_errors_are_tolerated() {
        let desktop = FakeDesktop::new(synthetic_page());
        {
            let mut state = desktop.state();
            state
                .pixel_script
                .extend([Err("off screen".to_string()), Err("off screen".to_string())]);
            state.pixel_default = (10, 10, 10);
        }
        let (mut ctx, _control) = context(&desktop);

        let watch = WatchSettings {
            timeout_secs: 30.0,
            ..quick_watch()
        };
        assert_eq!(watch_for_change(&mut ctx, &watch).unwrap(), WatchOutcome::Changed((10, 10, 10)));
    }

    #[test]
    fn test_stop_ends_the_watch() {
        let desktop = FakeDesktop::new(synthetic_page());
        desktop.state().pixel_default = BUSY;
        let (mut ctx, control) = context(&desktop);
        control.request_stop();

        assert_eq!(watch_for_change(&mut ctx, &quick_watch()), Err(AutomationError::Cancelled));
        assert_eq!(desktop.state().pixel_reads, 0);
    }
}
