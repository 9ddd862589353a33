use std::time::Duration;

use crate::core::control::RunControl;
use crate::core::desktop::Desktop;
use crate::core::worker::EventSink;
use crate::error::AutomationResult;

/// Automation context that bundles what every step needs: the desktop, the
/// pause/stop handle and the event channel back to the supervisor.
pub struct AutomationContext {
    pub desktop: Box<dyn Desktop>,
    pub control: RunControl,
    pub events: EventSink,
    pub screen_width: i32,
    pub screen_height: i32,
}

impl AutomationContext {
    pub fn new(desktop: Box<dyn Desktop>, control: RunControl, events: EventSink) -> Self {
        let (screen_width, screen_height) = desktop.screen_size();
        Self {
            desktop,
            control,
            events,
            screen_width,
            screen_height,
        }
    }

    pub fn checkpoint(&self) -> AutomationResult<()> {
        self.control.checkpoint()
    }

    /// Checkpointed sleep; see `RunControl::pause_for`.
    pub fn wait(&self, duration: Duration) -> AutomationResult<()> {
        self.control.pause_for(duration)
    }

    pub fn wait_secs(&self, secs: f64) -> AutomationResult<()> {
        self.wait(secs_to_duration(secs))
    }

    pub fn status(&self, message: impl Into<String>) {
        self.events.status(message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.events.error(message);
    }
}

/// Longest wait a settings value can ask for.
pub const MAX_SETTING_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Settings store seconds as floats; negative or NaN values mean no wait and
/// anything beyond `MAX_SETTING_WAIT`, infinity included, is capped to it.
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs)
        .unwrap_or(MAX_SETTING_WAIT)
        .min(MAX_SETTING_WAIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_to_duration() {
        assert_eq!(secs_to_duration(1.5), Duration::from_millis(1500));
        assert_eq!(secs_to_duration(0.0), Duration::ZERO);
        assert_eq!(secs_to_duration(-3.0), Duration::ZERO);
        assert_eq!(secs_to_duration(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn test_huge_settings_values_are_capped() {
        assert_eq!(secs_to_duration(1e20), MAX_SETTING_WAIT);
        assert_eq!(secs_to_duration(f64::INFINITY), MAX_SETTING_WAIT);
        assert_eq!(secs_to_duration(f64::MAX), MAX_SETTING_WAIT);
        // Still usable as an offset from now
        assert!(std::time::Instant::now().checked_add(secs_to_duration(1e20)).is_some());
    }
}
