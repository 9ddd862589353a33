use image::RgbImage;

use crate::core::coords::{ScreenPoint, ScreenRect};
use crate::error::AutomationResult;
use crate::settings::RgbColor;

/// Everything the worker does to the real screen goes through this trait.
///
/// Implementations are created on the worker thread and never shared, so the
/// trait does not require `Send`.
pub trait Desktop {
    /// Physical screen size (width, height).
    fn screen_size(&self) -> (i32, i32);

    /// Capture `region`, or the whole screen for `None`.
    fn capture(&mut self, region: Option<ScreenRect>) -> AutomationResult<RgbImage>;

    fn pixel(&mut self, point: ScreenPoint) -> AutomationResult<RgbColor>;

    fn click(&mut self, point: ScreenPoint) -> AutomationResult<()>;

    /// Select everything in the focused field and delete it.
    fn clear_field(&mut self) -> AutomationResult<()>;

    fn type_text(&mut self, text: &str) -> AutomationResult<()>;
}

#[cfg(windows)]
pub use self::windows_desktop::WindowsDesktop;

#[cfg(windows)]
mod windows_desktop {
    use super::*;
    use crate::core::screen_capture::{capture_screen_region, pixel_color, screen_size};
    use crate::error::AutomationError;
    use rustautogui::RustAutoGui;
    use std::thread;
    use std::time::Duration;
    use windows::Win32::UI::HiDpi::{
        SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
    };

    /// Real desktop: rustautogui for input, GDI for pixels.
    pub struct WindowsDesktop {
        gui: RustAutoGui,
        width: i32,
        height: i32,
    }

    impl WindowsDesktop {
        pub fn new() -> AutomationResult<Self> {
            // Physical pixels for capture and cursor alike
            unsafe {
                let _ = SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2);
            }

            let gui = RustAutoGui::new(false).map_err(|e| {
                AutomationError::Input(format!("Failed to initialize RustAutoGui: {}", e))
            })?;
            let (width, height) = screen_size();
            if width <= 0 || height <= 0 {
                return Err(AutomationError::Screen("screen size unavailable".to_string()));
            }
            tracing::info!(width, height, "desktop ready");
            Ok(Self { gui, width, height })
        }
    }

    impl Desktop for WindowsDesktop {
        fn screen_size(&self) -> (i32, i32) {
            (self.width, self.height)
        }

        fn capture(&mut self, region: Option<ScreenRect>) -> AutomationResult<RgbImage> {
            let rect = region
                .unwrap_or_else(|| ScreenRect::full(self.width, self.height))
                .clamped(self.width, self.height);
            capture_screen_region(rect).map_err(AutomationError::Screen)
        }

        fn pixel(&mut self, point: ScreenPoint) -> AutomationResult<RgbColor> {
            pixel_color(point.x, point.y).map_err(AutomationError::Screen)
        }

        /// Two attempts with a short pause, like a human re-click.
        fn click(&mut self, point: ScreenPoint) -> AutomationResult<()> {
            let target = point.clamped(self.width, self.height);
            let mut last_error = String::new();
            for attempt in 0..2 {
                if let Err(e) = self.gui.move_mouse_to_pos(target.x as u32, target.y as u32, 0.1) {
                    last_error = format!("move failed: {}", e);
                    if attempt == 0 {
                        thread::sleep(Duration::from_millis(50));
                    }
                    continue;
                }

                thread::sleep(Duration::from_millis(20));

                match self.gui.left_click() {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        last_error = format!("click failed: {}", e);
                        if attempt == 0 {
                            thread::sleep(Duration::from_millis(50));
                        }
                    }
                }
            }
            Err(AutomationError::Input(format!(
                "click at ({}, {}) {}",
                target.x, target.y, last_error
            )))
        }

        fn clear_field(&mut self) -> AutomationResult<()> {
            self.gui
                .keyboard_multi_key("ctrl", "a", None)
                .map_err(|e| AutomationError::Input(format!("select all failed: {}", e)))?;
            thread::sleep(Duration::from_millis(50));
            self.gui
                .keyboard_command("delete")
                .map_err(|e| AutomationError::Input(format!("delete failed: {}", e)))
        }

        fn type_text(&mut self, text: &str) -> AutomationResult<()> {
            self.gui
                .keyboard_input(text)
                .map_err(|e| AutomationError::Input(format!("Keyboard error: {}", e)))
        }
    }
}

/// Open the desktop of this platform.
#[cfg(windows)]
pub fn open_desktop() -> AutomationResult<Box<dyn Desktop>> {
    Ok(Box::new(WindowsDesktop::new()?))
}

#[cfg(not(windows))]
pub fn open_desktop() -> AutomationResult<Box<dyn Desktop>> {
    Err(crate::error::AutomationError::Screen(
        "desktop automation is only supported on Windows".to_string(),
    ))
}
