pub mod control;
pub mod coords;
pub mod desktop;
pub mod hotkey;
pub mod ocr;
#[cfg(windows)]
pub mod screen_capture;
pub mod worker;
