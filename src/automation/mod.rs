pub mod context;
pub mod detection;
pub mod interaction;
pub mod locator;
pub mod pixel_watch;
