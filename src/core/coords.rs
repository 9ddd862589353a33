use serde::{Deserialize, Serialize};

/// Absolute screen position in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

impl ScreenPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Keep the point inside a `width` x `height` screen.
    pub fn clamped(self, width: i32, height: i32) -> Self {
        Self {
            x: self.x.clamp(0, (width - 1).max(0)),
            y: self.y.clamp(0, (height - 1).max(0)),
        }
    }
}

/// Axis-aligned screen rectangle (left, top, width, height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ScreenRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn full(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn center(&self) -> ScreenPoint {
        ScreenPoint::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Intersect with a `width` x `height` screen.
    pub fn clamped(&self, width: i32, height: i32) -> ScreenRect {
        let left = self.x.clamp(0, width.max(0));
        let top = self.y.clamp(0, height.max(0));
        let right = (self.x + self.width).clamp(left, width.max(0));
        let bottom = (self.y + self.height).clamp(top, height.max(0));
        ScreenRect::new(left, top, right - left, bottom - top)
    }
}

fn clamp01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Region expressed as fractions of the screen (left, top, width, height).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeRegion {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl RelativeRegion {
    pub const FULL: RelativeRegion = RelativeRegion {
        left: 0.0,
        top: 0.0,
        width: 1.0,
        height: 1.0,
    };

    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self { left, top, width, height }
    }

    /// Resolve against the actual screen size, clipped to the screen.
    pub fn to_screen(&self, screen_w: i32, screen_h: i32) -> ScreenRect {
        let left = (clamp01(self.left) * screen_w as f32).round() as i32;
        let top = (clamp01(self.top) * screen_h as f32).round() as i32;
        let mut w = (clamp01(self.width) * screen_w as f32).round() as i32;
        let mut h = (clamp01(self.height) * screen_h as f32).round() as i32;
        if left + w > screen_w {
            w = (screen_w - left).max(0);
        }
        if top + h > screen_h {
            h = (screen_h - top).max(0);
        }
        ScreenRect::new(left, top, w, h)
    }

    /// Short label used in log lines and debug file names.
    pub fn label(&self) -> String {
        if *self == Self::FULL {
            "full".to_string()
        } else {
            format!(
                "{:.2}_{:.2}_{:.2}_{:.2}",
                self.left, self.top, self.width, self.height
            )
        }
    }
}
