use image::RgbImage;

use crate::core::coords::{ScreenPoint, ScreenRect};
use crate::settings::{RgbColor, ScanSettings};

/// Seed search: vertical step and the horizontal fallback step.
const SEED_STEP_Y: usize = 20;
const SEED_STEP_X: usize = 10;
const SEED_SCAN_START: f32 = 0.60;
const SEED_SCAN_END: f32 = 0.90;
const SEED_ROW: f32 = 0.73;

/// Share of the prompt area (from its far corner) searched for the generate button.
const BUTTON_SCAN_WIDTH: f32 = 0.25;
const BUTTON_SCAN_HEIGHT: f32 = 0.50;

fn color_at(frame: &RgbImage, x: i32, y: i32) -> Option<RgbColor> {
    if x < 0 || y < 0 || x >= frame.width() as i32 || y >= frame.height() as i32 {
        return None;
    }
    let p = frame.get_pixel(x as u32, y as u32);
    Some((p[0], p[1], p[2]))
}

fn matches(frame: &RgbImage, x: i32, y: i32, target: RgbColor) -> bool {
    color_at(frame, x, y) == Some(target)
}

fn find_seed(frame: &RgbImage, target: RgbColor) -> Option<(i32, i32)> {
    let (w, h) = (frame.width() as i32, frame.height() as i32);
    let seed_x = w / 2;
    let start_y = (h as f32 * SEED_SCAN_START) as i32;
    let end_y = (h as f32 * SEED_SCAN_END) as i32;

    // Down the center column
    for y in (start_y..end_y).step_by(SEED_STEP_Y) {
        if matches(frame, seed_x, y, target) {
            tracing::debug!(x = seed_x, y, "prompt seed found scanning down");
            return Some((seed_x, y));
        }
    }

    // Up from the bottom edge
    let mut y = h - SEED_STEP_Y as i32;
    while y > start_y && y >= 0 {
        if matches(frame, seed_x, y, target) {
            tracing::debug!(x = seed_x, y, "prompt seed found scanning up");
            return Some((seed_x, y));
        }
        y -= SEED_STEP_Y as i32;
    }

    // Sideways along a likely row
    let row = (h as f32 * SEED_ROW) as i32;
    for offset in (0..w / 4).step_by(SEED_STEP_X) {
        for sign in [0, 1, -1] {
            if offset == 0 && sign != 0 {
                continue;
            }
            let x = seed_x + offset * sign;
            if matches(frame, x, row, target) {
                tracing::debug!(x, y = row, "prompt seed found scanning sideways");
                return Some((x, row));
            }
        }
    }

    None
}

/// Locate the prompt input: a solid area of the exact target color, grown from a seed.
///
/// The frame must be a full-screen capture, so frame coordinates are screen
/// coordinates. The grown area is rejected when its size is outside the
/// configured fractions of the screen.
pub fn find_prompt_area(frame: &RgbImage, scan: &ScanSettings) -> Option<ScreenRect> {
    let target = scan.prompt_area_color;
    let (w, h) = (frame.width() as i32, frame.height() as i32);
    let (seed_x, seed_y) = find_seed(frame, target)?;

    let mut left = seed_x;
    while left > 0 && matches(frame, left - 1, seed_y, target) {
        left -= 1;
    }
    let mut right = seed_x;
    while right < w - 1 && matches(frame, right + 1, seed_y, target) {
        right += 1;
    }

    let mid_x = (left + right) / 2;
    let mut top = seed_y;
    while top > 0 && matches(frame, mid_x, top - 1, target) {
        top -= 1;
    }
    let mut bottom = seed_y;
    while bottom < h - 1 && matches(frame, mid_x, bottom + 1, target) {
        bottom += 1;
    }

    if right <= left || bottom <= top {
        tracing::debug!(left, right, top, bottom, "prompt area has no extent");
        return None;
    }

    let width = right - left + 1;
    let height = bottom - top + 1;
    let min_w = (w as f32 * scan.min_width_fraction) as i32;
    let max_w = (w as f32 * scan.max_width_fraction) as i32;
    let min_h = (h as f32 * scan.min_height_fraction) as i32;
    let max_h = (h as f32 * scan.max_height_fraction) as i32;

    if !(min_w..=max_w).contains(&width) || !(min_h..=max_h).contains(&height) {
        tracing::debug!(
            width, height, min_w, max_w, min_h, max_h,
            "candidate area rejected by size"
        );
        return None;
    }

    Some(ScreenRect::new(left, top, width, height))
}

/// Where to click inside the prompt area: centered, a fixed share down from the top.
pub fn prompt_click_point(rect: ScreenRect, scan: &ScanSettings, screen_w: i32, screen_h: i32) -> ScreenPoint {
    ScreenPoint::new(
        rect.x + rect.width / 2,
        rect.y + (rect.height as f32 * scan.prompt_click_fraction) as i32,
    )
    .clamped(screen_w, screen_h)
}

/// Locate the generate button inside the far corner of the prompt area.
///
/// Columns are walked right to left and, within a column, rows bottom to top.
/// The first pixel of the exact button color wins, nudged inward by the bias.
pub fn find_generate_button(frame: &RgbImage, prompt: ScreenRect, scan: &ScanSettings) -> Option<ScreenPoint> {
    let target = scan.generate_button_color;

    let x_start = prompt.x + prompt.width - 1;
    let x_stop = prompt.x.max(prompt.x + (prompt.width as f32 * (1.0 - BUTTON_SCAN_WIDTH)) as i32);
    let y_start = prompt.y + prompt.height - 1;
    let y_stop = prompt.y.max(prompt.y + (prompt.height as f32 * (1.0 - BUTTON_SCAN_HEIGHT)) as i32);

    for x in (x_stop..=x_start).rev() {
        for y in (y_stop..=y_start).rev() {
            if matches(frame, x, y, target) {
                tracing::debug!(x, y, "generate button color found");
                return Some(ScreenPoint::new(
                    (x - scan.button_click_bias).max(0),
                    (y - scan.button_click_bias).max(0),
                ));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const GRAY: Rgb<u8> = Rgb([30, 30, 30]);
    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    const BUTTON: Rgb<u8> = Rgb([41, 25, 32]);

    fn frame_with(rects: &[(ScreenRect, Rgb<u8>)]) -> RgbImage {
        let mut frame = RgbImage::from_pixel(1000, 800, GRAY);
        for (r, color) in rects {
            for y in r.y..r.y + r.height {
                for x in r.x..r.x + r.width {
                    frame.put_pixel(x as u32, y as u32, *color);
                }
            }
        }
        frame
    }

    #[test]
    fn test_prompt_area_found_under_center() {
        let area = ScreenRect::new(200, 520, 600, 160);
        let frame = frame_with(&[(area, WHITE)]);
        assert_eq!(find_prompt_area(&frame, &ScanSettings::default()), Some(area));
    }

    #[test]
    fn test_prompt_area_found_by_sideways_scan() {
        let area = ScreenRect::new(20, 500, 400, 150);
        let frame = frame_with(&[(area, WHITE)]);
        assert_eq!(find_prompt_area(&frame, &ScanSettings::default()), Some(area));
    }

    #[test]
    fn test_prompt_area_rejected_when_too_wide() {
        let bar = ScreenRect::new(0, 500, 1000, 150);
        let frame = frame_with(&[(bar, WHITE)]);
        assert_eq!(find_prompt_area(&frame, &ScanSettings::default()), None);
        assert_eq!(find_prompt_area(&frame_with(&[]), &ScanSettings::default()), None);
    }

    #[test]
    fn test_prompt_click_point_is_upper_third() {
        let rect = ScreenRect::new(200, 520, 600, 160);
        let p = prompt_click_point(rect, &ScanSettings::default(), 1000, 800);
        assert_eq!(p, ScreenPoint::new(500, 568));
    }

    #[test]
    fn test_generate_button_scan_from_far_corner() {
        let area = ScreenRect::new(200, 520, 600, 160);
        let button = ScreenRect::new(760, 650, 20, 10);
        let frame = frame_with(&[(area, WHITE), (button, BUTTON)]);

        let found = find_generate_button(&frame, area, &ScanSettings::default());
        assert_eq!(found, Some(ScreenPoint::new(777, 657)));
    }

    #[test]
    fn test_generate_button_outside_scan_window_is_missed() {
        let area = ScreenRect::new(200, 520, 600, 160);
        // Left half of the area is never scanned
        let button = ScreenRect::new(300, 650, 20, 10);
        let frame = frame_with(&[(area, WHITE), (button, BUTTON)]);
        assert_eq!(find_generate_button(&frame, area, &ScanSettings::default()), None);
    }
}
