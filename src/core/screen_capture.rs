use image::{ImageBuffer, Rgb, RgbImage};
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    GetPixel, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
    DIB_RGB_COLORS, SRCCOPY,
};
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

use crate::core::coords::ScreenRect;
use crate::settings::RgbColor;

/// Primary screen size in physical pixels.
pub fn screen_size() -> (i32, i32) {
    unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) }
}

/// Capture a region of the desktop using BitBlt.
/// Only visible pixels are captured; covered windows show whatever is on top.
pub fn capture_screen_region(region: ScreenRect) -> Result<RgbImage, String> {
    if region.is_empty() {
        return Err(format!("Empty capture region {:?}", region));
    }
    let (width, height) = (region.width, region.height);

    unsafe {
        let desktop = HWND(0);
        let hdc = GetDC(desktop);
        if hdc.is_invalid() {
            return Err("Failed to get screen device context".to_string());
        }

        let mem_dc = CreateCompatibleDC(hdc);
        if mem_dc.is_invalid() {
            let _ = ReleaseDC(desktop, hdc);
            return Err("Failed to create compatible DC".to_string());
        }

        let bitmap = CreateCompatibleBitmap(hdc, width, height);
        if bitmap.is_invalid() {
            let _ = DeleteDC(mem_dc);
            let _ = ReleaseDC(desktop, hdc);
            return Err("Failed to create compatible bitmap".to_string());
        }

        let old_bitmap = SelectObject(mem_dc, bitmap);

        let result = BitBlt(
            mem_dc, 0, 0, width, height, hdc, region.x, region.y, SRCCOPY,
        );

        if result.is_err() {
            let _ = SelectObject(mem_dc, old_bitmap);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem_dc);
            let _ = ReleaseDC(desktop, hdc);
            return Err("BitBlt failed - could not capture screen".to_string());
        }

        // 32 bpp keeps rows 4-byte aligned without padding
        let mut bmi = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width,
                biHeight: -height, // top-down
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0 as u32,
                biSizeImage: 0,
                biXPelsPerMeter: 0,
                biYPelsPerMeter: 0,
                biClrUsed: 0,
                biClrImportant: 0,
            },
            bmiColors: [Default::default(); 1],
        };

        let mut buffer: Vec<u8> = vec![0; (width * height * 4) as usize];

        let scan_lines = GetDIBits(
            mem_dc,
            bitmap,
            0,
            height as u32,
            Some(buffer.as_mut_ptr() as *mut _),
            &mut bmi,
            DIB_RGB_COLORS,
        );

        let _ = SelectObject(mem_dc, old_bitmap);
        let _ = DeleteObject(bitmap);
        let _ = DeleteDC(mem_dc);
        let _ = ReleaseDC(desktop, hdc);

        if scan_lines == 0 {
            return Err("Failed to get bitmap bits".to_string());
        }

        // BGRA -> RGB
        let mut img = ImageBuffer::new(width as u32, height as u32);
        for (i, px) in buffer.chunks_exact(4).enumerate() {
            let x = (i as i32 % width) as u32;
            let y = (i as i32 / width) as u32;
            img.put_pixel(x, y, Rgb([px[2], px[1], px[0]]));
        }

        Ok(img)
    }
}

/// Read one screen pixel. Fails for points outside every display.
pub fn pixel_color(x: i32, y: i32) -> Result<RgbColor, String> {
    unsafe {
        let desktop = HWND(0);
        let hdc = GetDC(desktop);
        if hdc.is_invalid() {
            return Err("Failed to get screen device context".to_string());
        }
        let color = GetPixel(hdc, x, y);
        let _ = ReleaseDC(desktop, hdc);

        // CLR_INVALID
        if color.0 == 0xFFFF_FFFF {
            return Err(format!("Pixel ({}, {}) is not readable", x, y));
        }
        // COLORREF is 0x00BBGGRR
        let value = color.0;
        Ok((
            (value & 0xFF) as u8,
            ((value >> 8) & 0xFF) as u8,
            ((value >> 16) & 0xFF) as u8,
        ))
    }
}
