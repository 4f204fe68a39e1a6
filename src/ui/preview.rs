//! ASCII rendering of camera frames for the preview pane.

use crate::camera::Frame;

/// Density ramp from darkest (space) to brightest (@).
pub const DENSITY_RAMP: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

/// Convert an RGB frame to grayscale using the ITU-R BT.601 luminance formula.
///
/// Integer math, coefficients scaled by 1000: Y = (299R + 587G + 114B) / 1000.
pub fn to_grayscale(frame: &Frame) -> Vec<u8> {
    frame
        .data
        .chunks_exact(Frame::BYTES_PER_PIXEL)
        .map(|rgb| {
            let (r, g, b) = (rgb[0] as u32, rgb[1] as u32, rgb[2] as u32);
            ((299 * r + 587 * g + 114 * b) / 1000) as u8
        })
        .collect()
}

/// Average brightness per character cell, row-major, `cols * rows` values.
pub fn downsample(gray: &[u8], width: u32, height: u32, cols: u16, rows: u16) -> Vec<u8> {
    if cols == 0 || rows == 0 || width == 0 || height == 0 || gray.is_empty() {
        return Vec::new();
    }

    let cell_w = width as f32 / cols as f32;
    let cell_h = height as f32 / rows as f32;
    let mut cells = Vec::with_capacity(cols as usize * rows as usize);

    for cy in 0..rows {
        let y0 = (cy as f32 * cell_h) as u32;
        let y1 = (((cy + 1) as f32 * cell_h) as u32).max(y0 + 1).min(height);
        for cx in 0..cols {
            let x0 = (cx as f32 * cell_w) as u32;
            let x1 = (((cx + 1) as f32 * cell_w) as u32).max(x0 + 1).min(width);

            let mut sum = 0u32;
            let mut count = 0u32;
            for py in y0..y1 {
                for px in x0..x1 {
                    if let Some(&v) = gray.get((py * width + px) as usize) {
                        sum += v as u32;
                        count += 1;
                    }
                }
            }
            cells.push(if count > 0 { (sum / count) as u8 } else { 0 });
        }
    }

    cells
}

/// Map a brightness value onto [`DENSITY_RAMP`].
pub fn brightness_to_char(brightness: u8) -> char {
    let index = brightness as usize * (DENSITY_RAMP.len() - 1) / 255;
    DENSITY_RAMP[index]
}

/// Render `frame` as `rows` lines of `cols` characters.
///
/// Returns no lines for an empty target area or a malformed frame.
pub fn render_lines(frame: &Frame, cols: u16, rows: u16) -> Vec<String> {
    if !frame.is_well_formed() {
        return Vec::new();
    }
    let gray = to_grayscale(frame);
    let cells = downsample(&gray, frame.width, frame.height, cols, rows);
    if cells.is_empty() {
        return Vec::new();
    }

    cells
        .chunks(cols as usize)
        .map(|row| row.iter().map(|&b| brightness_to_char(b)).collect())
        .collect()
}
