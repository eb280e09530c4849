//! Canvas Module
//!
//! Off-screen XRGB surface the compositor paints into before the result is
//! uploaded to the X server. Pixels are packed `0x00RRGGBB`.

use image::RgbImage;

use crate::geometry::{Rect, SourceRect};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

/// Horizontal sampling tap: two neighbouring columns and the weight of the second
#[derive(Debug, Clone, Copy)]
struct Tap {
    first: usize,
    second: usize,
    weight: f32,
}

impl Canvas {
    /// New canvas filled with black
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major pixel data
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y as usize * self.width as usize + x as usize])
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Fill `rect` (clipped to the canvas) with a packed color
    pub fn fill_rect(&mut self, rect: Rect, color: u32) {
        let Some(clip) = self.bounds().intersect(&rect) else {
            return;
        };

        let stride = self.width as usize;
        for y in clip.y as usize..clip.y as usize + clip.height as usize {
            let start = y * stride + clip.x as usize;
            self.pixels[start..start + clip.width as usize].fill(color);
        }
    }

    /// Copy image pixels 1:1. `dst` gives the destination position and the
    /// size of the copied region; `(src_x, src_y)` is its top-left in the image.
    pub fn copy_image(&mut self, image: &RgbImage, src_x: u32, src_y: u32, dst: Rect) {
        // Never read past the image
        let avail_w = image.width().saturating_sub(src_x);
        let avail_h = image.height().saturating_sub(src_y);
        let dst = Rect::new(dst.x, dst.y, dst.width.min(avail_w), dst.height.min(avail_h));

        let Some(clip) = self.bounds().intersect(&dst) else {
            return;
        };

        let skip_x = (clip.x - dst.x) as u32;
        let skip_y = (clip.y - dst.y) as u32;
        let raw = image.as_raw();
        let img_stride = image.width() as usize * 3;
        let stride = self.width as usize;

        for row in 0..clip.height as usize {
            let sy = (src_y + skip_y) as usize + row;
            let sx = (src_x + skip_x) as usize;
            let src = &raw[sy * img_stride + sx * 3..][..clip.width as usize * 3];
            let start = (clip.y as usize + row) * stride + clip.x as usize;
            let dst_row = &mut self.pixels[start..start + clip.width as usize];

            for (out, rgb) in dst_row.iter_mut().zip(src.chunks_exact(3)) {
                *out = pack(rgb[0], rgb[1], rgb[2]);
            }
        }
    }

    /// Draw the `src` region of `image` scaled into `dst` using bilinear
    /// filtering. Falls back to a plain copy when no scaling is involved.
    pub fn blit_image(&mut self, image: &RgbImage, src: SourceRect, dst: Rect) {
        if dst.is_empty() || src.width <= 0.0 || src.height <= 0.0 {
            return;
        }
        if image.width() == 0 || image.height() == 0 {
            return;
        }

        if is_unscaled(src, dst) {
            self.copy_image(image, src.x as u32, src.y as u32, dst);
            return;
        }

        let Some(clip) = self.bounds().intersect(&dst) else {
            return;
        };

        let scale_x = src.width / f64::from(dst.width);
        let scale_y = src.height / f64::from(dst.height);

        let taps: Vec<Tap> = (clip.x..clip.x + clip.width as i32)
            .map(|px| {
                let u = f64::from(px - dst.x) + 0.5;
                tap(src.x + u * scale_x - 0.5, image.width())
            })
            .collect();

        let raw = image.as_raw();
        let img_stride = image.width() as usize * 3;
        let stride = self.width as usize;

        for py in clip.y..clip.y + clip.height as i32 {
            let v = f64::from(py - dst.y) + 0.5;
            let row_tap = tap(src.y + v * scale_y - 0.5, image.height());
            let top = &raw[row_tap.first * img_stride..][..img_stride];
            let bottom = &raw[row_tap.second * img_stride..][..img_stride];

            let start = py as usize * stride + clip.x as usize;
            let dst_row = &mut self.pixels[start..start + clip.width as usize];

            for (out, col) in dst_row.iter_mut().zip(&taps) {
                let mut rgb = [0u8; 3];
                for (c, channel) in rgb.iter_mut().enumerate() {
                    let tl = f32::from(top[col.first * 3 + c]);
                    let tr = f32::from(top[col.second * 3 + c]);
                    let bl = f32::from(bottom[col.first * 3 + c]);
                    let br = f32::from(bottom[col.second * 3 + c]);
                    let upper = tl + (tr - tl) * col.weight;
                    let lower = bl + (br - bl) * col.weight;
                    *channel = (upper + (lower - upper) * row_tap.weight)
                        .round()
                        .clamp(0.0, 255.0) as u8;
                }
                *out = pack(rgb[0], rgb[1], rgb[2]);
            }
        }
    }
}

fn pack(r: u8, g: u8, b: u8) -> u32 {
    (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

fn is_unscaled(src: SourceRect, dst: Rect) -> bool {
    src.width == f64::from(dst.width)
        && src.height == f64::from(dst.height)
        && src.x.fract() == 0.0
        && src.y.fract() == 0.0
        && src.x >= 0.0
        && src.y >= 0.0
}

/// Sampling tap for a source coordinate along an axis of length `len`
fn tap(coord: f64, len: u32) -> Tap {
    let max = f64::from(len - 1);
    let coord = coord.clamp(0.0, max);
    let first = coord.floor();
    let second = (first + 1.0).min(max);
    Tap {
        first: first as usize,
        second: second as usize,
        weight: (coord - first) as f32,
    }
}
