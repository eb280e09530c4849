//! Placement Geometry Module
//!
//! Pure functions mapping an image of a given size into an output rectangle of a
//! given size. There is one function per placement mode; `PlacementMode::place`
//! dispatches to them. Nothing here touches X11 or pixel data.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Integer pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Same rectangle moved by `(dx, dy)`
    pub fn translate(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
            ..self
        }
    }

    /// Overlapping part of two rectangles, `None` if they don't overlap
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = i64::from(self.x).max(i64::from(other.x));
        let y0 = i64::from(self.y).max(i64::from(other.y));
        let x1 = (i64::from(self.x) + i64::from(self.width))
            .min(i64::from(other.x) + i64::from(other.width));
        let y1 = (i64::from(self.y) + i64::from(self.height))
            .min(i64::from(other.y) + i64::from(other.height));

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(Rect {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

/// Region of the source image, in image pixels.
///
/// Fractional only for `ZoomedFill`, where the visible part of the image is
/// `output / scale` pixels wide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl SourceRect {
    fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: f64::from(width),
            height: f64::from(height),
        }
    }
}

/// How an image is mapped into an output rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementMode {
    /// Native size, centered; cropped when larger than the output
    #[default]
    Centered,
    /// Stretched to the output on both axes independently
    Scaled,
    /// Uniformly scaled to fit inside the output, letterboxed
    Zoomed,
    /// Uniformly scaled to cover the output, overflow cropped
    ZoomedFill,
    /// Repeated at native size from the output's top-left corner
    Tiled,
}

impl PlacementMode {
    pub const ALL: [PlacementMode; 5] = [
        PlacementMode::Centered,
        PlacementMode::Scaled,
        PlacementMode::Zoomed,
        PlacementMode::ZoomedFill,
        PlacementMode::Tiled,
    ];

    /// Name used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementMode::Centered => "centered",
            PlacementMode::Scaled => "scaled",
            PlacementMode::Zoomed => "zoomed",
            PlacementMode::ZoomedFill => "zoomed-fill",
            PlacementMode::Tiled => "tiled",
        }
    }

    /// Compute the placement of an `img_w`x`img_h` image in an
    /// `out_w`x`out_h` output. Coordinates of the result are relative to the
    /// output's top-left corner.
    pub fn place(self, img_w: u32, img_h: u32, out_w: u32, out_h: u32) -> Placement {
        if img_w == 0 || img_h == 0 || out_w == 0 || out_h == 0 {
            return Placement::Empty;
        }

        match self {
            PlacementMode::Centered => centered(img_w, img_h, out_w, out_h),
            PlacementMode::Scaled => scaled(img_w, img_h, out_w, out_h),
            PlacementMode::Zoomed => zoomed(img_w, img_h, out_w, out_h),
            PlacementMode::ZoomedFill => zoomed_fill(img_w, img_h, out_w, out_h),
            PlacementMode::Tiled => tiled(img_w, img_h, out_w, out_h),
        }
    }
}

impl fmt::Display for PlacementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a mode name is not one of the recognized ones
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown placement mode '{0}'")]
pub struct UnknownMode(pub String);

impl FromStr for PlacementMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlacementMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

/// Result of the geometry computation for one (image, output) pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Nothing to draw
    Empty,
    /// Single copy of `src` drawn into `dst`
    Blit(Blit),
    /// Image repeated across the output
    Tiled(Tiling),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blit {
    pub src: SourceRect,
    pub dst: Rect,
}

impl Blit {
    /// Horizontal and vertical scale factors from source to destination
    pub fn scale(&self) -> (f64, f64) {
        (
            f64::from(self.dst.width) / self.src.width,
            f64::from(self.dst.height) / self.src.height,
        )
    }
}

/// Tiling instruction: `columns` x `rows` copies of a `tile_width` x
/// `tile_height` image, clipped to an `area_width` x `area_height` region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tiling {
    pub tile_width: u32,
    pub tile_height: u32,
    pub columns: u32,
    pub rows: u32,
    pub area_width: u32,
    pub area_height: u32,
}

impl Tiling {
    /// Destination rectangle of every tile, row by row.
    ///
    /// Tiles on the right and bottom edges are clipped to what remains of the
    /// area; a tile whose clipped size is not positive is skipped. The source
    /// of each tile is the top-left `width` x `height` part of the image.
    pub fn tiles(&self) -> impl Iterator<Item = Rect> {
        let t = *self;
        (0..t.rows).flat_map(move |row| {
            (0..t.columns).filter_map(move |col| {
                let x = i64::from(col) * i64::from(t.tile_width);
                let y = i64::from(row) * i64::from(t.tile_height);
                let width = (i64::from(t.area_width) - x).min(i64::from(t.tile_width));
                let height = (i64::from(t.area_height) - y).min(i64::from(t.tile_height));
                if width <= 0 || height <= 0 {
                    return None;
                }
                Some(Rect::new(x as i32, y as i32, width as u32, height as u32))
            })
        })
    }
}

/// Offsets and visible length on one axis without scaling: `(src, dst, len)`
fn center_axis(img: u32, out: u32) -> (u32, u32, u32) {
    if out >= img {
        (0, (out - img) / 2, img)
    } else {
        ((img - out) / 2, 0, out)
    }
}

fn centered(img_w: u32, img_h: u32, out_w: u32, out_h: u32) -> Placement {
    let (src_x, dst_x, width) = center_axis(img_w, out_w);
    let (src_y, dst_y, height) = center_axis(img_h, out_h);

    Placement::Blit(Blit {
        src: SourceRect {
            x: f64::from(src_x),
            y: f64::from(src_y),
            width: f64::from(width),
            height: f64::from(height),
        },
        dst: Rect::new(dst_x as i32, dst_y as i32, width, height),
    })
}

fn scaled(img_w: u32, img_h: u32, out_w: u32, out_h: u32) -> Placement {
    Placement::Blit(Blit {
        src: SourceRect::full(img_w, img_h),
        dst: Rect::new(0, 0, out_w, out_h),
    })
}

fn zoomed(img_w: u32, img_h: u32, out_w: u32, out_h: u32) -> Placement {
    let scale = (f64::from(out_w) / f64::from(img_w)).min(f64::from(out_h) / f64::from(img_h));
    let width = scaled_len(img_w, scale, out_w);
    let height = scaled_len(img_h, scale, out_h);

    Placement::Blit(Blit {
        src: SourceRect::full(img_w, img_h),
        dst: Rect::new(
            ((out_w - width) / 2) as i32,
            ((out_h - height) / 2) as i32,
            width,
            height,
        ),
    })
}

fn zoomed_fill(img_w: u32, img_h: u32, out_w: u32, out_h: u32) -> Placement {
    let scale = (f64::from(out_w) / f64::from(img_w)).max(f64::from(out_h) / f64::from(img_h));
    let src_w = (f64::from(out_w) / scale).min(f64::from(img_w));
    let src_h = (f64::from(out_h) / scale).min(f64::from(img_h));

    Placement::Blit(Blit {
        src: SourceRect {
            x: (f64::from(img_w) - src_w) / 2.0,
            y: (f64::from(img_h) - src_h) / 2.0,
            width: src_w,
            height: src_h,
        },
        dst: Rect::new(0, 0, out_w, out_h),
    })
}

fn tiled(img_w: u32, img_h: u32, out_w: u32, out_h: u32) -> Placement {
    Placement::Tiled(Tiling {
        tile_width: img_w,
        tile_height: img_h,
        columns: out_w.div_ceil(img_w),
        rows: out_h.div_ceil(img_h),
        area_width: out_w,
        area_height: out_h,
    })
}

/// `len * scale` rounded to whole pixels, kept within `1..=limit`
fn scaled_len(len: u32, scale: f64, limit: u32) -> u32 {
    ((f64::from(len) * scale).round() as u32).clamp(1, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn blit(placement: Placement) -> Blit {
        match placement {
            Placement::Blit(b) => b,
            other => panic!("expected a blit, got {:?}", other),
        }
    }

    fn tiling(placement: Placement) -> Tiling {
        match placement {
            Placement::Tiled(t) => t,
            other => panic!("expected tiling, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_dimensions_are_empty() {
        for mode in PlacementMode::ALL {
            assert_eq!(mode.place(0, 10, 100, 100), Placement::Empty);
            assert_eq!(mode.place(10, 0, 100, 100), Placement::Empty);
            assert_eq!(mode.place(10, 10, 0, 100), Placement::Empty);
            assert_eq!(mode.place(10, 10, 100, 0), Placement::Empty);
        }
    }

    #[test]
    fn test_centered_smaller_image() {
        let b = blit(PlacementMode::Centered.place(800, 600, 1920, 1080));
        assert_eq!(b.dst, Rect::new(560, 240, 800, 600));
        assert_eq!(b.src, SourceRect { x: 0.0, y: 0.0, width: 800.0, height: 600.0 });
        assert_eq!(b.scale(), (1.0, 1.0));
    }

    #[test]
    fn test_centered_crops_larger_image() {
        let b = blit(PlacementMode::Centered.place(2000, 1200, 1920, 1080));
        assert_eq!(b.dst, Rect::new(0, 0, 1920, 1080));
        assert_eq!(b.src.x, 40.0);
        assert_eq!(b.src.y, 60.0);
        assert_eq!(b.src.width, 1920.0);
        assert_eq!(b.src.height, 1080.0);
    }

    #[test]
    fn test_centered_mixed_axes() {
        // Wider but shorter than the output
        let b = blit(PlacementMode::Centered.place(3000, 500, 1920, 1080));
        assert_eq!(b.dst, Rect::new(0, 290, 1920, 500));
        assert_eq!(b.src.x, 540.0);
        assert_eq!(b.src.y, 0.0);
    }

    #[test]
    fn test_scaled_fills_output_exactly() {
        let b = blit(PlacementMode::Scaled.place(640, 480, 1280, 1440));
        assert_eq!(b.dst, Rect::new(0, 0, 1280, 1440));
        let (sx, sy) = b.scale();
        assert_eq!(sx * 640.0, 1280.0);
        assert_eq!(sy * 480.0, 1440.0);
    }

    #[test]
    fn test_zoomed_letterboxes_horizontally() {
        let b = blit(PlacementMode::Zoomed.place(800, 600, 1920, 1080));
        assert_eq!(b.dst, Rect::new(240, 0, 1440, 1080));
        let (sx, sy) = b.scale();
        assert!((sx - 1.8).abs() < EPS);
        assert!((sy - 1.8).abs() < EPS);
    }

    #[test]
    fn test_zoomed_letterboxes_vertically() {
        let b = blit(PlacementMode::Zoomed.place(1000, 250, 1000, 1000));
        assert_eq!(b.dst, Rect::new(0, 375, 1000, 250));
    }

    #[test]
    fn test_zoomed_fill_crops_vertically() {
        let b = blit(PlacementMode::ZoomedFill.place(800, 600, 1920, 1080));
        assert_eq!(b.dst, Rect::new(0, 0, 1920, 1080));
        assert!((b.src.x - 0.0).abs() < EPS);
        assert!((b.src.width - 800.0).abs() < EPS);
        assert!((b.src.height - 450.0).abs() < EPS);
        assert!((b.src.y - 75.0).abs() < EPS);
    }

    #[test]
    fn test_zoomed_fill_crops_horizontally() {
        let b = blit(PlacementMode::ZoomedFill.place(1000, 500, 500, 500));
        assert!((b.src.width - 500.0).abs() < EPS);
        assert!((b.src.x - 250.0).abs() < EPS);
        assert!((b.src.height - 500.0).abs() < EPS);
        assert!((b.src.y - 0.0).abs() < EPS);
    }

    #[test]
    fn test_tiled_clips_last_column_and_row() {
        let t = tiling(PlacementMode::Tiled.place(100, 100, 250, 80));
        assert_eq!(t.columns, 3);
        assert_eq!(t.rows, 1);

        let tiles: Vec<Rect> = t.tiles().collect();
        assert_eq!(
            tiles,
            vec![
                Rect::new(0, 0, 100, 80),
                Rect::new(100, 0, 100, 80),
                Rect::new(200, 0, 50, 80),
            ]
        );
    }

    #[test]
    fn test_tiled_exact_multiple() {
        let t = tiling(PlacementMode::Tiled.place(64, 64, 128, 192));
        assert_eq!((t.columns, t.rows), (2, 3));
        assert_eq!(t.tiles().count(), 6);
        assert!(t.tiles().all(|r| r.width == 64 && r.height == 64));
    }

    #[test]
    fn test_tiles_skip_non_positive_remainder() {
        // One row more than the area needs
        let t = Tiling {
            tile_width: 100,
            tile_height: 100,
            columns: 2,
            rows: 3,
            area_width: 200,
            area_height: 200,
        };
        let tiles: Vec<Rect> = t.tiles().collect();
        assert_eq!(tiles.len(), 4);
        assert!(tiles.iter().all(|r| !r.is_empty()));
    }

    #[test]
    fn test_destination_within_output() {
        let sizes = [1u32, 3, 99, 100, 640, 1023, 1920, 4000];
        for mode in PlacementMode::ALL {
            for &iw in &sizes {
                for &ih in &sizes {
                    for &(ow, oh) in &[(1920u32, 1080u32), (1080, 1920), (7, 5), (1024, 768)] {
                        let output = Rect::new(0, 0, ow, oh);
                        match mode.place(iw, ih, ow, oh) {
                            Placement::Blit(b) => {
                                assert!(b.dst.x >= 0 && b.dst.y >= 0, "{mode} {iw}x{ih}");
                                assert_eq!(output.intersect(&b.dst), Some(b.dst));
                                assert!(b.src.x >= 0.0 && b.src.y >= 0.0);
                                assert!(b.src.x + b.src.width <= f64::from(iw) + EPS);
                                assert!(b.src.y + b.src.height <= f64::from(ih) + EPS);
                            }
                            Placement::Tiled(t) => {
                                for tile in t.tiles() {
                                    assert_eq!(output.intersect(&tile), Some(tile));
                                }
                            }
                            Placement::Empty => panic!("unexpected empty placement"),
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_mode_names_case_insensitive() {
        assert_eq!("Zoomed-Fill".parse::<PlacementMode>(), Ok(PlacementMode::ZoomedFill));
        assert_eq!("TILED".parse::<PlacementMode>(), Ok(PlacementMode::Tiled));
        assert_eq!("centered".parse::<PlacementMode>(), Ok(PlacementMode::Centered));
        assert!("stretch".parse::<PlacementMode>().is_err());
        assert!("zoomed_fill".parse::<PlacementMode>().is_err());
    }

    #[test]
    fn test_unknown_mode_message() {
        let err = "stretch".parse::<PlacementMode>().unwrap_err();
        assert_eq!(err, UnknownMode("stretch".into()));
        assert_eq!(err.to_string(), "unknown placement mode 'stretch'");

        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn test_rect_intersect() {
        let a = Rect::new(0, 0, 100, 100);
        assert_eq!(a.intersect(&Rect::new(50, 50, 100, 100)), Some(Rect::new(50, 50, 50, 50)));
        assert_eq!(a.intersect(&Rect::new(100, 0, 10, 10)), None);
        assert_eq!(a.intersect(&Rect::new(-10, -10, 20, 20)), Some(Rect::new(0, 0, 10, 10)));
    }
}
