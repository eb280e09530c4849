//! Compositor Module
//!
//! Paints every output of a `ScreenLayout` onto an off-screen canvas (color
//! fill, then the placed image) and hands the finished canvas to a
//! `BackgroundSink` in a single commit.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::canvas::Canvas;
use crate::config::{Config, OutputConfig};
use crate::geometry::Placement;
use crate::layout::{OutputDescriptor, ScreenLayout};
use crate::loader::{FileImageLoader, ImageLoader};

/// Destination of the composed background
pub trait BackgroundSink {
    /// Size of the root surface, covering all outputs
    fn surface_size(&self) -> Result<(u32, u32)>;

    /// Replace the root background with `canvas` in one step
    fn commit(&mut self, canvas: &Canvas) -> Result<()>;

    /// Keep the committed background after this process exits
    fn persist(&mut self) -> Result<()>;
}

pub struct Compositor<L = FileImageLoader> {
    loader: L,
}

impl Default for Compositor<FileImageLoader> {
    fn default() -> Self {
        Self::new(FileImageLoader)
    }
}

impl<L: ImageLoader> Compositor<L> {
    pub fn new(loader: L) -> Self {
        Self { loader }
    }

    /// Compose the background for `layout` and commit it to `sink`
    pub fn redraw<S: BackgroundSink + ?Sized>(
        &self,
        layout: &ScreenLayout,
        config: &Config,
        sink: &mut S,
    ) -> Result<()> {
        let (width, height) = sink
            .surface_size()
            .context("Failed to query root surface size")?;

        let canvas = self.compose(layout, config, width, height);

        sink.commit(&canvas)
            .context("Failed to commit root background")?;
        info!(
            "Background committed: {}x{}, {} output(s)",
            width,
            height,
            layout.len()
        );

        if let Err(e) = sink.persist() {
            warn!("Failed to retain background after exit: {:#}", e);
        }

        Ok(())
    }

    /// Paint all outputs onto a fresh black `width`x`height` canvas
    pub fn compose(&self, layout: &ScreenLayout, config: &Config, width: u32, height: u32) -> Canvas {
        let mut canvas = Canvas::new(width, height);

        for output in layout {
            let settings = config.resolve(&output.name);
            self.paint_output(&mut canvas, output, &settings);
        }

        canvas
    }

    /// Fill one output with its color and draw its image on top
    fn paint_output(&self, canvas: &mut Canvas, output: &OutputDescriptor, settings: &OutputConfig) {
        let area = output.rect();
        debug!(
            "Painting {} with section '{}' (mode={}, image={:?})",
            output.name, settings.name, settings.mode, settings.image
        );

        canvas.fill_rect(area, settings.color.to_pixel());

        let Some(path) = settings.image.as_deref() else {
            return;
        };

        let image = match self.loader.load(path) {
            Ok(image) => image,
            Err(e) => {
                warn!("{}: {:#}; painting color only", output.name, e);
                return;
            }
        };

        match settings.mode.place(image.width(), image.height(), area.width, area.height) {
            Placement::Empty => {
                debug!("{}: nothing to draw", output.name);
            }
            Placement::Blit(blit) => {
                canvas.blit_image(&image, blit.src, blit.dst.translate(area.x, area.y));
            }
            Placement::Tiled(tiling) => {
                for tile in tiling.tiles() {
                    canvas.copy_image(&image, 0, 0, tile.translate(area.x, area.y));
                }
            }
        }
    }
}
