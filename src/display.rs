//! Display Module
//!
//! X11 side of the wallpaper setter: the connection, RandR output enumeration,
//! uploading a composed canvas as the root window's background pixmap and
//! retaining it after exit.

use anyhow::{Context, Result, bail};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::{ConnectError, ConnectionError, ReplyError};
use x11rb::protocol::randr::{self, ConnectionExt as RandrExt};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::canvas::Canvas;
use crate::compositor::BackgroundSink;
use crate::layout::{OutputDescriptor, ScreenLayout, TopologySource};

/// Size of the PutImage request header in bytes
const PUT_IMAGE_HEADER: usize = 24;

/// Fatal errors while opening the display
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("failed to connect to X server: {0}")]
    Connect(#[from] ConnectError),

    #[error("screen {0} does not exist")]
    BadScreen(usize),

    #[error("could not find root visual {0:#x}")]
    VisualNotFound(Visualid),

    #[error("unsupported root visual: {depth}-bit {class:?}, expected 24/32-bit TrueColor")]
    UnsupportedVisual { depth: u8, class: VisualClass },

    #[error("no 32 bits-per-pixel image format for depth {0}")]
    UnsupportedPixmapFormat(u8),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Reply(#[from] ReplyError),
}

/// Atoms used for root background bookkeeping
#[derive(Debug, Clone, Copy)]
pub struct Atoms {
    pub xsetroot_id: Atom,
    pub xrootpmap_id: Atom,
    pub esetroot_pmap_id: Atom,
}

impl Atoms {
    /// Intern all required atoms
    pub fn new<C: Connection>(conn: &C) -> Result<Self, DisplayError> {
        let intern = |name: &str| -> Result<Atom, DisplayError> {
            Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
        };

        Ok(Self {
            xsetroot_id: intern("_XSETROOT_ID")?,
            xrootpmap_id: intern("_XROOTPMAP_ID")?,
            esetroot_pmap_id: intern("ESETROOT_PMAP_ID")?,
        })
    }
}

/// How packed `0x00RRGGBB` canvas pixels map onto the root visual's ZPixmap
/// bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub red_shift: u32,
    pub green_shift: u32,
    pub blue_shift: u32,
    /// Bits set on every pixel (alpha on depth-32 visuals)
    pub fixed_bits: u32,
    pub lsb_first: bool,
}

impl PixelLayout {
    fn from_visual(visual: &Visualtype, depth: u8, order: ImageOrder) -> Self {
        let color_bits = visual.red_mask | visual.green_mask | visual.blue_mask;
        Self {
            red_shift: visual.red_mask.trailing_zeros(),
            green_shift: visual.green_mask.trailing_zeros(),
            blue_shift: visual.blue_mask.trailing_zeros(),
            fixed_bits: if depth == 32 { !color_bits } else { 0 },
            lsb_first: order == ImageOrder::LSB_FIRST,
        }
    }

    /// Append the encoded form of `pixels` to `out`, four bytes per pixel
    pub fn encode(&self, pixels: &[u32], out: &mut Vec<u8>) {
        out.reserve(pixels.len() * 4);
        for &pixel in pixels {
            let r = (pixel >> 16) & 0xff;
            let g = (pixel >> 8) & 0xff;
            let b = pixel & 0xff;
            let value = (r << self.red_shift)
                | (g << self.green_shift)
                | (b << self.blue_shift)
                | self.fixed_bits;
            if self.lsb_first {
                out.extend_from_slice(&value.to_le_bytes());
            } else {
                out.extend_from_slice(&value.to_be_bytes());
            }
        }
    }
}

/// Connection to the X server plus everything needed to set the root
/// background
pub struct X11Display {
    conn: Arc<RustConnection>,
    root: Window,
    depth: u8,
    pixel_layout: PixelLayout,
    atoms: Atoms,
    /// RandR version, `None` when the extension is missing
    randr: Option<(u32, u32)>,
    /// Pixmap currently installed as the root background
    background: Option<Pixmap>,
    /// Pixmap published under `_XSETROOT_ID`
    marker: Option<Pixmap>,
}

impl X11Display {
    /// Connect to `display` (or `$DISPLAY`) and validate the root visual
    pub fn connect(display: Option<&str>) -> Result<Self, DisplayError> {
        let (conn, screen_num) = x11rb::connect(display)?;
        let conn = Arc::new(conn);

        let setup = conn.setup();
        let screen = setup
            .roots
            .get(screen_num)
            .ok_or(DisplayError::BadScreen(screen_num))?;
        let root = screen.root;
        let depth = screen.root_depth;

        info!(
            "Connected to X server, screen {}, root window 0x{:x}, {}x{} depth {}",
            screen_num, root, screen.width_in_pixels, screen.height_in_pixels, depth
        );

        let visual = screen
            .allowed_depths
            .iter()
            .filter(|d| d.depth == depth)
            .flat_map(|d| d.visuals.iter())
            .find(|v| v.visual_id == screen.root_visual)
            .ok_or(DisplayError::VisualNotFound(screen.root_visual))?;

        if visual.class != VisualClass::TRUE_COLOR || (depth != 24 && depth != 32) {
            return Err(DisplayError::UnsupportedVisual {
                depth,
                class: visual.class,
            });
        }

        let format_ok = setup
            .pixmap_formats
            .iter()
            .any(|f| f.depth == depth && f.bits_per_pixel == 32);
        if !format_ok {
            return Err(DisplayError::UnsupportedPixmapFormat(depth));
        }

        let pixel_layout = PixelLayout::from_visual(visual, depth, setup.image_byte_order);
        debug!("Root pixel layout: {:?}", pixel_layout);

        let atoms = Atoms::new(conn.as_ref())?;
        let randr = Self::init_randr(conn.as_ref(), root)?;

        Ok(Self {
            conn,
            root,
            depth,
            pixel_layout,
            atoms,
            randr,
            background: None,
            marker: None,
        })
    }

    /// Negotiate RandR and subscribe to screen and output change notifications
    fn init_randr(conn: &RustConnection, root: Window) -> Result<Option<(u32, u32)>, DisplayError> {
        if conn.extension_information(randr::X11_EXTENSION_NAME)?.is_none() {
            warn!("RandR extension not available, outputs cannot be enumerated");
            return Ok(None);
        }

        let version = conn.randr_query_version(1, 3)?.reply()?;
        info!(
            "RandR extension {}.{}",
            version.major_version, version.minor_version
        );
        if (version.major_version, version.minor_version) < (1, 2) {
            warn!("RandR 1.2 or newer is needed to enumerate outputs");
            return Ok(None);
        }

        conn.randr_select_input(
            root,
            randr::NotifyMask::SCREEN_CHANGE | randr::NotifyMask::OUTPUT_CHANGE,
        )?;
        conn.flush()?;

        Ok(Some((version.major_version, version.minor_version)))
    }

    /// Shared handle to the connection (for the event stream)
    pub fn connection(&self) -> Arc<RustConnection> {
        self.conn.clone()
    }

    pub fn has_randr(&self) -> bool {
        self.randr.is_some()
    }

    /// Flush outstanding requests before the connection is dropped.
    ///
    /// The background and marker pixmaps are left alone; with the close-down
    /// mode set to RetainPermanent they outlive the connection.
    pub fn close(&self) -> Result<()> {
        self.conn.flush()?;
        info!("X11 connection closed");
        Ok(())
    }

    /// Upload `canvas` into `pixmap` in row bands that fit a single request
    fn upload(&self, pixmap: Pixmap, canvas: &Canvas) -> Result<()> {
        let width = canvas.width() as usize;
        let row_bytes = width * 4;
        let max_bytes = self.conn.maximum_request_bytes();
        if row_bytes == 0 || row_bytes + PUT_IMAGE_HEADER > max_bytes {
            bail!("Canvas row of {} bytes does not fit a request", row_bytes);
        }
        let band_rows = (max_bytes - PUT_IMAGE_HEADER) / row_bytes;

        let gc = self.conn.generate_id()?;
        self.conn.create_gc(gc, pixmap, &CreateGCAux::new())?;

        let mut data = Vec::new();
        for (band, rows) in canvas.pixels().chunks(band_rows * width).enumerate() {
            data.clear();
            self.pixel_layout.encode(rows, &mut data);

            let y = i16::try_from(band * band_rows).context("Canvas too tall")?;
            let height = u16::try_from(rows.len() / width).context("Canvas band too tall")?;
            self.conn.put_image(
                ImageFormat::Z_PIXMAP,
                pixmap,
                gc,
                canvas.width() as u16,
                height,
                0,
                y,
                0,
                self.depth,
                &data,
            )?;
        }

        self.conn.free_gc(gc)?;
        Ok(())
    }

    /// CRTCs and config timestamp of the root screen.
    ///
    /// RandR 1.2 servers lack `GetScreenResourcesCurrent` and get the
    /// polling request instead.
    fn screen_resources(&self, version: (u32, u32)) -> Result<(Vec<randr::Crtc>, Timestamp)> {
        if has_current_resources(version) {
            let reply = self.conn.randr_get_screen_resources_current(self.root)?.reply()?;
            Ok((reply.crtcs, reply.config_timestamp))
        } else {
            let reply = self.conn.randr_get_screen_resources(self.root)?.reply()?;
            Ok((reply.crtcs, reply.config_timestamp))
        }
    }

    /// Kill the client that retained the previous background, if it isn't us
    fn kill_previous_owner(&self) -> Result<()> {
        let reply = self
            .conn
            .get_property(false, self.root, self.atoms.xsetroot_id, AtomEnum::ANY, 0, 1)?
            .reply()?;

        if reply.type_ != u32::from(AtomEnum::PIXMAP) || reply.format != 32 {
            return Ok(());
        }

        let previous = reply.value32().and_then(|mut values| values.next());
        if let Some(previous) = previous.filter(|&id| id != 0 && Some(id) != self.marker) {
            info!("Releasing previous background owner (pixmap 0x{:x})", previous);
            self.conn.kill_client(previous)?;
        }

        Ok(())
    }
}

/// `GetScreenResourcesCurrent` appeared in RandR 1.3
fn has_current_resources(version: (u32, u32)) -> bool {
    version >= (1, 3)
}

impl TopologySource for X11Display {
    fn query_outputs(&self) -> Result<ScreenLayout> {
        let Some(version) = self.randr else {
            bail!("RandR extension not available");
        };

        let (crtcs, timestamp) = self
            .screen_resources(version)
            .context("Failed to get screen resources")?;

        let mut layout = ScreenLayout::new();
        for &crtc in &crtcs {
            let crtc_info = match self.conn.randr_get_crtc_info(crtc, timestamp)?.reply() {
                Ok(info) => info,
                Err(e) => {
                    debug!("Skipping CRTC {}: {}", crtc, e);
                    continue;
                }
            };

            if crtc_info.outputs.is_empty() || crtc_info.width == 0 || crtc_info.height == 0 {
                continue;
            }

            for &output in &crtc_info.outputs {
                let output_info = match self.conn.randr_get_output_info(output, timestamp)?.reply() {
                    Ok(info) => info,
                    Err(e) => {
                        debug!("Skipping output {}: {}", output, e);
                        continue;
                    }
                };

                layout.push(OutputDescriptor {
                    name: String::from_utf8_lossy(&output_info.name).into_owned(),
                    x: i32::from(crtc_info.x),
                    y: i32::from(crtc_info.y),
                    width: u32::from(crtc_info.width),
                    height: u32::from(crtc_info.height),
                });
            }
        }

        Ok(layout)
    }
}

impl BackgroundSink for X11Display {
    fn surface_size(&self) -> Result<(u32, u32)> {
        let geometry = self.conn.get_geometry(self.root)?.reply()?;
        Ok((u32::from(geometry.width), u32::from(geometry.height)))
    }

    fn commit(&mut self, canvas: &Canvas) -> Result<()> {
        let width = u16::try_from(canvas.width()).context("Canvas too wide")?;
        let height = u16::try_from(canvas.height()).context("Canvas too tall")?;
        if width == 0 || height == 0 {
            bail!("Refusing to commit an empty {}x{} canvas", width, height);
        }

        let pixmap = self.conn.generate_id()?;
        self.conn
            .create_pixmap(self.depth, pixmap, self.root, width, height)?
            .check()
            .context("Failed to create background pixmap")?;

        if let Err(e) = self.upload(pixmap, canvas) {
            self.conn.free_pixmap(pixmap)?;
            return Err(e);
        }

        self.conn.change_window_attributes(
            self.root,
            &ChangeWindowAttributesAux::new().background_pixmap(pixmap),
        )?;
        self.conn.clear_area(false, self.root, 0, 0, 0, 0)?;

        for atom in [self.atoms.xrootpmap_id, self.atoms.esetroot_pmap_id] {
            self.conn
                .change_property32(PropMode::REPLACE, self.root, atom, AtomEnum::PIXMAP, &[pixmap])?;
        }

        if let Some(old) = self.background.replace(pixmap) {
            self.conn.free_pixmap(old)?;
        }

        self.conn.flush()?;
        debug!("Root background set to pixmap 0x{:x}", pixmap);
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        let marker = match self.marker {
            Some(marker) => marker,
            None => {
                self.kill_previous_owner()?;
                let marker = self.conn.generate_id()?;
                self.conn.create_pixmap(1, marker, self.root, 1, 1)?;
                self.marker = Some(marker);
                marker
            }
        };

        self.conn.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms.xsetroot_id,
            AtomEnum::PIXMAP,
            &[marker],
        )?;
        self.conn.set_close_down_mode(CloseDown::RETAIN_PERMANENT)?;
        self.conn.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_lsb_rgb() {
        let layout = PixelLayout {
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
            fixed_bits: 0,
            lsb_first: true,
        };
        let mut out = Vec::new();
        layout.encode(&[0x112233, 0xff0000], &mut out);
        assert_eq!(out, vec![0x33, 0x22, 0x11, 0x00, 0x00, 0x00, 0xff, 0x00]);
    }

    #[test]
    fn test_encode_msb_bgr_with_alpha() {
        let layout = PixelLayout {
            red_shift: 0,
            green_shift: 8,
            blue_shift: 16,
            fixed_bits: 0xff00_0000,
            lsb_first: false,
        };
        let mut out = Vec::new();
        layout.encode(&[0x112233], &mut out);
        assert_eq!(out, vec![0xff, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn test_layout_from_visual() {
        let visual = Visualtype {
            visual_id: 0x21,
            class: VisualClass::TRUE_COLOR,
            bits_per_rgb_value: 8,
            colormap_entries: 256,
            red_mask: 0xff0000,
            green_mask: 0x00ff00,
            blue_mask: 0x0000ff,
        };

        let layout = PixelLayout::from_visual(&visual, 24, ImageOrder::LSB_FIRST);
        assert_eq!((layout.red_shift, layout.green_shift, layout.blue_shift), (16, 8, 0));
        assert_eq!(layout.fixed_bits, 0);
        assert!(layout.lsb_first);

        let layout = PixelLayout::from_visual(&visual, 32, ImageOrder::MSB_FIRST);
        assert_eq!(layout.fixed_bits, 0xff00_0000);
        assert!(!layout.lsb_first);
    }

    #[test]
    fn test_current_resources_need_randr_1_3() {
        assert!(!has_current_resources((1, 2)));
        assert!(has_current_resources((1, 3)));
        assert!(has_current_resources((1, 6)));
        assert!(has_current_resources((2, 0)));
    }
}
