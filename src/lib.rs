//! Area Wallpaper
//!
//! Paints a background image or color per output (monitor) onto the X11 root
//! window and repaints whenever RandR reports a topology change. The geometry,
//! canvas and configuration code is independent of X11; `display` and
//! `x11_async` hold the X side.

pub mod canvas;
pub mod compositor;
pub mod config;
pub mod controller;
pub mod display;
pub mod geometry;
pub mod layout;
pub mod loader;
pub mod x11_async;

pub use compositor::{BackgroundSink, Compositor};
pub use config::{Config, ConfigError, OutputConfig, Rgb};
pub use controller::{ControllerState, UpdateController};
pub use display::{DisplayError, X11Display};
pub use geometry::{Placement, PlacementMode, Rect};
pub use layout::{OutputDescriptor, ScreenLayout, TopologySource, TopologyTracker};
pub use loader::{FileImageLoader, ImageLoader};
