//! Area Wallpaper
//!
//! Per-output root window background for X11, kept in sync with RandR
//! topology changes.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x11rb::errors::ConnectionError;
use x11rb::protocol::Event;

use area_wallpaper::x11_async::X11EventStream;
use area_wallpaper::{Compositor, Config, UpdateController, X11Display};

/// Per-output desktop background for X11.
///
/// Paints an image or color on every monitor and repaints when monitors are
/// added, removed, resized or moved.
#[derive(Debug, Parser)]
#[command(name = "area-wallpaper", version)]
struct Cli {
    /// Configuration file (TOML). Built-in defaults are used when omitted.
    config: Option<PathBuf>,

    /// Paint once and exit instead of following topology changes
    #[arg(long)]
    once: bool,

    /// X display to connect to (defaults to $DISPLAY)
    #[arg(long)]
    display: Option<String>,
}

/// Main application state
struct WallpaperApp {
    controller: UpdateController<X11Display>,
    x11_stream: X11EventStream,
}

impl WallpaperApp {
    fn new(controller: UpdateController<X11Display>) -> Result<Self> {
        let x11_stream = X11EventStream::new(controller.backend().connection())
            .context("Failed to initialize X11 event stream")?;

        if !controller.backend().has_randr() {
            warn!("Without RandR no outputs are known; the root will be painted black");
        }

        Ok(Self {
            controller,
            x11_stream,
        })
    }

    /// Main event loop: paint once, then repaint on every batch of events
    /// containing a topology change until shutdown is requested
    async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        if let Err(e) = self.controller.rebuild() {
            error!("Initial paint failed: {:#}", e);
        }

        info!("Waiting for topology changes");

        let exit = loop {
            if let Err(e) = self.x11_stream.flush() {
                break LoopExit::ConnectionLost(e);
            }

            // Drain first; replies to our own requests may have queued events
            let events = match self.x11_stream.drain() {
                Ok(events) => events,
                Err(e) => break LoopExit::ConnectionLost(e),
            };

            if !events.is_empty() {
                for event in &events {
                    if let Event::Error(err) = event {
                        debug!("X11 error: {:?}", err);
                    }
                }
                self.controller.handle_events(&events);
                continue;
            }

            tokio::select! {
                () = self.x11_stream.wait_readable() => {}
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, cleaning up...");
                    break LoopExit::Shutdown;
                }
            }
        };

        self.controller.shutdown();
        if matches!(exit, LoopExit::Shutdown) {
            self.controller.backend().close()?;
        }
        exit.into_result()
    }
}

/// Why the event loop stopped
#[derive(Debug)]
enum LoopExit {
    /// SIGINT or SIGTERM
    Shutdown,
    ConnectionLost(ConnectionError),
}

impl LoopExit {
    /// Only a requested shutdown counts as success
    fn into_result(self) -> Result<()> {
        match self {
            LoopExit::Shutdown => Ok(()),
            LoopExit::ConnectionLost(e) => Err(e).context("X11 connection lost"),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "area_wallpaper=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    info!("Starting Area Wallpaper");

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let display = X11Display::connect(cli.display.as_deref()).context("Failed to open X display")?;
    let mut controller = UpdateController::new(display, config, Compositor::default());

    if cli.once {
        controller.rebuild().context("Failed to paint background")?;
        controller.shutdown();
        controller.backend().close()?;
        return Ok(());
    }

    // Setup signal handlers for graceful shutdown
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                }
            }
            let _ = shutdown_tx.send(()).await;
        });
    }

    let app = WallpaperApp::new(controller)?;
    app.run(shutdown_rx).await?;

    info!("Area Wallpaper exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_exits_successfully() {
        assert!(LoopExit::Shutdown.into_result().is_ok());
    }

    #[test]
    fn test_lost_connection_is_an_error() {
        let err = LoopExit::ConnectionLost(ConnectionError::UnknownError)
            .into_result()
            .unwrap_err();
        assert_eq!(err.to_string(), "X11 connection lost");
        assert!(err.downcast_ref::<ConnectionError>().is_some());
    }
}
