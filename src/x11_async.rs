//! X11 Async Event Stream
//!
//! Lets the async main loop sleep until the X connection has something to
//! read. A mio poller on a blocking thread watches the connection's file
//! descriptor and wakes the loop, which then drains events without blocking.

use anyhow::{Context, Result};
use mio::unix::SourceFd;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::errors::ConnectionError;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

/// How often the poller thread checks whether the stream was dropped
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

const X11_TOKEN: mio::Token = mio::Token(0);

pub struct X11EventStream {
    conn: Arc<RustConnection>,
    notify: Arc<Notify>,
    /// Dropping this stops the poller thread
    _task_guard: oneshot::Receiver<()>,
}

impl X11EventStream {
    /// Start watching `conn` for readability
    pub fn new(conn: Arc<RustConnection>) -> Result<Self> {
        let poll = readable_poll(conn.stream().as_raw_fd())?;
        let notify = Arc::new(Notify::new());
        let (stop, task_guard) = oneshot::channel::<()>();

        tokio::task::spawn_blocking({
            let notify = notify.clone();
            move || watch(poll, &stop, &notify)
        });

        info!("X11 event stream started");
        Ok(Self {
            conn,
            notify,
            _task_guard: task_guard,
        })
    }

    /// Take every event that is already available, without blocking.
    ///
    /// An error means the connection is gone.
    pub fn drain(&self) -> Result<Vec<Event>, ConnectionError> {
        let mut batch = Vec::new();
        while let Some(event) = self.conn.poll_for_event()? {
            batch.push(event);
        }
        Ok(batch)
    }

    /// Wait until the poller reports the connection readable
    pub async fn wait_readable(&self) {
        self.notify.notified().await;
    }

    /// Send any buffered requests to the server
    pub fn flush(&self) -> Result<(), ConnectionError> {
        self.conn.flush()
    }
}

fn readable_poll(fd: RawFd) -> Result<mio::Poll> {
    let poll = mio::Poll::new().context("Failed to create poller for the X connection")?;
    poll.registry()
        .register(&mut SourceFd(&fd), X11_TOKEN, mio::Interest::READABLE)
        .context("Failed to watch the X connection")?;
    Ok(poll)
}

/// Poller thread body. Returns once the owning stream is dropped.
fn watch(mut poll: mio::Poll, stop: &oneshot::Sender<()>, notify: &Notify) {
    let mut ready = mio::Events::with_capacity(1);
    while !stop.is_closed() {
        match poll.poll(&mut ready, Some(POLL_TIMEOUT)) {
            Ok(()) if !ready.is_empty() => notify.notify_one(),
            Ok(()) => {}
            Err(err) => warn!("Polling the X connection failed: {}", err),
        }
    }
    debug!("X11 poller stopped");
}
