//! Update Controller
//!
//! Owns the loaded configuration, the topology tracker and the compositor,
//! and runs a full rebuild (re-query outputs, repaint, commit) whenever the
//! output topology changes. Everything runs on the caller's thread; a rebuild
//! always finishes before the next batch of events is looked at.

use anyhow::Result;
use tracing::{debug, error, info};
use x11rb::protocol::Event;
use x11rb::protocol::randr;

use crate::compositor::{BackgroundSink, Compositor};
use crate::config::Config;
use crate::layout::{ScreenLayout, TopologySource, TopologyTracker};
use crate::loader::{FileImageLoader, ImageLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Waiting for notifications
    Idle,
    /// Re-querying outputs and repainting
    Rebuilding,
    /// Shut down; no further rebuilds
    Stopped,
}

/// Whether `event` reports a change in output topology
pub fn is_topology_change(event: &Event) -> bool {
    match event {
        Event::RandrScreenChangeNotify(_) => true,
        Event::RandrNotify(notify) => notify.sub_code == randr::Notify::OUTPUT_CHANGE,
        _ => false,
    }
}

pub struct UpdateController<B, L = FileImageLoader> {
    backend: B,
    config: Config,
    tracker: TopologyTracker,
    compositor: Compositor<L>,
    state: ControllerState,
    rebuilds: u64,
}

impl<B, L> UpdateController<B, L>
where
    B: TopologySource + BackgroundSink,
    L: ImageLoader,
{
    pub fn new(backend: B, config: Config, compositor: Compositor<L>) -> Self {
        Self {
            backend,
            config,
            tracker: TopologyTracker::new(),
            compositor,
            state: ControllerState::Idle,
            rebuilds: 0,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn layout(&self) -> &ScreenLayout {
        self.tracker.layout()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of completed rebuilds, successful or not
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Re-query the outputs and repaint the whole background
    pub fn rebuild(&mut self) -> Result<()> {
        if self.state == ControllerState::Stopped {
            debug!("Ignoring rebuild request after shutdown");
            return Ok(());
        }

        self.state = ControllerState::Rebuilding;
        self.tracker.refresh(&self.backend);
        let result = self
            .compositor
            .redraw(self.tracker.layout(), &self.config, &mut self.backend);
        self.rebuilds += 1;
        self.state = ControllerState::Idle;

        result
    }

    /// React to a batch of X events: one rebuild if any of them is a
    /// topology change. Returns whether a rebuild ran.
    ///
    /// Rebuild failures are logged and the controller stays usable.
    pub fn handle_events(&mut self, events: &[Event]) -> bool {
        let changes = events.iter().filter(|e| is_topology_change(e)).count();
        if changes == 0 {
            return false;
        }
        self.on_topology_change(changes)
    }

    /// Run a rebuild for `notifications` coalesced topology notifications
    pub fn on_topology_change(&mut self, notifications: usize) -> bool {
        if self.state == ControllerState::Stopped {
            return false;
        }

        info!("Topology changed ({} notification(s)), rebuilding", notifications);
        if let Err(e) = self.rebuild() {
            error!("Rebuild failed: {:#}", e);
        }
        true
    }

    /// Enter the terminal state
    pub fn shutdown(&mut self) {
        info!("Update controller stopped after {} rebuild(s)", self.rebuilds);
        self.state = ControllerState::Stopped;
    }
}
