//! Layout Module
//!
//! Tracks the set of active outputs (monitors) and their rectangles in the
//! root window's coordinate space. The layout is rebuilt from scratch on every
//! topology change and replaced as a single snapshot.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::geometry::Rect;

/// One physical output and its rectangle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDescriptor {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl OutputDescriptor {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Outputs in enumeration order
pub type ScreenLayout = Vec<OutputDescriptor>;

/// Anything that can enumerate the active outputs
pub trait TopologySource {
    fn query_outputs(&self) -> Result<ScreenLayout>;
}

/// Owns the current `ScreenLayout` and rebuilds it on request
#[derive(Debug, Default)]
pub struct TopologyTracker {
    layout: ScreenLayout,
}

impl TopologyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current layout (empty until the first refresh)
    pub fn layout(&self) -> &ScreenLayout {
        &self.layout
    }

    /// Rebuild the layout from `source`.
    ///
    /// A failed query leaves an empty layout rather than an error, so the
    /// caller simply paints nothing.
    pub fn refresh<S: TopologySource + ?Sized>(&mut self, source: &S) -> &ScreenLayout {
        self.layout.clear();

        self.layout = match source.query_outputs() {
            Ok(outputs) => outputs,
            Err(e) => {
                warn!("Failed to query outputs: {:#}", e);
                ScreenLayout::new()
            }
        };

        info!("Screen layout: {} output(s)", self.layout.len());
        for output in &self.layout {
            debug!(
                "  {} {}x{}+{}+{}",
                output.name, output.width, output.height, output.x, output.y
            );
        }

        &self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Returns queued answers in order
    struct ScriptedSource {
        answers: RefCell<Vec<Result<ScreenLayout>>>,
    }

    impl ScriptedSource {
        fn new(mut answers: Vec<Result<ScreenLayout>>) -> Self {
            answers.reverse();
            Self {
                answers: RefCell::new(answers),
            }
        }
    }

    impl TopologySource for ScriptedSource {
        fn query_outputs(&self) -> Result<ScreenLayout> {
            self.answers
                .borrow_mut()
                .pop()
                .unwrap_or_else(|| Ok(ScreenLayout::new()))
        }
    }

    fn output(name: &str, x: i32, width: u32) -> OutputDescriptor {
        OutputDescriptor {
            name: name.to_string(),
            x,
            y: 0,
            width,
            height: 1080,
        }
    }

    #[test]
    fn test_refresh_replaces_whole_layout() {
        let source = ScriptedSource::new(vec![
            Ok(vec![output("eDP-1", 0, 1920), output("HDMI-1", 1920, 2560)]),
            Ok(vec![output("HDMI-1", 0, 2560)]),
        ]);
        let mut tracker = TopologyTracker::new();

        assert_eq!(tracker.refresh(&source).len(), 2);

        let layout = tracker.refresh(&source);
        assert_eq!(layout, &vec![output("HDMI-1", 0, 2560)]);
    }

    #[test]
    fn test_failed_query_gives_empty_layout() {
        let source = ScriptedSource::new(vec![
            Ok(vec![output("eDP-1", 0, 1920)]),
            Err(anyhow::anyhow!("RandR request failed")),
        ]);
        let mut tracker = TopologyTracker::new();

        tracker.refresh(&source);
        assert_eq!(tracker.layout().len(), 1);

        assert!(tracker.refresh(&source).is_empty());
        assert!(tracker.layout().is_empty());
    }

    #[test]
    fn test_descriptor_rect() {
        let o = OutputDescriptor {
            name: "DP-1".into(),
            x: -1280,
            y: 200,
            width: 1280,
            height: 1024,
        };
        assert_eq!(o.rect(), Rect::new(-1280, 200, 1280, 1024));
    }
}
