//! Software debouncing for sampled digital lines.
//!
//! The input task samples every line on a fixed cadence and feeds the raw
//! level into one detector per line. A detector only reports an edge once
//! the raw level has been steady for the debounce window, so contact
//! bounce and short glitches never reach the workflows.

use crate::config::DEBOUNCE_MS;

/// Clean transition of a debounced line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    Pressed,
    Released,
}

#[derive(Clone, Copy, Debug)]
pub struct DebounceEdgeDetector {
    window_ms: u64,
    last_raw: bool,
    stable: bool,
    last_change_ms: u64,
}

impl DebounceEdgeDetector {
    /// Detector with the default 50 ms window, starting released.
    pub const fn new() -> Self {
        Self::with_window(DEBOUNCE_MS)
    }

    pub const fn with_window(window_ms: u64) -> Self {
        Self {
            window_ms,
            last_raw: false,
            stable: false,
            last_change_ms: 0,
        }
    }

    /// Feed one raw sample taken at `now_ms` (`true` = pressed).
    ///
    /// Returns at most one edge per physical transition.
    pub fn sample(&mut self, raw: bool, now_ms: u64) -> Option<Edge> {
        if raw != self.last_raw {
            self.last_raw = raw;
            self.last_change_ms = now_ms;
            return None;
        }

        if raw == self.stable || now_ms.saturating_sub(self.last_change_ms) < self.window_ms {
            return None;
        }

        self.stable = raw;
        Some(if raw { Edge::Pressed } else { Edge::Released })
    }

    /// Current debounced level.
    pub fn is_pressed(&self) -> bool {
        self.stable
    }
}

impl Default for DebounceEdgeDetector {
    fn default() -> Self {
        Self::new()
    }
}
