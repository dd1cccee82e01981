//! Key matrix and buttons.
//!
//! Eight matrix cells (two rows of four) plus two dedicated buttons, all
//! active-high after the sampler has accounted for wiring:
//!
//! ```text
//!          col 0      col 1      col 2      col 3
//! row 0    +type 0    +type 1    +type 2    acknowledge
//! row 1    -type 0    -type 1    -type 2    force finish
//! ```
//!
//! While a reservation is waiting for the baker, the `+type 0` cell means
//! *accept* and the `-type 0` cell means *reject*. Which meaning applies is
//! decided by one routing table keyed by confirmation phase and line, not by
//! the callers.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::config::{INPUT_LINES, MATRIX_CELLS};
use crate::confirmation::ConfirmationPhase;
use crate::context::{Command, KioskContext};
use crate::debounce::{DebounceEdgeDetector, Edge};
use crate::ports::InputSampler;

/// One physical input line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputLine {
    /// Matrix cell, row-major.
    Matrix(u8),
    Confirm,
    NewBread,
}

impl InputLine {
    pub const ALL: [InputLine; INPUT_LINES] = [
        InputLine::Matrix(0),
        InputLine::Matrix(1),
        InputLine::Matrix(2),
        InputLine::Matrix(3),
        InputLine::Matrix(4),
        InputLine::Matrix(5),
        InputLine::Matrix(6),
        InputLine::Matrix(7),
        InputLine::Confirm,
        InputLine::NewBread,
    ];

    pub fn index(self) -> usize {
        match self {
            InputLine::Matrix(n) => usize::from(n),
            InputLine::Confirm => MATRIX_CELLS,
            InputLine::NewBread => MATRIX_CELLS + 1,
        }
    }

    /// Matrix row and column, for samplers that scan the matrix.
    pub fn row_col(self) -> Option<(usize, usize)> {
        match self {
            InputLine::Matrix(n) => Some((usize::from(n) / 4, usize::from(n) % 4)),
            _ => None,
        }
    }
}

/// What a press means right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    Increment(usize),
    Decrement(usize),
    Confirm,
    Accept,
    Reject,
    Acknowledge,
    NewBreadBatch,
    ForceFinish,
    Ignore,
}

#[derive(Clone, Copy)]
enum PhaseMatch {
    Any,
    Is(ConfirmationPhase),
}

struct Route {
    phase: PhaseMatch,
    line: InputLine,
    action: Action,
}

const fn when(phase: ConfirmationPhase, line: InputLine, action: Action) -> Route {
    Route {
        phase: PhaseMatch::Is(phase),
        line,
        action,
    }
}

const fn always(line: InputLine, action: Action) -> Route {
    Route {
        phase: PhaseMatch::Any,
        line,
        action,
    }
}

use ConfirmationPhase::{Building, Confirming};
use InputLine::{Confirm as ConfirmBtn, Matrix, NewBread};

/// First match wins. Anything unlisted is ignored.
static ROUTES: &[Route] = &[
    when(Building, Matrix(0), Action::Increment(0)),
    when(Building, Matrix(1), Action::Increment(1)),
    when(Building, Matrix(2), Action::Increment(2)),
    when(Building, Matrix(4), Action::Decrement(0)),
    when(Building, Matrix(5), Action::Decrement(1)),
    when(Building, Matrix(6), Action::Decrement(2)),
    when(Building, ConfirmBtn, Action::Confirm),
    when(Confirming, Matrix(0), Action::Accept),
    when(Confirming, Matrix(4), Action::Reject),
    always(Matrix(3), Action::Acknowledge),
    always(Matrix(7), Action::ForceFinish),
    always(NewBread, Action::NewBreadBatch),
];

/// Look up the action for a press of `line` in `phase`.
pub fn route(phase: ConfirmationPhase, line: InputLine) -> Action {
    ROUTES
        .iter()
        .find(|r| {
            r.line == line
                && match r.phase {
                    PhaseMatch::Any => true,
                    PhaseMatch::Is(p) => p == phase,
                }
        })
        .map_or(Action::Ignore, |r| r.action)
}

/// One debouncer per line.
pub struct InputScanner {
    detectors: [DebounceEdgeDetector; INPUT_LINES],
}

impl InputScanner {
    pub const fn new() -> Self {
        Self {
            detectors: [DebounceEdgeDetector::new(); INPUT_LINES],
        }
    }

    /// Sample every line once and return the lines that were just pressed.
    pub fn poll<S: InputSampler>(
        &mut self,
        sampler: &mut S,
        now_ms: u64,
    ) -> heapless::Vec<InputLine, INPUT_LINES> {
        let mut pressed = heapless::Vec::new();
        for line in InputLine::ALL {
            let raw = sampler.sample(line);
            if let Some(Edge::Pressed) = self.detectors[line.index()].sample(raw, now_ms) {
                let _ = pressed.push(line);
            }
        }
        pressed
    }
}

impl Default for InputScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Route a press and apply it. Local actions happen in place; anything
/// that talks to the backend is queued for the command worker, and is
/// dropped if the queue is full.
pub fn dispatch<M: RawMutex>(ctx: &KioskContext<M>, line: InputLine, now_ms: u64) -> Action {
    let action = route(ctx.phase(), line);
    trace!("Press {} -> {}", line, action);

    match action {
        Action::Increment(slot) => {
            ctx.increment(slot);
        }
        Action::Decrement(slot) => {
            ctx.decrement(slot);
        }
        Action::Confirm => {
            if let Err(guard) = ctx.confirm(now_ms) {
                trace!("Confirm ignored: {}", guard);
            }
        }
        Action::Accept => enqueue(ctx, Command::Accept),
        Action::Reject => {
            if ctx.reject().is_ok() {
                info!("Reservation rejected");
            }
        }
        Action::Acknowledge => {
            if ctx.acknowledge() {
                info!("Parcel acknowledged");
            }
        }
        Action::NewBreadBatch => enqueue(ctx, Command::NewBreadBatch),
        Action::ForceFinish => {
            let left = ctx.force_finish(now_ms);
            info!("Force finish with {} s left", left);
            let secs = i32::try_from(left).unwrap_or(i32::MAX);
            enqueue(ctx, Command::ReportTimeout(-secs));
        }
        Action::Ignore => {}
    }
    action
}

fn enqueue<M: RawMutex>(ctx: &KioskContext<M>, command: Command) {
    if ctx.commands().try_send(command).is_err() {
        warn!("Command queue full, dropping {}", command);
    }
}
