//! Unified error type for the kiosk core.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

use core::fmt;

/// Top-level error type used across the workflows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Backend
    /// The call never produced a response (link down, timeout).
    Transport,

    /// A response arrived but could not be understood.
    Parse,

    /// The backend explicitly refused the operation.
    Domain(Rejection),

    // Local
    /// The busy lock is held by another task; the attempt is abandoned.
    LockContention,

    /// A precondition for the operation was not met.
    GuardRejected(Guard),
}

/// Failures a backend facade can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BackendError {
    Transport,
    Parse,
    Domain(Rejection),
}

/// Explicit backend refusals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rejection {
    /// The ticket is not in the list the operation expects (not handed off
    /// yet, already served, or unknown).
    NotInList,
    /// Any other refusal code.
    Refused,
}

/// Preconditions that can silently reject an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Guard {
    /// Confirm pressed with nothing ordered.
    EmptyOrder,
    /// Kiosk status is not normal (booting, link down, error showing).
    NotNormal,
    /// Init or network is not ready.
    NotReady,
    /// A parcel is still waiting for the baker's acknowledgment.
    DeliveryPending,
    /// The confirmation workflow is not in the state the action needs.
    WrongPhase,
    /// The scanned payload carries no ticket id.
    NoTicketId,
}

impl Error {
    /// Whether this error should be reported to telemetry.
    pub fn is_reportable(&self) -> bool {
        matches!(self, Error::Transport | Error::Parse)
    }
}

// Convenience conversions

impl From<BackendError> for Error {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Transport => Error::Transport,
            BackendError::Parse => Error::Parse,
            BackendError::Domain(r) => Error::Domain(r),
        }
    }
}

impl From<Guard> for Error {
    fn from(g: Guard) -> Self {
        Error::GuardRejected(g)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport => f.write_str("transport failure"),
            Error::Parse => f.write_str("parse failure"),
            Error::Domain(Rejection::NotInList) => f.write_str("ticket not in list"),
            Error::Domain(Rejection::Refused) => f.write_str("refused by backend"),
            Error::LockContention => f.write_str("busy"),
            Error::GuardRejected(g) => write!(f, "rejected: {:?}", g),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
