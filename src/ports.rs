//! Collaborators the kiosk core talks to.
//!
//! Everything here is implemented by the embedded binary against real
//! hardware (see `src/hw/`) and by fakes in host tests. Backend methods are
//! expected to return rather than hang, but the workflows still wrap every
//! call in [`crate::time::bounded`].

use core::fmt::Write;

use heapless::String;

use crate::catalog::BreadCatalog;
use crate::config::{SCAN_PAYLOAD_LEN, TELEMETRY_MSG_LEN};
use crate::error::BackendError;
use crate::input::InputLine;
use crate::model::{BreadCounts, BreadRequirements, TicketId};

/// Answer to `create_ticket`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CreatedTicket {
    pub ticket_id: TicketId,
    /// Seed the cook overlay with this order.
    pub show_on_display: bool,
}

/// Answer to `query_current_ticket`.
#[derive(Clone, Debug, PartialEq)]
pub struct CurrentTicket {
    pub has_customer_queued: bool,
    pub ticket_id: Option<TicketId>,
    pub ready: bool,
    pub wait_secs: u32,
    pub requirements: BreadRequirements,
}

impl CurrentTicket {
    pub fn empty_queue() -> Self {
        Self {
            has_customer_queued: false,
            ticket_id: None,
            ready: false,
            wait_secs: 0,
            requirements: BreadRequirements::new(),
        }
    }
}

/// Answer to `start_new_bread_batch`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NewBatch {
    pub bread_index: u8,
    /// Counts for the customer this batch belongs to, when the backend
    /// wants them on the cook overlay.
    pub customer_counts: Option<BreadCounts>,
}

/// Remote bakery API.
#[allow(async_fn_in_trait)]
pub trait Backend {
    async fn fetch_initial_catalog(&self) -> Result<BreadCatalog, BackendError>;
    async fn create_ticket(&self, req: &BreadRequirements) -> Result<CreatedTicket, BackendError>;
    async fn query_current_ticket(&self) -> Result<CurrentTicket, BackendError>;
    async fn serve_ticket(&self, id: TicketId) -> Result<BreadRequirements, BackendError>;
    async fn send_to_wait_list(&self, id: TicketId) -> Result<(), BackendError>;
    async fn is_in_skipped_list(&self, id: TicketId) -> Result<bool, BackendError>;
    async fn start_new_bread_batch(&self) -> Result<NewBatch, BackendError>;
    async fn update_timeout(&self, seconds: i32) -> Result<(), BackendError>;
}

/// Fire-and-forget error reporting. Must never block or fail visibly.
pub trait Telemetry {
    fn publish_error(&self, message: &str);
}

/// Format and publish a telemetry message, truncating at
/// [`TELEMETRY_MSG_LEN`].
pub fn report<T: Telemetry>(telemetry: &T, args: core::fmt::Arguments<'_>) {
    let mut msg: String<TELEMETRY_MSG_LEN> = String::new();
    let _ = msg.write_fmt(args);
    telemetry.publish_error(&msg);
}

/// Receipt printer. Best effort - no error is surfaced to the core.
#[allow(async_fn_in_trait)]
pub trait Printer {
    async fn print_ticket(&mut self, id: TicketId, qr_payload: &str);
}

/// User-facing audible/visual feedback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FeedbackKind {
    Success,
    Error,
}

pub trait Feedback {
    fn signal(&self, kind: FeedbackKind);
}

/// Raw level of one input line (`true` = pressed).
pub trait InputSampler {
    fn sample(&mut self, line: InputLine) -> bool;
}

/// One scanned line from the barcode/QR reader.
pub type ScanPayload = String<SCAN_PAYLOAD_LEN>;

/// Lazy, restartable sequence of scanned payloads. `None` means nothing
/// is available right now; the caller comes back later.
#[allow(async_fn_in_trait)]
pub trait ScanSource {
    async fn next_scan(&mut self) -> Option<ScanPayload>;
}

/// The collaborators every workflow needs, bundled so task signatures stay
/// short.
pub struct Services<'a, B, C, T, F> {
    pub backend: &'a B,
    pub clock: &'a C,
    pub telemetry: &'a T,
    pub feedback: &'a F,
}

impl<B, C, T, F> Clone for Services<'_, B, C, T, F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B, C, T, F> Copy for Services<'_, B, C, T, F> {}
