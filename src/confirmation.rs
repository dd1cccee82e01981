//! Order confirmation workflow.
//!
//! ```text
//! Building ──confirm──▶ Confirming ──accept──▶ Uploading ──ok──▶ Building (order reset)
//!                          │                       └─fail─▶ Building (order kept)
//!                          └──reject──▶ Building (order reset)
//! ```
//!
//! The state machine itself is pure; [`KioskContext`] applies it together
//! with the display arbiter under one lock, and [`accept`] drives the
//! backend part from the command worker.

use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::String;

use crate::config::{KioskConfig, QR_PAYLOAD_PREFIX, SCAN_PAYLOAD_LEN};
use crate::context::KioskContext;
use crate::display::BakerView;
use crate::error::{self, Error, Guard};
use crate::model::{BreadCounts, PendingOrder, TicketId};
use crate::ports::{report, Backend, Feedback, FeedbackKind, Printer, Services, Telemetry};
use crate::time::{bounded, Clock};

/// Routing key for the key matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfirmationPhase {
    #[default]
    Building,
    Confirming,
    Uploading,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfirmationWorkflow {
    phase: ConfirmationPhase,
    pending: PendingOrder,
    snapshot: Option<BreadCounts>,
}

impl ConfirmationWorkflow {
    pub const fn new() -> Self {
        Self {
            phase: ConfirmationPhase::Building,
            pending: PendingOrder::new(),
            snapshot: None,
        }
    }

    pub fn phase(&self) -> ConfirmationPhase {
        self.phase
    }

    pub fn pending(&self) -> &PendingOrder {
        &self.pending
    }

    /// A reservation is waiting for (or being uploaded to) the backend.
    pub fn reservation_pending(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn baker_view(&self) -> Option<BakerView> {
        self.snapshot.map(|counts| BakerView {
            counts,
            uploading: self.phase == ConfirmationPhase::Uploading,
        })
    }

    pub fn increment(&mut self, slot: usize, config: &KioskConfig) -> bool {
        self.phase == ConfirmationPhase::Building
            && self
                .pending
                .increment(slot, config.max_per_type, config.max_total)
    }

    pub fn decrement(&mut self, slot: usize) -> bool {
        self.phase == ConfirmationPhase::Building && self.pending.decrement(slot)
    }

    /// Freeze the order for the baker.
    pub fn confirm(&mut self, status_normal: bool) -> Result<BreadCounts, Guard> {
        if self.phase != ConfirmationPhase::Building {
            return Err(Guard::WrongPhase);
        }
        if self.pending.is_empty() {
            return Err(Guard::EmptyOrder);
        }
        if !status_normal {
            return Err(Guard::NotNormal);
        }
        let counts = self.pending.counts();
        self.snapshot = Some(counts);
        self.phase = ConfirmationPhase::Confirming;
        Ok(counts)
    }

    /// Drop the reservation without contacting the backend.
    pub fn reject(&mut self) -> Result<(), Guard> {
        if self.phase != ConfirmationPhase::Confirming {
            return Err(Guard::WrongPhase);
        }
        self.snapshot = None;
        self.pending.reset();
        self.phase = ConfirmationPhase::Building;
        Ok(())
    }

    pub fn begin_upload(&mut self) -> Result<BreadCounts, Guard> {
        match (self.phase, self.snapshot) {
            (ConfirmationPhase::Confirming, Some(counts)) => {
                self.phase = ConfirmationPhase::Uploading;
                Ok(counts)
            }
            _ => Err(Guard::WrongPhase),
        }
    }

    /// Upload accepted: the order is done.
    pub fn commit(&mut self) {
        if self.phase == ConfirmationPhase::Uploading {
            self.pending.reset();
            self.snapshot = None;
            self.phase = ConfirmationPhase::Building;
        }
    }

    /// Upload failed: only the baker's view is dropped, the customer keeps
    /// the order on the primary counter.
    pub fn fail(&mut self) {
        if self.phase == ConfirmationPhase::Uploading {
            self.snapshot = None;
            self.phase = ConfirmationPhase::Building;
        }
    }
}

/// QR payload printed on the receipt for `id`.
pub fn qr_payload(id: TicketId) -> String<SCAN_PAYLOAD_LEN> {
    let mut s = String::new();
    let _ = write!(s, "{}{}", QR_PAYLOAD_PREFIX, id);
    s
}

/// Accept the reservation: create the ticket, print the receipt and reset
/// the order.
///
/// Lock contention leaves the workflow in `Confirming` so the baker can
/// simply press accept again.
pub async fn accept<M, B, C, T, F, P>(
    ctx: &KioskContext<M>,
    services: Services<'_, B, C, T, F>,
    printer: &mut P,
) -> error::Result<TicketId>
where
    M: RawMutex,
    B: Backend,
    C: Clock,
    T: Telemetry,
    F: Feedback,
    P: Printer,
{
    let Some(_token) = ctx.busy().try_lock() else {
        trace!("Accept: busy lock held elsewhere");
        return Err(Error::LockContention);
    };

    let (counts, req) = ctx.begin_upload()?;
    info!("Uploading order {}", counts);

    let result = bounded(
        services.clock,
        ctx.config().backend_timeout_ms,
        services.backend.create_ticket(&req),
    )
    .await;

    match result {
        Ok(created) => {
            let qr = qr_payload(created.ticket_id);
            printer.print_ticket(created.ticket_id, &qr).await;
            ctx.commit_upload(&created, &counts);
            info!("Ticket {} created", created.ticket_id);
            Ok(created.ticket_id)
        }
        Err(e) => {
            let e = Error::from(e);
            services.feedback.signal(FeedbackKind::Error);
            ctx.fail_upload();
            if e.is_reportable() {
                error!("create_ticket failed: {}", e);
                report(services.telemetry, format_args!("confirmation:create_ticket:{}", e));
                ctx.show_error(services.clock.now_ms());
            } else {
                warn!("Order refused: {}", e);
            }
            Err(e)
        }
    }
}
