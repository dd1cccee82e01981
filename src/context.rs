//! Shared kiosk state.
//!
//! One [`KioskContext`] lives for the whole program (a `static` on target)
//! and every task borrows it. Mutable state sits behind a blocking mutex and
//! is only reachable through the named operations below, each of which runs
//! as one short critical section. The busy lock, the force-finish signal and
//! the command queue sit next to it.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use crate::busy::BusyLock;
use crate::catalog::BreadCatalog;
use crate::config::{KioskConfig, BREAD_TYPES, COMMAND_QUEUE_DEPTH};
use crate::confirmation::{ConfirmationPhase, ConfirmationWorkflow};
use crate::display::{DisplayMode, DisplayModeArbiter, DisplayView, Frame};
use crate::error::Guard;
use crate::model::{
    total, BreadCounts, BreadRequirements, DeliveryParcel, Ticket, TicketId, TicketLifecycle,
};
use crate::ports::{CreatedTicket, NewBatch};
use crate::time::remaining_ms;

/// What the panel reports when it is not showing orders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KioskStatus {
    Normal,
    /// Catalog not loaded yet.
    Booting,
    /// Backend link not established yet.
    Connecting,
    /// Backend link lost.
    LinkError,
    /// A backend call failed recently.
    ApiError,
}

/// Backend link state, maintained by the link monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Connecting,
    Up,
    Down,
}

/// Work handed to the command worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Baker accepted the reservation.
    Accept,
    /// Baker started a new oven batch.
    NewBreadBatch,
    /// Tell the backend the current wait changed by this many seconds.
    ReportTimeout(i32),
}

struct KioskState {
    link: LinkState,
    init_ready: bool,
    error_until_ms: Option<u64>,
    customer_queued: bool,
    confirmation: ConfirmationWorkflow,
    parcel: DeliveryParcel,
    arbiter: DisplayModeArbiter,
    active_ticket: Option<Ticket>,
    wait_deadline_ms: Option<u64>,
    receive_deadline_ms: Option<u64>,
    catalog: BreadCatalog,
}

impl KioskState {
    const fn new() -> Self {
        Self {
            link: LinkState::Connecting,
            init_ready: false,
            error_until_ms: None,
            customer_queued: true,
            confirmation: ConfirmationWorkflow::new(),
            parcel: DeliveryParcel::empty(),
            arbiter: DisplayModeArbiter::new(),
            active_ticket: None,
            wait_deadline_ms: None,
            receive_deadline_ms: None,
            catalog: BreadCatalog::new(),
        }
    }

    fn status(&self, now_ms: u64) -> KioskStatus {
        match self.link {
            LinkState::Connecting => return KioskStatus::Connecting,
            LinkState::Down => return KioskStatus::LinkError,
            LinkState::Up => {}
        }
        if !self.init_ready {
            return KioskStatus::Booting;
        }
        match self.error_until_ms {
            Some(until) if now_ms < until => KioskStatus::ApiError,
            _ => KioskStatus::Normal,
        }
    }

    fn view(&self, now_ms: u64) -> DisplayView {
        DisplayView {
            status: self.status(now_ms),
            pending: self.confirmation.pending().counts(),
            baker: self.confirmation.baker_view(),
            parcel: self.parcel,
        }
    }

    fn ticket_mut(&mut self, id: TicketId) -> Option<&mut Ticket> {
        self.active_ticket.as_mut().filter(|t| t.id == id)
    }
}

pub struct KioskContext<M: RawMutex> {
    config: KioskConfig,
    state: Mutex<M, RefCell<KioskState>>,
    busy: BusyLock,
    force_finish: Signal<M, ()>,
    commands: Channel<M, Command, COMMAND_QUEUE_DEPTH>,
}

impl<M: RawMutex> KioskContext<M> {
    pub const fn new(config: KioskConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RefCell::new(KioskState::new())),
            busy: BusyLock::new(),
            force_finish: Signal::new(),
            commands: Channel::new(),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut KioskState) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn config(&self) -> &KioskConfig {
        &self.config
    }

    /// Serializes backend operations between tasks.
    pub fn busy(&self) -> &BusyLock {
        &self.busy
    }

    /// Raised when the baker cuts the current wait short.
    pub fn force_finish_signal(&self) -> &Signal<M, ()> {
        &self.force_finish
    }

    pub fn commands(&self) -> &Channel<M, Command, COMMAND_QUEUE_DEPTH> {
        &self.commands
    }

    // Status

    pub fn status(&self, now_ms: u64) -> KioskStatus {
        self.with(|s| s.status(now_ms))
    }

    /// Catalog loaded and link up.
    pub fn is_ready(&self) -> bool {
        self.with(|s| s.init_ready && s.link == LinkState::Up)
    }

    pub fn set_link(&self, link: LinkState) {
        self.with(|s| {
            if s.link != link {
                info!("Link {}", link);
                s.link = link;
            }
        })
    }

    pub fn link(&self) -> LinkState {
        self.with(|s| s.link)
    }

    /// Install the catalog and leave the booting state.
    pub fn finish_init(&self, catalog: BreadCatalog) {
        self.with(|s| {
            s.catalog = catalog;
            s.init_ready = true;
        })
    }

    pub fn catalog(&self) -> BreadCatalog {
        self.with(|s| s.catalog.clone())
    }

    /// Show the API error pattern for the configured window.
    pub fn show_error(&self, now_ms: u64) {
        let until = now_ms.saturating_add(self.config.error_visible_ms);
        self.with(|s| s.error_until_ms = Some(until))
    }

    // Display

    pub fn view(&self, now_ms: u64) -> DisplayView {
        self.with(|s| s.view(now_ms))
    }

    /// Compose the whole panel in one critical section.
    pub fn frame(&self, now_ms: u64) -> Frame {
        self.with(|s| s.arbiter.compose(&s.view(now_ms), now_ms))
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.with(|s| s.arbiter.mode())
    }

    pub fn cook_overlay(&self) -> [Option<u8>; BREAD_TYPES] {
        self.with(|s| s.arbiter.cook_overlay())
    }

    pub fn clear_cook_overlay(&self) {
        self.with(|s| s.arbiter.clear_cook_overlay())
    }

    /// Seed or clear the cook overlay from a new oven batch.
    pub fn apply_new_batch(&self, batch: &NewBatch) {
        self.with(|s| match &batch.customer_counts {
            Some(counts) => s.arbiter.set_cook_overlay(counts),
            None => s.arbiter.clear_cook_overlay(),
        })
    }

    // Confirmation workflow

    pub fn phase(&self) -> ConfirmationPhase {
        self.with(|s| s.confirmation.phase())
    }

    pub fn pending_counts(&self) -> BreadCounts {
        self.with(|s| s.confirmation.pending().counts())
    }

    /// Add one bread of `slot`. Slots past the catalog have nothing to
    /// order and are refused.
    pub fn increment(&self, slot: usize) -> bool {
        let config = self.config;
        self.with(|s| slot < s.catalog.len() && s.confirmation.increment(slot, &config))
    }

    pub fn decrement(&self, slot: usize) -> bool {
        self.with(|s| s.confirmation.decrement(slot))
    }

    pub fn confirm(&self, now_ms: u64) -> Result<(), Guard> {
        self.with(|s| {
            let normal = s.status(now_ms) == KioskStatus::Normal;
            let counts = s.confirmation.confirm(normal)?;
            s.arbiter.enter_confirmation(total(&counts));
            Ok(())
        })
    }

    pub fn reject(&self) -> Result<(), Guard> {
        self.with(|s| {
            s.confirmation.reject()?;
            s.arbiter.finish_confirmation(&s.parcel);
            Ok(())
        })
    }

    /// Move to uploading; returns the frozen counts and what to send.
    pub fn begin_upload(&self) -> Result<(BreadCounts, BreadRequirements), Guard> {
        self.with(|s| {
            let counts = s.confirmation.begin_upload()?;
            Ok((counts, s.catalog.requirements_for(&counts)))
        })
    }

    pub fn commit_upload(&self, created: &CreatedTicket, counts: &BreadCounts) {
        self.with(|s| {
            s.confirmation.commit();
            if created.show_on_display {
                s.arbiter.set_cook_overlay(counts);
            }
            // A new ticket exists; the ticket flow should poll again.
            s.customer_queued = true;
            s.arbiter.finish_confirmation(&s.parcel);
        })
    }

    /// Back to building with the order kept. Whether the failure also
    /// opens the error window is up to the caller.
    pub fn fail_upload(&self) {
        self.with(|s| {
            s.confirmation.fail();
            s.arbiter.finish_confirmation(&s.parcel);
        })
    }

    // Delivery

    pub fn parcel(&self) -> DeliveryParcel {
        self.with(|s| s.parcel)
    }

    /// Preconditions for acting on a scan.
    pub fn can_scan(&self) -> Result<(), Guard> {
        self.with(|s| {
            if s.parcel.pending {
                Err(Guard::DeliveryPending)
            } else if !(s.init_ready && s.link == LinkState::Up) {
                Err(Guard::NotReady)
            } else {
                Ok(())
            }
        })
    }

    pub fn record_served(&self, id: TicketId, counts: &BreadCounts) {
        self.with(|s| {
            s.parcel = DeliveryParcel {
                counts: *counts,
                pending: true,
            };
            s.arbiter.on_served();
            if let Some(ticket) = s.ticket_mut(id) {
                ticket.advance(TicketLifecycle::Served);
            }
        })
    }

    /// The baker confirmed the parcel was handed over. Only honoured while
    /// the parcel is actually on the panel.
    pub fn acknowledge(&self) -> bool {
        self.with(|s| {
            if !s.parcel.pending || s.arbiter.mode() != DisplayMode::Delivery {
                return false;
            }
            s.parcel.clear();
            let reserved = s.confirmation.reservation_pending();
            s.arbiter.on_acknowledged(reserved);
            true
        })
    }

    // Ticket flow

    pub fn customer_queued(&self) -> bool {
        self.with(|s| s.customer_queued)
    }

    pub fn set_customer_queued(&self, queued: bool) {
        self.with(|s| s.customer_queued = queued)
    }

    /// Start tracking `id` unless it is already the active ticket.
    pub fn track_ticket(&self, id: TicketId, requirements: &BreadRequirements) {
        self.with(|s| {
            if s.ticket_mut(id).is_none() {
                s.active_ticket = Some(Ticket::new(id, requirements.clone()));
            }
        })
    }

    pub fn advance_ticket(&self, id: TicketId, next: TicketLifecycle) -> bool {
        self.with(|s| s.ticket_mut(id).is_some_and(|t| t.advance(next)))
    }

    pub fn ticket_lifecycle(&self, id: TicketId) -> Option<TicketLifecycle> {
        self.with(|s| s.ticket_mut(id).map(|t| t.lifecycle()))
    }

    pub fn arm_wait_deadline(&self, deadline_ms: u64) {
        self.with(|s| s.wait_deadline_ms = Some(deadline_ms))
    }

    pub fn wait_deadline(&self) -> Option<u64> {
        self.with(|s| s.wait_deadline_ms)
    }

    pub fn arm_receive_deadline(&self, deadline_ms: u64) {
        self.with(|s| s.receive_deadline_ms = Some(deadline_ms))
    }

    pub fn receive_deadline(&self) -> Option<u64> {
        self.with(|s| s.receive_deadline_ms)
    }

    pub fn clear_deadlines(&self) {
        self.with(|s| {
            s.wait_deadline_ms = None;
            s.receive_deadline_ms = None;
        })
    }

    /// Pull both deadlines to `now_ms` and wake the ticket flow. Returns the
    /// whole seconds that were left on the cooking wait.
    pub fn force_finish(&self, now_ms: u64) -> u32 {
        let left_ms = self.with(|s| {
            let left = s.wait_deadline_ms.map_or(0, |d| remaining_ms(now_ms, d));
            s.wait_deadline_ms = s.wait_deadline_ms.map(|_| now_ms);
            s.receive_deadline_ms = s.receive_deadline_ms.map(|_| now_ms);
            left
        });
        self.force_finish.signal(());
        u32::try_from(left_ms / 1_000).unwrap_or(u32::MAX)
    }
}
