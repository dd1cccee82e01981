//! Ticket polling loop.
//!
//! Each iteration asks the backend which ticket is at the head of the queue
//! and then does whatever that ticket needs:
//!
//! - still cooking: wait out the cook time,
//! - ready: hand it off to the wait list and give the customer a window to
//!   scan their receipt.
//!
//! Waits are deadline based and cancellable through the force-finish signal;
//! a deadline that has already passed ends the wait at once.

use core::future::Future;

use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::config::{
    UnscannedPolicy, CONTENTION_BACKOFF_MS, EMPTY_QUEUE_BACKOFF_MS, ERROR_BACKOFF_MS,
    NOT_READY_BACKOFF_MS, SUPPRESSED_SLEEP_MS, WAIT_TICK_MS,
};
use crate::context::KioskContext;
use crate::error::{BackendError, Error};
use crate::model::{TicketId, TicketLifecycle};
use crate::ports::{report, Backend, CurrentTicket, Feedback, Services, Telemetry};
use crate::time::{bounded, deadline_after_secs, remaining_ms, Clock};

/// What one iteration of the loop did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollOutcome {
    /// Catalog or link not ready; nothing was asked.
    NotReady,
    /// Nobody queued and we polled recently; nothing was asked.
    Suppressed,
    /// Another task held the busy lock.
    Contended,
    Failed(Error),
    EmptyQueue,
    /// Waited out the cook time of this ticket.
    Cooked(TicketId),
    /// Handed off; the ticket ended in this state.
    Delivered(TicketId, TicketLifecycle),
    /// The backend still reports a ticket we already finished.
    Settled(TicketId),
}

/// How a deadline wait ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WaitEnd {
    Elapsed,
    TicketClosed,
}

pub struct TicketFlowController<'a, M: RawMutex, B, C, T, F> {
    ctx: &'a KioskContext<M>,
    services: Services<'a, B, C, T, F>,
    last_poll_ms: Option<u64>,
}

impl<'a, M, B, C, T, F> TicketFlowController<'a, M, B, C, T, F>
where
    M: RawMutex,
    B: Backend,
    C: Clock,
    T: Telemetry,
    F: Feedback,
{
    pub fn new(ctx: &'a KioskContext<M>, services: Services<'a, B, C, T, F>) -> Self {
        Self {
            ctx,
            services,
            last_poll_ms: None,
        }
    }

    pub fn last_poll_ms(&self) -> Option<u64> {
        self.last_poll_ms
    }

    pub async fn run(&mut self) -> ! {
        info!("Ticket flow started");
        loop {
            let outcome = self.poll_once().await;
            debug!("Ticket flow: {}", outcome);
        }
    }

    /// One iteration, including its backoff or wait.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let clock = self.services.clock;
        let now = clock.now_ms();

        if !self.ctx.is_ready() {
            clock.sleep_ms(NOT_READY_BACKOFF_MS).await;
            return PollOutcome::NotReady;
        }

        if let Some(left) = self.suppression_left(now) {
            clock.sleep_ms(left.min(SUPPRESSED_SLEEP_MS)).await;
            return PollOutcome::Suppressed;
        }

        let current = {
            let Some(_token) = self.ctx.busy().try_lock() else {
                trace!("Poll skipped: busy");
                clock.sleep_ms(CONTENTION_BACKOFF_MS).await;
                return PollOutcome::Contended;
            };
            self.last_poll_ms = Some(now);
            self.bounded(self.services.backend.query_current_ticket()).await
        };

        let ticket = match current {
            Ok(ticket) => ticket,
            Err(e) => {
                let e = Error::from(e);
                self.fail("query", e);
                clock.sleep_ms(ERROR_BACKOFF_MS).await;
                return PollOutcome::Failed(e);
            }
        };

        let id = match ticket.ticket_id {
            Some(id) if ticket.has_customer_queued => id,
            _ => {
                self.ctx.set_customer_queued(false);
                clock.sleep_ms(EMPTY_QUEUE_BACKOFF_MS).await;
                return PollOutcome::EmptyQueue;
            }
        };

        self.ctx.set_customer_queued(true);
        self.ctx.track_ticket(id, &ticket.requirements);
        if self.ctx.ticket_lifecycle(id).is_some_and(TicketLifecycle::is_terminal) {
            clock.sleep_ms(EMPTY_QUEUE_BACKOFF_MS).await;
            return PollOutcome::Settled(id);
        }

        if ticket.ready {
            self.hand_off(id).await
        } else {
            self.wait_cooking(id, &ticket).await;
            PollOutcome::Cooked(id)
        }
    }

    fn suppression_left(&self, now: u64) -> Option<u64> {
        if self.ctx.customer_queued() {
            return None;
        }
        let last = self.last_poll_ms?;
        let window = self.ctx.config().poll_suppression_ms;
        let since = now.saturating_sub(last);
        (since < window).then(|| window - since)
    }

    async fn wait_cooking(&self, id: TicketId, ticket: &CurrentTicket) {
        self.ctx.advance_ticket(id, TicketLifecycle::CookingWait);

        let secs = ticket.wait_secs;
        let deadline = deadline_after_secs(self.services.clock.now_ms(), secs);
        info!("Ticket {} cooking for {} s", id, secs);

        self.ctx.arm_wait_deadline(deadline);
        self.wait_for(KioskContext::wait_deadline, None).await;
        self.ctx.clear_deadlines();
    }

    async fn hand_off(&self, id: TicketId) -> PollOutcome {
        self.ctx.advance_ticket(id, TicketLifecycle::ReadyToScan);
        self.ctx.clear_cook_overlay();

        if let Err(e) = self.send_to_wait_list(id).await {
            self.services.clock.sleep_ms(ERROR_BACKOFF_MS).await;
            return PollOutcome::Failed(e);
        }
        info!("Ticket {} ready for pickup", id);

        let end = self.await_pickup(id).await;
        self.ctx.clear_deadlines();
        PollOutcome::Delivered(id, end)
    }

    async fn send_to_wait_list(&self, id: TicketId) -> Result<(), Error> {
        let result = self
            .locked(|| self.services.backend.send_to_wait_list(id))
            .await;
        if let Err(e) = result {
            self.fail("wait_list", e);
        }
        result
    }

    /// Give the customer the receive window, then settle the ticket.
    async fn await_pickup(&self, id: TicketId) -> TicketLifecycle {
        let mut retries = 0u8;
        loop {
            let window = self.ctx.config().receive_window_ms;
            self.ctx
                .arm_receive_deadline(self.services.clock.now_ms().saturating_add(window));

            let end = self.wait_for(KioskContext::receive_deadline, Some(id)).await;
            if end == WaitEnd::TicketClosed {
                return self.ctx.ticket_lifecycle(id).unwrap_or(TicketLifecycle::Served);
            }

            let skipped = self
                .locked(|| self.services.backend.is_in_skipped_list(id))
                .await;

            let end = match skipped {
                Ok(false) => TicketLifecycle::Served,
                Ok(true) => match self.ctx.config().unscanned {
                    UnscannedPolicy::Retry { max_attempts } if retries < max_attempts => {
                        retries += 1;
                        info!("Ticket {} unscanned, retry {}", id, retries);
                        if self.send_to_wait_list(id).await.is_ok() {
                            continue;
                        }
                        TicketLifecycle::Skipped
                    }
                    _ => TicketLifecycle::Skipped,
                },
                Err(e) => {
                    self.fail("skipped_list", e);
                    TicketLifecycle::Skipped
                }
            };

            info!("Ticket {} closed as {}", id, end);
            self.ctx.advance_ticket(id, end);
            return end;
        }
    }

    /// Wait until the deadline read by `deadline` passes, or until ticket
    /// `id` reaches a terminal state. Re-reads the deadline every tick so a
    /// force finish is seen at once.
    async fn wait_for(
        &self,
        deadline: fn(&KioskContext<M>) -> Option<u64>,
        id: Option<TicketId>,
    ) -> WaitEnd {
        let clock = self.services.clock;
        loop {
            if let Some(id) = id {
                if self.ctx.ticket_lifecycle(id).is_some_and(TicketLifecycle::is_terminal) {
                    return WaitEnd::TicketClosed;
                }
            }

            let Some(at) = deadline(self.ctx) else {
                return WaitEnd::Elapsed;
            };
            let left = remaining_ms(clock.now_ms(), at);
            if left == 0 {
                return WaitEnd::Elapsed;
            }

            select(
                clock.sleep_ms(left.min(WAIT_TICK_MS)),
                self.ctx.force_finish_signal().wait(),
            )
            .await;
        }
    }

    /// Run a backend call under the busy lock, waiting out contention.
    async fn locked<R, Fut>(&self, call: impl Fn() -> Fut) -> Result<R, Error>
    where
        Fut: Future<Output = Result<R, BackendError>>,
    {
        loop {
            if let Some(_token) = self.ctx.busy().try_lock() {
                return Ok(self.bounded(call()).await?);
            }
            self.services.clock.sleep_ms(CONTENTION_BACKOFF_MS).await;
        }
    }

    async fn bounded<R>(
        &self,
        fut: impl Future<Output = Result<R, BackendError>>,
    ) -> Result<R, BackendError> {
        bounded(self.services.clock, self.ctx.config().backend_timeout_ms, fut).await
    }

    fn fail(&self, op: &str, e: Error) {
        error!("Ticket flow {} failed: {}", op, e);
        if e.is_reportable() {
            report(self.services.telemetry, format_args!("ticket_flow:{}:{}", op, e));
            self.ctx.show_error(self.services.clock.now_ms());
        }
    }
}
