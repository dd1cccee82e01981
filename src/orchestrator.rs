//! Boot sequence and the long-running tasks that are not a workflow of
//! their own.
//!
//! The embedded binary spawns one executor task per loop here, plus the
//! ticket flow and scan ingress. Host tests drive the same loops one step
//! at a time.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::catalog::CatalogCache;
use crate::config::{
    BOOT_FETCH_ATTEMPTS, DISPLAY_REFRESH_MS, INIT_RETRY_DELAY_MS, INIT_TIMEOUT_MS, INPUT_POLL_MS,
};
use crate::confirmation;
use crate::delivery;
use crate::context::{Command, KioskContext};
use crate::display::SegmentDisplay;
use crate::error::{Error, Result};
use crate::input::{self, InputScanner};
use crate::ports::{
    report, Backend, Feedback, FeedbackKind, InputSampler, Printer, ScanSource, Services,
    Telemetry,
};
use crate::ticket_flow::TicketFlowController;
use crate::time::{bounded, Clock};

/// Where the boot catalog came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CatalogSource {
    Backend,
    Cache,
}

pub struct KioskOrchestrator<'a, M: RawMutex, B, C, T, F> {
    ctx: &'a KioskContext<M>,
    services: Services<'a, B, C, T, F>,
}

impl<'a, M, B, C, T, F> KioskOrchestrator<'a, M, B, C, T, F>
where
    M: RawMutex,
    B: Backend,
    C: Clock,
    T: Telemetry,
    F: Feedback,
{
    pub fn new(ctx: &'a KioskContext<M>, services: Services<'a, B, C, T, F>) -> Self {
        Self { ctx, services }
    }

    pub fn context(&self) -> &'a KioskContext<M> {
        self.ctx
    }

    pub fn services(&self) -> Services<'a, B, C, T, F> {
        self.services
    }

    pub fn ticket_flow(&self) -> TicketFlowController<'a, M, B, C, T, F> {
        TicketFlowController::new(self.ctx, self.services)
    }

    pub async fn scan_task<S: ScanSource>(&self, source: &mut S) -> ! {
        delivery::run(self.ctx, self.services, source).await
    }

    /// Load the bread catalog and raise init-ready.
    ///
    /// Tries the backend a few times, falls back to the flash copy, and if
    /// there is none keeps retrying the backend until it answers.
    pub async fn boot<K: CatalogCache>(&self, cache: &mut K) -> CatalogSource {
        let clock = self.services.clock;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match bounded(clock, INIT_TIMEOUT_MS, self.services.backend.fetch_initial_catalog()).await
            {
                Ok(catalog) if !catalog.is_empty() => {
                    info!("Catalog fetched: {} bread types", catalog.len());
                    cache.save(&catalog).await;
                    self.ctx.finish_init(catalog);
                    return CatalogSource::Backend;
                }
                Ok(_) => warn!("Catalog fetch {} returned no bread types", attempt),
                Err(e) => {
                    warn!("Catalog fetch {} failed: {}", attempt, e);
                    report(
                        self.services.telemetry,
                        format_args!("boot:catalog:{}", Error::from(e)),
                    );
                }
            }

            if attempt == u32::from(BOOT_FETCH_ATTEMPTS) {
                if let Some(catalog) = cache.load().await {
                    info!("Catalog loaded from flash: {} bread types", catalog.len());
                    self.ctx.finish_init(catalog);
                    return CatalogSource::Cache;
                }
                warn!("No cached catalog, retrying backend");
            }

            clock.sleep_ms(INIT_RETRY_DELAY_MS).await;
        }
    }

    /// Run one queued command.
    pub async fn execute<P: Printer>(&self, command: Command, printer: &mut P) -> Result<()> {
        debug!("Command {}", command);
        match command {
            Command::Accept => confirmation::accept(self.ctx, self.services, printer)
                .await
                .map(|_| ()),
            Command::NewBreadBatch => self.new_bread_batch().await,
            Command::ReportTimeout(secs) => self.report_timeout(secs).await,
        }
    }

    /// Command worker: backend operations requested by button presses.
    pub async fn command_worker<P: Printer>(&self, printer: &mut P) -> ! {
        info!("Command worker started");
        loop {
            let command = self.ctx.commands().receive().await;
            if let Err(e) = self.execute(command, printer).await {
                debug!("Command {} ended with {}", command, e);
            }
        }
    }

    async fn new_bread_batch(&self) -> Result<()> {
        let Some(_token) = self.ctx.busy().try_lock() else {
            return Err(Error::LockContention);
        };
        let result = bounded(
            self.services.clock,
            self.ctx.config().backend_timeout_ms,
            self.services.backend.start_new_bread_batch(),
        )
        .await;

        match result {
            Ok(batch) => {
                info!("New bread batch {}", batch.bread_index);
                self.ctx.apply_new_batch(&batch);
                Ok(())
            }
            Err(e) => Err(self.fail("new_batch", e.into())),
        }
    }

    async fn report_timeout(&self, secs: i32) -> Result<()> {
        let Some(_token) = self.ctx.busy().try_lock() else {
            return Err(Error::LockContention);
        };
        bounded(
            self.services.clock,
            self.ctx.config().backend_timeout_ms,
            self.services.backend.update_timeout(secs),
        )
        .await
        .map_err(|e| self.fail("update_timeout", e.into()))
    }

    fn fail(&self, op: &str, e: Error) -> Error {
        self.services.feedback.signal(FeedbackKind::Error);
        if e.is_reportable() {
            error!("{} failed: {}", op, e);
            report(self.services.telemetry, format_args!("orchestrator:{}:{}", op, e));
            self.ctx.show_error(self.services.clock.now_ms());
        } else {
            warn!("{} refused: {}", op, e);
        }
        e
    }

    /// Compose and push one frame.
    pub fn refresh_display<D: SegmentDisplay>(&self, display: &mut D) {
        self.ctx
            .frame(self.services.clock.now_ms())
            .apply(display);
    }

    pub async fn display_task<D: SegmentDisplay>(&self, display: &mut D) -> ! {
        loop {
            self.refresh_display(display);
            self.services.clock.sleep_ms(DISPLAY_REFRESH_MS).await;
        }
    }

    /// Sample every line once and dispatch new presses.
    pub fn scan_inputs<S: InputSampler>(&self, scanner: &mut InputScanner, sampler: &mut S) {
        let now = self.services.clock.now_ms();
        for line in scanner.poll(sampler, now) {
            input::dispatch(self.ctx, line, now);
        }
    }

    pub async fn input_task<S: InputSampler>(&self, sampler: &mut S) -> ! {
        let mut scanner = InputScanner::new();
        loop {
            self.scan_inputs(&mut scanner, sampler);
            self.services.clock.sleep_ms(INPUT_POLL_MS).await;
        }
    }
}
