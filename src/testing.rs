//! Host-side fakes for the collaborator traits.
//!
//! Time is hand-cranked: [`ManualClock::sleep_ms`] advances the clock by the
//! requested amount and yields once, so loops that sleep make progress under
//! `block_on` and other joined futures get to run in between.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::string::{String, ToString};
use std::vec::Vec;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;

use crate::busy::BusyLock;
use crate::catalog::{BreadCatalog, BreadCatalogEntry, CatalogCache, MAX_RECORD_SIZE};
use crate::config::{KioskConfig, INPUT_LINES};
use crate::context::{KioskContext, LinkState};
use crate::error::BackendError;
use crate::input::InputLine;
use crate::model::{BreadRequirements, TicketId};
use crate::ports::{
    Backend, CreatedTicket, CurrentTicket, Feedback, FeedbackKind, InputSampler, NewBatch,
    Printer, ScanPayload, ScanSource, Services, Telemetry,
};
use crate::time::Clock;

pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    async fn sleep_ms(&self, ms: u64) {
        self.advance(ms);
        embassy_futures::yield_now().await;
    }
}

/// Catalog used throughout the tests: three slotted types and one extra.
pub fn catalog() -> BreadCatalog {
    let mut c = BreadCatalog::new();
    for (id, cook_time_secs) in [(11, 600), (12, 900), (13, 300), (14, 1200)] {
        c.push(BreadCatalogEntry { id, cook_time_secs });
    }
    c
}

pub fn requirements(pairs: &[(u16, u8)]) -> BreadRequirements {
    let mut req = BreadRequirements::new();
    for &(id, n) in pairs {
        req.insert(id, n).unwrap();
    }
    req
}

/// Context with the link up and the test catalog installed.
pub fn ready_context(config: KioskConfig) -> KioskContext<NoopRawMutex> {
    let ctx = KioskContext::new(config);
    ctx.set_link(LinkState::Up);
    ctx.finish_init(catalog());
    ctx
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    FetchCatalog,
    CreateTicket(BreadRequirements),
    QueryCurrent,
    Serve(TicketId),
    WaitList(TicketId),
    Skipped(TicketId),
    NewBatch,
    UpdateTimeout(i32),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallRecord {
    pub at_ms: u64,
    pub call: Call,
    /// Whether the busy lock was held while the call ran.
    pub locked: bool,
}

type Script<T> = RefCell<VecDeque<Result<T, BackendError>>>;

/// Scripted backend. Each operation pops its next answer; when a script
/// runs dry a neutral default is used.
pub struct FakeBackend<'a> {
    clock: &'a ManualClock,
    lock: Option<&'a BusyLock>,
    calls: RefCell<Vec<CallRecord>>,
    hang_next: Cell<bool>,
    pub catalogs: Script<BreadCatalog>,
    pub created: Script<CreatedTicket>,
    pub current: Script<CurrentTicket>,
    pub served: Script<BreadRequirements>,
    pub wait_list: Script<()>,
    pub skipped: Script<bool>,
    pub batches: Script<NewBatch>,
    pub timeouts: Script<()>,
}

impl<'a> FakeBackend<'a> {
    pub fn new(clock: &'a ManualClock) -> Self {
        Self {
            clock,
            lock: None,
            calls: RefCell::new(Vec::new()),
            hang_next: Cell::new(false),
            catalogs: RefCell::default(),
            created: RefCell::default(),
            current: RefCell::default(),
            served: RefCell::default(),
            wait_list: RefCell::default(),
            skipped: RefCell::default(),
            batches: RefCell::default(),
            timeouts: RefCell::default(),
        }
    }

    /// Record whether `lock` is held during each call.
    pub fn watching(mut self, lock: &'a BusyLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// The next call never answers.
    pub fn hang_next(&self) {
        self.hang_next.set(true);
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.borrow().clone()
    }

    pub fn call_log(&self) -> Vec<Call> {
        self.calls.borrow().iter().map(|r| r.call.clone()).collect()
    }

    pub fn times_of(&self, call: &Call) -> Vec<u64> {
        self.calls
            .borrow()
            .iter()
            .filter(|r| &r.call == call)
            .map(|r| r.at_ms)
            .collect()
    }

    async fn answer<T>(
        &self,
        call: Call,
        script: &Script<T>,
        default: impl FnOnce() -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        self.calls.borrow_mut().push(CallRecord {
            at_ms: self.clock.now_ms(),
            call,
            locked: self.lock.is_some_and(BusyLock::is_held),
        });
        if self.hang_next.replace(false) {
            core::future::pending::<()>().await;
        }
        let next = script.borrow_mut().pop_front();
        next.unwrap_or_else(default)
    }
}

impl Backend for FakeBackend<'_> {
    async fn fetch_initial_catalog(&self) -> Result<BreadCatalog, BackendError> {
        self.answer(Call::FetchCatalog, &self.catalogs, || Err(BackendError::Transport))
            .await
    }

    async fn create_ticket(&self, req: &BreadRequirements) -> Result<CreatedTicket, BackendError> {
        self.answer(Call::CreateTicket(req.clone()), &self.created, || {
            Err(BackendError::Transport)
        })
        .await
    }

    async fn query_current_ticket(&self) -> Result<CurrentTicket, BackendError> {
        self.answer(Call::QueryCurrent, &self.current, || Ok(CurrentTicket::empty_queue()))
            .await
    }

    async fn serve_ticket(&self, id: TicketId) -> Result<BreadRequirements, BackendError> {
        self.answer(Call::Serve(id), &self.served, || Err(BackendError::Transport))
            .await
    }

    async fn send_to_wait_list(&self, id: TicketId) -> Result<(), BackendError> {
        self.answer(Call::WaitList(id), &self.wait_list, || Ok(())).await
    }

    async fn is_in_skipped_list(&self, id: TicketId) -> Result<bool, BackendError> {
        self.answer(Call::Skipped(id), &self.skipped, || Ok(true)).await
    }

    async fn start_new_bread_batch(&self) -> Result<NewBatch, BackendError> {
        self.answer(Call::NewBatch, &self.batches, || Err(BackendError::Transport))
            .await
    }

    async fn update_timeout(&self, seconds: i32) -> Result<(), BackendError> {
        self.answer(Call::UpdateTimeout(seconds), &self.timeouts, || Ok(()))
            .await
    }
}

pub fn push<T>(script: &Script<T>, answer: Result<T, BackendError>) {
    script.borrow_mut().push_back(answer);
}

#[derive(Default)]
pub struct RecordingTelemetry {
    pub messages: RefCell<Vec<String>>,
}

impl Telemetry for RecordingTelemetry {
    fn publish_error(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}

#[derive(Default)]
pub struct RecordingFeedback {
    pub signals: RefCell<Vec<FeedbackKind>>,
}

impl Feedback for RecordingFeedback {
    fn signal(&self, kind: FeedbackKind) {
        self.signals.borrow_mut().push(kind);
    }
}

#[derive(Default)]
pub struct RecordingPrinter {
    pub printed: Vec<(TicketId, String)>,
}

impl Printer for RecordingPrinter {
    async fn print_ticket(&mut self, id: TicketId, qr_payload: &str) {
        self.printed.push((id, qr_payload.to_string()));
    }
}

/// Scanner that hands out queued payloads, then nothing.
#[derive(Default)]
pub struct QueuedScans {
    pub pending: VecDeque<&'static str>,
}

impl ScanSource for QueuedScans {
    async fn next_scan(&mut self) -> Option<ScanPayload> {
        let s = self.pending.pop_front()?;
        ScanPayload::try_from(s).ok()
    }
}

/// Flash stand-in that stores the serialized record.
#[derive(Default)]
pub struct MemoryCache {
    pub record: Option<Vec<u8>>,
}

impl CatalogCache for MemoryCache {
    async fn load(&mut self) -> Option<BreadCatalog> {
        BreadCatalog::deserialize(self.record.as_deref()?)
    }

    async fn save(&mut self, catalog: &BreadCatalog) {
        let mut buf = [0u8; MAX_RECORD_SIZE];
        let len = catalog.serialize(&mut buf);
        self.record = Some(buf[..len].to_vec());
    }
}

/// Input levels set directly by the test.
pub struct Levels(pub [bool; INPUT_LINES]);

impl Levels {
    pub fn new() -> Self {
        Self([false; INPUT_LINES])
    }

    pub fn set(&mut self, line: InputLine, pressed: bool) {
        self.0[line.index()] = pressed;
    }
}

impl InputSampler for Levels {
    fn sample(&mut self, line: InputLine) -> bool {
        self.0[line.index()]
    }
}

/// Everything a workflow test needs, owned in one place.
pub struct Rig<'a> {
    pub clock: &'a ManualClock,
    pub backend: FakeBackend<'a>,
    pub telemetry: RecordingTelemetry,
    pub feedback: RecordingFeedback,
}

impl<'a> Rig<'a> {
    pub fn new(clock: &'a ManualClock, lock: &'a BusyLock) -> Self {
        Self {
            clock,
            backend: FakeBackend::new(clock).watching(lock),
            telemetry: RecordingTelemetry::default(),
            feedback: RecordingFeedback::default(),
        }
    }

    pub fn services(
        &self,
    ) -> Services<'_, FakeBackend<'a>, ManualClock, RecordingTelemetry, RecordingFeedback> {
        Services {
            backend: &self.backend,
            clock: self.clock,
            telemetry: &self.telemetry,
            feedback: &self.feedback,
        }
    }
}
