//! Integration tests: the public workflows driven through the line
//! protocol, with a scripted co-processor on the other end.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use bakery_kiosk::bridge::{self, Request};
use bakery_kiosk::catalog::{BreadCatalog, CatalogCache};
use bakery_kiosk::config::KioskConfig;
use bakery_kiosk::confirmation::ConfirmationPhase;
use bakery_kiosk::context::{KioskContext, KioskStatus, LinkState};
use bakery_kiosk::delivery;
use bakery_kiosk::display::{BAKER, DELIVERY};
use bakery_kiosk::error::{BackendError, Error, Rejection};
use bakery_kiosk::input::{self, Action, InputLine};
use bakery_kiosk::model::{BreadRequirements, TicketId};
use bakery_kiosk::orchestrator::{CatalogSource, KioskOrchestrator};
use bakery_kiosk::ports::{
    Backend, CreatedTicket, CurrentTicket, Feedback, FeedbackKind, NewBatch, Printer, Services,
    Telemetry,
};
use bakery_kiosk::time::Clock;
use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;

struct StepClock(Cell<u64>);

impl Clock for StepClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }

    async fn sleep_ms(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
        embassy_futures::yield_now().await;
    }
}

/// Co-processor stand-in: logs every request line and answers from a
/// script.
#[derive(Default)]
struct CoProcessor {
    sent: RefCell<Vec<String>>,
    replies: RefCell<VecDeque<&'static str>>,
}

impl CoProcessor {
    fn reply(&self, line: &'static str) {
        self.replies.borrow_mut().push_back(line);
    }

    fn exchange(&self, request: Request<'_>) -> Result<String, BackendError> {
        let line = request.encode()?;
        self.sent.borrow_mut().push(line.as_str().to_owned());
        Ok(self
            .replies
            .borrow_mut()
            .pop_front()
            .unwrap_or("ERR OFFLINE")
            .to_owned())
    }
}

impl Backend for CoProcessor {
    async fn fetch_initial_catalog(&self) -> Result<BreadCatalog, BackendError> {
        bridge::parse_catalog(&self.exchange(Request::Init)?)
    }

    async fn create_ticket(&self, req: &BreadRequirements) -> Result<CreatedTicket, BackendError> {
        bridge::parse_created(&self.exchange(Request::CreateTicket(req))?)
    }

    async fn query_current_ticket(&self) -> Result<CurrentTicket, BackendError> {
        bridge::parse_current(&self.exchange(Request::CurrentTicket)?)
    }

    async fn serve_ticket(&self, id: TicketId) -> Result<BreadRequirements, BackendError> {
        bridge::parse_requirements(&self.exchange(Request::Serve(id))?)
    }

    async fn send_to_wait_list(&self, id: TicketId) -> Result<(), BackendError> {
        bridge::parse_ack(&self.exchange(Request::WaitList(id))?)
    }

    async fn is_in_skipped_list(&self, id: TicketId) -> Result<bool, BackendError> {
        bridge::parse_flag(&self.exchange(Request::Skipped(id))?)
    }

    async fn start_new_bread_batch(&self) -> Result<NewBatch, BackendError> {
        bridge::parse_new_batch(&self.exchange(Request::NewBatch)?)
    }

    async fn update_timeout(&self, seconds: i32) -> Result<(), BackendError> {
        bridge::parse_ack(&self.exchange(Request::Timeout(seconds))?)
    }
}

#[derive(Default)]
struct Log {
    telemetry: RefCell<Vec<String>>,
    feedback: RefCell<Vec<FeedbackKind>>,
}

impl Telemetry for Log {
    fn publish_error(&self, message: &str) {
        self.telemetry.borrow_mut().push(message.to_owned());
    }
}

impl Feedback for Log {
    fn signal(&self, kind: FeedbackKind) {
        self.feedback.borrow_mut().push(kind);
    }
}

struct Paper(Vec<(TicketId, String)>);

impl Printer for Paper {
    async fn print_ticket(&mut self, id: TicketId, qr_payload: &str) {
        self.0.push((id, qr_payload.to_owned()));
    }
}

struct NoFlash;

impl CatalogCache for NoFlash {
    async fn load(&mut self) -> Option<BreadCatalog> {
        None
    }

    async fn save(&mut self, _catalog: &BreadCatalog) {}
}

fn press(ctx: &KioskContext<NoopRawMutex>, line: InputLine, now: u64) -> Action {
    input::dispatch(ctx, line, now)
}

#[test]
fn order_print_scan_and_hand_over() {
    let clock = StepClock(Cell::new(0));
    let link = CoProcessor::default();
    let log = Log::default();
    let ctx = KioskContext::<NoopRawMutex>::new(KioskConfig::default());
    ctx.set_link(LinkState::Up);
    let services = Services {
        backend: &link,
        clock: &clock,
        telemetry: &log,
        feedback: &log,
    };
    let kiosk = KioskOrchestrator::new(&ctx, services);

    link.reply("OK 11:600 12:900 13:300 14:1200");
    assert_eq!(block_on(kiosk.boot(&mut NoFlash)), CatalogSource::Backend);
    assert_eq!(ctx.status(clock.now_ms()), KioskStatus::Normal);

    // Two of the first bread, one of the third, then confirm.
    assert_eq!(press(&ctx, InputLine::Matrix(0), 0), Action::Increment(0));
    press(&ctx, InputLine::Matrix(0), 0);
    press(&ctx, InputLine::Matrix(2), 0);
    assert_eq!(press(&ctx, InputLine::Confirm, 0), Action::Confirm);
    assert_eq!(ctx.phase(), ConfirmationPhase::Confirming);
    assert_eq!(ctx.frame(0).region_counts(&BAKER), [2, 0, 1]);

    // Accept goes through the command queue.
    assert_eq!(press(&ctx, InputLine::Matrix(0), 0), Action::Accept);
    let command = ctx.commands().try_receive().unwrap();
    link.reply("OK 42 0");
    let mut paper = Paper(Vec::new());
    block_on(kiosk.execute(command, &mut paper)).unwrap();

    assert_eq!(ctx.phase(), ConfirmationPhase::Building);
    assert_eq!(paper.0.len(), 1);
    assert_eq!(paper.0[0].0, 42);
    assert_eq!(delivery::parse_ticket_id(&paper.0[0].1), Some(42));

    // The printed code comes back through the scanner.
    link.reply("OK 11:2 13:1");
    let counts = block_on(delivery::handle_scan(&ctx, services, &paper.0[0].1)).unwrap();
    assert_eq!(counts, [2, 0, 1]);
    assert!(ctx.parcel().pending);
    assert_eq!(ctx.frame(clock.now_ms()).region_counts(&DELIVERY), [2, 0, 1]);
    assert_eq!(log.feedback.borrow().as_slice(), &[FeedbackKind::Success]);

    assert_eq!(press(&ctx, InputLine::Matrix(3), 0), Action::Acknowledge);
    assert!(!ctx.parcel().pending);

    assert_eq!(
        link.sent.borrow().as_slice(),
        &["INIT", "NC 11:2 12:0 13:1 14:0", "SV 42"]
    );
    assert!(log.telemetry.borrow().is_empty());
}

#[test]
fn co_processor_errors_reach_the_right_surface() {
    let clock = StepClock(Cell::new(0));
    let link = CoProcessor::default();
    let log = Log::default();
    let ctx = KioskContext::<NoopRawMutex>::new(KioskConfig::default());
    ctx.set_link(LinkState::Up);
    let services = Services {
        backend: &link,
        clock: &clock,
        telemetry: &log,
        feedback: &log,
    };
    let kiosk = KioskOrchestrator::new(&ctx, services);
    link.reply("OK 11:600 12:900 13:300");
    block_on(kiosk.boot(&mut NoFlash));

    // A ticket the backend does not know only buzzes.
    link.reply("ERR NOT_IN_LIST");
    let scan = block_on(delivery::handle_scan(&ctx, services, "r?t=7"));
    assert_eq!(scan, Err(Error::Domain(Rejection::NotInList)));
    assert!(log.telemetry.borrow().is_empty());
    assert_eq!(ctx.status(clock.now_ms()), KioskStatus::Normal);

    // An HTTP failure is reported and shown, without a buzz.
    link.reply("ERR HTTP");
    let scan = block_on(delivery::handle_scan(&ctx, services, "r?t=7"));
    assert_eq!(scan, Err(Error::Transport));
    assert_eq!(log.telemetry.borrow().len(), 1);
    assert_eq!(ctx.status(clock.now_ms()), KioskStatus::ApiError);
    assert!(!ctx.parcel().pending);
    assert_eq!(log.feedback.borrow().as_slice(), &[FeedbackKind::Error]);
}
