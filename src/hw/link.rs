//! Backend and telemetry over the co-processor link (UARTE1).
//!
//! One request line out, one reply line back, see [`bakery_kiosk::bridge`].
//! The port is behind an async mutex so the ticket flow, the command worker,
//! the telemetry drain and the link monitor take turns.

use bakery_kiosk::bridge::{self, Line, Request};
use bakery_kiosk::catalog::BreadCatalog;
use bakery_kiosk::config::{CONNECTIVITY_CHECK_MS, TELEMETRY_MSG_LEN, TELEMETRY_QUEUE_DEPTH};
use bakery_kiosk::context::{KioskContext, LinkState};
use bakery_kiosk::error::BackendError;
use bakery_kiosk::model::{BreadRequirements, TicketId};
use bakery_kiosk::ports::{Backend, CreatedTicket, CurrentTicket, NewBatch, Telemetry};
use defmt::{debug, warn};
use embassy_nrf::peripherals::UARTE1;
use embassy_nrf::uarte::{UarteRx, UarteTx};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_time::{with_timeout, Duration, Timer};
use heapless::String;

/// Quiet time that counts as "no stale reply pending".
const DRAIN_IDLE_MS: u64 = 5;

/// How long a PING may take before the link counts as down.
const PING_TIMEOUT_MS: u64 = 1_000;

pub type TelemetryMessage = String<TELEMETRY_MSG_LEN>;

pub type TelemetryQueue = Channel<CriticalSectionRawMutex, TelemetryMessage, TELEMETRY_QUEUE_DEPTH>;

struct LinkPort {
    tx: UarteTx<'static, UARTE1>,
    rx: UarteRx<'static, UARTE1>,
}

impl LinkPort {
    /// Throw away whatever a cancelled call left in the receiver.
    async fn drain(&mut self) {
        let mut byte = [0u8; 1];
        while let Ok(Ok(())) =
            with_timeout(Duration::from_millis(DRAIN_IDLE_MS), self.rx.read(&mut byte)).await
        {
            debug!("Link: dropped stale byte {=u8:x}", byte[0]);
        }
    }

    async fn send(&mut self, line: &str) -> Result<(), BackendError> {
        self.tx
            .write(line.as_bytes())
            .await
            .map_err(|_| BackendError::Transport)?;
        self.tx.write(b"\n").await.map_err(|_| BackendError::Transport)
    }

    async fn receive(&mut self) -> Result<Line, BackendError> {
        let mut line = Line::new();
        let mut byte = [0u8; 1];
        loop {
            self.rx
                .read(&mut byte)
                .await
                .map_err(|_| BackendError::Transport)?;
            match byte[0] {
                b'\n' => return Ok(line),
                b'\r' => {}
                b => line.push(char::from(b)).map_err(|_| BackendError::Parse)?,
            }
        }
    }
}

pub struct LinkBackend {
    port: Mutex<CriticalSectionRawMutex, LinkPort>,
}

impl LinkBackend {
    pub fn new(tx: UarteTx<'static, UARTE1>, rx: UarteRx<'static, UARTE1>) -> Self {
        Self {
            port: Mutex::new(LinkPort { tx, rx }),
        }
    }

    async fn exchange(&self, request: Request<'_>) -> Result<Line, BackendError> {
        let line = request.encode()?;
        let mut port = self.port.lock().await;
        port.drain().await;
        port.send(&line).await?;
        if !request.expects_reply() {
            return Ok(Line::new());
        }
        port.receive().await
    }

    pub async fn ping(&self) -> bool {
        let reply = with_timeout(
            Duration::from_millis(PING_TIMEOUT_MS),
            self.exchange(Request::Ping),
        )
        .await;
        matches!(reply, Ok(Ok(line)) if bridge::parse_ack(&line).is_ok())
    }

    pub async fn publish(&self, text: &str) {
        if self.exchange(Request::Publish(text)).await.is_err() {
            warn!("Telemetry dropped: link write failed");
        }
    }
}

impl Backend for LinkBackend {
    async fn fetch_initial_catalog(&self) -> Result<BreadCatalog, BackendError> {
        bridge::parse_catalog(&self.exchange(Request::Init).await?)
    }

    async fn create_ticket(&self, req: &BreadRequirements) -> Result<CreatedTicket, BackendError> {
        bridge::parse_created(&self.exchange(Request::CreateTicket(req)).await?)
    }

    async fn query_current_ticket(&self) -> Result<CurrentTicket, BackendError> {
        bridge::parse_current(&self.exchange(Request::CurrentTicket).await?)
    }

    async fn serve_ticket(&self, id: TicketId) -> Result<BreadRequirements, BackendError> {
        bridge::parse_requirements(&self.exchange(Request::Serve(id)).await?)
    }

    async fn send_to_wait_list(&self, id: TicketId) -> Result<(), BackendError> {
        bridge::parse_ack(&self.exchange(Request::WaitList(id)).await?)
    }

    async fn is_in_skipped_list(&self, id: TicketId) -> Result<bool, BackendError> {
        bridge::parse_flag(&self.exchange(Request::Skipped(id)).await?)
    }

    async fn start_new_bread_batch(&self) -> Result<NewBatch, BackendError> {
        bridge::parse_new_batch(&self.exchange(Request::NewBatch).await?)
    }

    async fn update_timeout(&self, seconds: i32) -> Result<(), BackendError> {
        bridge::parse_ack(&self.exchange(Request::Timeout(seconds)).await?)
    }
}

/// Queues messages for [`telemetry_drain`]. A full queue drops the message.
pub struct LinkTelemetry {
    queue: &'static TelemetryQueue,
}

impl LinkTelemetry {
    pub const fn new(queue: &'static TelemetryQueue) -> Self {
        Self { queue }
    }
}

impl Telemetry for LinkTelemetry {
    fn publish_error(&self, message: &str) {
        let mut msg = TelemetryMessage::new();
        for c in message.chars() {
            if msg.push(c).is_err() {
                break;
            }
        }
        if self.queue.try_send(msg).is_err() {
            warn!("Telemetry queue full, message dropped");
        }
    }
}

/// Forward queued telemetry to the co-processor.
pub async fn telemetry_drain(queue: &'static TelemetryQueue, link: &'static LinkBackend) -> ! {
    loop {
        let msg = queue.receive().await;
        link.publish(&msg).await;
    }
}

/// Track the link state with a PING every few seconds.
pub async fn link_monitor(
    link: &'static LinkBackend,
    ctx: &'static KioskContext<CriticalSectionRawMutex>,
) -> ! {
    loop {
        ctx.set_link(if link.ping().await {
            LinkState::Up
        } else {
            LinkState::Down
        });
        Timer::after_millis(CONNECTIVITY_CHECK_MS).await;
    }
}
