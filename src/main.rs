//! Bakery kiosk firmware for nRF52840.
//!
//! Boots the panel, fetches the bread catalog over the co-processor link
//! (or takes the flash copy), then runs the ordering, ticket and delivery
//! tasks on the embassy executor.
//!
//! Build & flash:
//!   cargo run --release --features embedded

#![no_std]
#![no_main]

mod hw;

use bakery_kiosk::config::KioskConfig;
use bakery_kiosk::context::KioskContext;
use bakery_kiosk::orchestrator::KioskOrchestrator;
use bakery_kiosk::ports::Services;
use defmt::{info, unwrap};
use embassy_embedded_hal::adapter::BlockingAsync;
use embassy_executor::Spawner;
use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pull};
use embassy_nrf::nvmc::Nvmc;
use embassy_nrf::{bind_interrupts, peripherals, spim, uarte};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use hw::flash::FlashCache;
use hw::link::{LinkBackend, LinkTelemetry, TelemetryQueue};
use hw::max7219::Max7219;
use hw::serial::{QrScanner, ReceiptPrinter};
use hw::{Buzzer, EmbassyClock, PanelInputs};

bind_interrupts!(struct Irqs {
    UARTE0_UART0 => uarte::InterruptHandler<peripherals::UARTE0>;
    UARTE1 => uarte::InterruptHandler<peripherals::UARTE1>;
    SPIM3 => spim::InterruptHandler<peripherals::SPI3>;
});

type Kiosk = KioskOrchestrator<
    'static,
    CriticalSectionRawMutex,
    LinkBackend,
    EmbassyClock,
    LinkTelemetry,
    Buzzer,
>;

static CONTEXT: KioskContext<CriticalSectionRawMutex> = KioskContext::new(KioskConfig::DEFAULT);
static CLOCK: EmbassyClock = EmbassyClock;
static BUZZER: Buzzer = Buzzer::new();
static TELEMETRY_QUEUE: TelemetryQueue = Channel::new();
static TELEMETRY: LinkTelemetry = LinkTelemetry::new(&TELEMETRY_QUEUE);
static LINK: StaticCell<LinkBackend> = StaticCell::new();
static KIOSK: StaticCell<Kiosk> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Bakery kiosk starting");
    let p = embassy_nrf::init(Default::default());

    // Co-processor link.
    let mut link_config = uarte::Config::default();
    link_config.parity = uarte::Parity::EXCLUDED;
    link_config.baudrate = uarte::Baudrate::BAUD115200;
    let (link_tx, link_rx) =
        uarte::Uarte::new(p.UARTE1, Irqs, p.P1_01, p.P1_02, link_config).split();
    let link: &'static LinkBackend = LINK.init(LinkBackend::new(link_tx, link_rx));

    // Scanner and printer share UARTE0.
    let mut pos_config = uarte::Config::default();
    pos_config.parity = uarte::Parity::EXCLUDED;
    pos_config.baudrate = uarte::Baudrate::BAUD9600;
    let (pos_tx, pos_rx) = uarte::Uarte::new(p.UARTE0, Irqs, p.P0_08, p.P0_06, pos_config).split();

    let mut spi_config = spim::Config::default();
    spi_config.frequency = spim::Frequency::M1;
    let spi = spim::Spim::new_txonly(p.SPI3, Irqs, p.P0_19, p.P0_20, spi_config);
    let display = Max7219::new(spi, Output::new(p.P0_21, Level::High, OutputDrive::Standard));

    let inputs = PanelInputs {
        rows: [
            Output::new(p.P0_02, Level::High, OutputDrive::Standard),
            Output::new(p.P0_03, Level::High, OutputDrive::Standard),
        ],
        cols: [
            Input::new(p.P0_28, Pull::Up),
            Input::new(p.P0_29, Pull::Up),
            Input::new(p.P0_30, Pull::Up),
            Input::new(p.P0_31, Pull::Up),
        ],
        confirm: Input::new(p.P0_11, Pull::Up),
        new_bread: Input::new(p.P0_12, Pull::Up),
    };
    let buzzer_pin = Output::new(p.P0_13, Level::Low, OutputDrive::Standard);
    let mut cache = FlashCache::new(BlockingAsync::new(Nvmc::new(p.NVMC)));

    let services = Services {
        backend: link,
        clock: &CLOCK,
        telemetry: &TELEMETRY,
        feedback: &BUZZER,
    };
    let kiosk: &'static Kiosk = KIOSK.init(KioskOrchestrator::new(&CONTEXT, services));

    // Status frames and the link state are live while the catalog loads.
    unwrap!(spawner.spawn(display_task(kiosk, display)));
    unwrap!(spawner.spawn(buzzer_task(buzzer_pin)));
    unwrap!(spawner.spawn(link_monitor_task(link)));
    unwrap!(spawner.spawn(telemetry_task(link)));

    let source = kiosk.boot(&mut cache).await;
    info!("Catalog ready ({})", source);

    unwrap!(spawner.spawn(input_task(kiosk, inputs)));
    unwrap!(spawner.spawn(command_task(kiosk, ReceiptPrinter::new(pos_tx))));
    unwrap!(spawner.spawn(scan_task(kiosk, QrScanner::new(pos_rx))));
    unwrap!(spawner.spawn(ticket_flow_task(kiosk)));
}

#[embassy_executor::task]
async fn display_task(kiosk: &'static Kiosk, mut display: Max7219) -> ! {
    kiosk.display_task(&mut display).await
}

#[embassy_executor::task]
async fn buzzer_task(pin: Output<'static>) -> ! {
    hw::buzzer_task(&BUZZER, pin).await
}

#[embassy_executor::task]
async fn link_monitor_task(link: &'static LinkBackend) -> ! {
    hw::link::link_monitor(link, &CONTEXT).await
}

#[embassy_executor::task]
async fn telemetry_task(link: &'static LinkBackend) -> ! {
    hw::link::telemetry_drain(&TELEMETRY_QUEUE, link).await
}

#[embassy_executor::task]
async fn input_task(kiosk: &'static Kiosk, mut inputs: PanelInputs) -> ! {
    kiosk.input_task(&mut inputs).await
}

#[embassy_executor::task]
async fn command_task(kiosk: &'static Kiosk, mut printer: ReceiptPrinter) -> ! {
    kiosk.command_worker(&mut printer).await
}

#[embassy_executor::task]
async fn scan_task(kiosk: &'static Kiosk, mut scanner: QrScanner) -> ! {
    kiosk.scan_task(&mut scanner).await
}

#[embassy_executor::task]
async fn ticket_flow_task(kiosk: &'static Kiosk) -> ! {
    kiosk.ticket_flow().run().await
}
