//! Board support: the embassy-nrf side of every collaborator trait.

pub mod flash;
pub mod link;
pub mod max7219;
pub mod serial;

use bakery_kiosk::input::InputLine;
use bakery_kiosk::ports::{Feedback, FeedbackKind, InputSampler};
use bakery_kiosk::time::Clock;
use embassy_nrf::gpio::{Input, Output};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Instant, Timer};

/// [`Clock`] on the embassy-time driver (RTC1).
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }

    async fn sleep_ms(&self, ms: u64) {
        Timer::after_millis(ms).await;
    }
}

/// Beep patterns, played by [`buzzer_task`].
pub struct Buzzer {
    pending: Signal<CriticalSectionRawMutex, FeedbackKind>,
}

impl Buzzer {
    pub const fn new() -> Self {
        Self {
            pending: Signal::new(),
        }
    }
}

impl Feedback for Buzzer {
    fn signal(&self, kind: FeedbackKind) {
        self.pending.signal(kind);
    }
}

pub async fn buzzer_task(buzzer: &'static Buzzer, mut pin: Output<'static>) -> ! {
    loop {
        let (beeps, on_ms) = match buzzer.pending.wait().await {
            FeedbackKind::Success => (1, 120),
            FeedbackKind::Error => (3, 80),
        };
        for _ in 0..beeps {
            pin.set_high();
            Timer::after_millis(on_ms).await;
            pin.set_low();
            Timer::after_millis(80).await;
        }
    }
}

/// 2x4 key matrix plus the two dedicated buttons, all active-low.
///
/// Rows are driven low one at a time; columns have pull-ups.
pub struct PanelInputs {
    pub rows: [Output<'static>; 2],
    pub cols: [Input<'static>; 4],
    pub confirm: Input<'static>,
    pub new_bread: Input<'static>,
}

impl InputSampler for PanelInputs {
    fn sample(&mut self, line: InputLine) -> bool {
        match line {
            InputLine::Confirm => self.confirm.is_low(),
            InputLine::NewBread => self.new_bread.is_low(),
            InputLine::Matrix(_) => {
                let Some((row, col)) = line.row_col() else {
                    return false;
                };
                self.rows[row].set_low();
                // Let the column settle before reading.
                cortex_m::asm::delay(64);
                let pressed = self.cols[col].is_low();
                self.rows[row].set_high();
                pressed
            }
        }
    }
}
