//! Two cascaded MAX7219 drivers on SPIM3.
//!
//! Writes land in a framebuffer; [`SegmentDisplay::flush`] shifts out only
//! the digit rows that changed. Decode mode is off, so every digit register
//! takes raw segments from [`Glyph::segments`].

use bakery_kiosk::config::{DIGITS_PER_DEVICE, DISPLAY_DEVICES};
use bakery_kiosk::display::{Cell, Glyph, SegmentDisplay};
use defmt::warn;
use embassy_nrf::gpio::Output;
use embassy_nrf::peripherals::SPI3;
use embassy_nrf::spim::Spim;

const REG_DIGIT0: u8 = 0x01;
const REG_DECODE_MODE: u8 = 0x09;
const REG_INTENSITY: u8 = 0x0A;
const REG_SCAN_LIMIT: u8 = 0x0B;
const REG_SHUTDOWN: u8 = 0x0C;
const REG_DISPLAY_TEST: u8 = 0x0F;

const INTENSITY: u8 = 0x08;

pub struct Max7219 {
    spi: Spim<'static, SPI3>,
    cs: Output<'static>,
    frame: [[u8; DIGITS_PER_DEVICE]; DISPLAY_DEVICES],
    dirty: [bool; DIGITS_PER_DEVICE],
}

impl Max7219 {
    pub fn new(spi: Spim<'static, SPI3>, cs: Output<'static>) -> Self {
        let mut display = Self {
            spi,
            cs,
            frame: [[0; DIGITS_PER_DEVICE]; DISPLAY_DEVICES],
            dirty: [true; DIGITS_PER_DEVICE],
        };
        display.init();
        display
    }

    fn init(&mut self) {
        self.broadcast(REG_DISPLAY_TEST, 0);
        self.broadcast(REG_DECODE_MODE, 0);
        self.broadcast(REG_SCAN_LIMIT, (DIGITS_PER_DEVICE - 1) as u8);
        self.broadcast(REG_INTENSITY, INTENSITY);
        self.broadcast(REG_SHUTDOWN, 1);
        self.flush();
    }

    fn broadcast(&mut self, reg: u8, value: u8) {
        self.shift_out([(reg, value); DISPLAY_DEVICES]);
    }

    /// One register write per device. The first pair shifts through to the
    /// far end of the chain, so device 0 goes last.
    fn shift_out(&mut self, writes: [(u8, u8); DISPLAY_DEVICES]) {
        let mut buf = [0u8; 2 * DISPLAY_DEVICES];
        for (i, (reg, value)) in writes.iter().rev().enumerate() {
            buf[2 * i] = *reg;
            buf[2 * i + 1] = *value;
        }
        self.cs.set_low();
        if self.spi.blocking_write(&buf).is_err() {
            warn!("MAX7219: SPI write failed");
        }
        self.cs.set_high();
    }
}

impl SegmentDisplay for Max7219 {
    fn set_glyph(&mut self, cell: Cell, glyph: Glyph) {
        let (dev, digit) = (usize::from(cell.device), usize::from(cell.digit));
        let segments = glyph.segments();
        if self.frame[dev][digit] != segments {
            self.frame[dev][digit] = segments;
            self.dirty[digit] = true;
        }
    }

    fn flush(&mut self) {
        for digit in 0..DIGITS_PER_DEVICE {
            if !core::mem::take(&mut self.dirty[digit]) {
                continue;
            }
            let reg = REG_DIGIT0 + digit as u8;
            let mut writes = [(reg, 0u8); DISPLAY_DEVICES];
            for (dev, write) in writes.iter_mut().enumerate() {
                write.1 = self.frame[dev][digit];
            }
            self.shift_out(writes);
        }
    }
}
