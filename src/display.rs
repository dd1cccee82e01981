//! Seven-segment front panel and the arbiter deciding who owns it.
//!
//! The panel is two cascaded 8-digit drivers. Four three-digit regions
//! share it:
//!
//! - **Primary counter** - the order the customer is building; blinks
//!   while a confirmation is in progress.
//! - **Baker region** - the reservation waiting for the baker; only drawn
//!   while the arbiter's mode is [`DisplayMode::Baker`], blinking during
//!   upload.
//! - **Delivery region** - the parcel waiting for acknowledgment; only
//!   drawn while the mode is [`DisplayMode::Delivery`].
//! - **Cook overlay** - what is in the oven; independent of the mode.
//!
//! The display task composes a whole [`Frame`] from a context snapshot
//! and pushes it to the driver, so there is exactly one writer per cell.

use crate::config::{BLINK_HALF_PERIOD_MS, BREAD_TYPES, DIGITS_PER_DEVICE, DISPLAY_DEVICES};
use crate::context::KioskStatus;
use crate::model::{total, BreadCounts, DeliveryParcel};
use crate::time::blink_on;

/// One digit position on the panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cell {
    pub device: u8,
    pub digit: u8,
}

const fn cell(device: u8, digit: u8) -> Cell {
    Cell { device, digit }
}

pub type Region = [Cell; BREAD_TYPES];

pub const PRIMARY: Region = [cell(0, 0), cell(0, 2), cell(0, 3)];
pub const COOK: Region = [cell(1, 2), cell(1, 7), cell(0, 4)];
pub const BAKER: Region = [cell(1, 6), cell(1, 4), cell(1, 3)];
pub const DELIVERY: Region = [cell(1, 0), cell(1, 5), cell(1, 1)];

/// What a single digit shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Glyph {
    Blank,
    Digit(u8),
    Dash,
    C,
    E,
}

impl Glyph {
    /// Segment pattern for a driver in no-decode mode (bit 7 = DP,
    /// bits 6..0 = segments A..G).
    pub fn segments(self) -> u8 {
        const DIGITS: [u8; 10] = [0x7E, 0x30, 0x6D, 0x79, 0x33, 0x5B, 0x5F, 0x70, 0x7F, 0x7B];
        match self {
            Glyph::Blank => 0x00,
            Glyph::Digit(d) => DIGITS[usize::from(d % 10)],
            Glyph::Dash => 0x01,
            Glyph::C => 0x4E,
            Glyph::E => 0x4F,
        }
    }
}

/// Low-level panel access. Last write per cell wins.
pub trait SegmentDisplay {
    fn set_glyph(&mut self, cell: Cell, glyph: Glyph);

    fn set_digit(&mut self, cell: Cell, value: u8) {
        self.set_glyph(cell, Glyph::Digit(value % 10));
    }

    fn set_blank(&mut self, cell: Cell) {
        self.set_glyph(cell, Glyph::Blank);
    }

    /// Push buffered writes to the hardware, for drivers that buffer.
    fn flush(&mut self) {}
}

/// Full panel contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    cells: [[Glyph; DIGITS_PER_DEVICE]; DISPLAY_DEVICES],
}

impl Frame {
    pub const fn blank() -> Self {
        Self {
            cells: [[Glyph::Blank; DIGITS_PER_DEVICE]; DISPLAY_DEVICES],
        }
    }

    pub fn get(&self, cell: Cell) -> Glyph {
        self.cells[usize::from(cell.device)][usize::from(cell.digit)]
    }

    fn set(&mut self, cell: Cell, glyph: Glyph) {
        self.cells[usize::from(cell.device)][usize::from(cell.digit)] = glyph;
    }

    fn fill(&mut self, glyph: Glyph) {
        self.cells = [[glyph; DIGITS_PER_DEVICE]; DISPLAY_DEVICES];
    }

    fn set_region(&mut self, region: &Region, glyph: Glyph) {
        for &c in region {
            self.set(c, glyph);
        }
    }

    fn set_counts(&mut self, region: &Region, counts: &BreadCounts) {
        for (&c, &n) in region.iter().zip(counts) {
            self.set(c, Glyph::Digit(n % 10));
        }
    }

    /// Counts shown in `region`, blanks read as zero.
    pub fn region_counts(&self, region: &Region) -> BreadCounts {
        let mut out = [0u8; BREAD_TYPES];
        for (slot, &c) in region.iter().enumerate() {
            if let Glyph::Digit(d) = self.get(c) {
                out[slot] = d;
            }
        }
        out
    }

    /// Whether every cell of `region` is blank.
    pub fn region_is_blank(&self, region: &Region) -> bool {
        region.iter().all(|&c| self.get(c) == Glyph::Blank)
    }

    /// Push every cell to the driver.
    pub fn apply<D: SegmentDisplay>(&self, display: &mut D) {
        for device in 0..DISPLAY_DEVICES {
            for digit in 0..DIGITS_PER_DEVICE {
                let c = cell(device as u8, digit as u8);
                match self.get(c) {
                    Glyph::Blank => display.set_blank(c),
                    Glyph::Digit(d) => display.set_digit(c, d),
                    other => display.set_glyph(c, other),
                }
            }
        }
        display.flush();
    }
}

/// Which renderer owns the shared secondary region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplayMode {
    #[default]
    None,
    Baker,
    Delivery,
}

/// The reservation shown to the baker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BakerView {
    pub counts: BreadCounts,
    pub uploading: bool,
}

/// Everything outside the arbiter that a frame depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayView {
    pub status: KioskStatus,
    pub pending: BreadCounts,
    pub baker: Option<BakerView>,
    pub parcel: DeliveryParcel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayModeArbiter {
    mode: DisplayMode,
    cook_overlay: [Option<u8>; BREAD_TYPES],
    confirmation_animating: bool,
}

impl DisplayModeArbiter {
    pub const fn new() -> Self {
        Self {
            mode: DisplayMode::None,
            cook_overlay: [None; BREAD_TYPES],
            confirmation_animating: false,
        }
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn cook_overlay(&self) -> [Option<u8>; BREAD_TYPES] {
        self.cook_overlay
    }

    pub fn is_animating(&self) -> bool {
        self.confirmation_animating
    }

    /// Confirmation started. Takes the region only if nobody owns it.
    pub fn enter_confirmation(&mut self, order_total: u16) {
        if order_total == 0 {
            return;
        }
        self.confirmation_animating = true;
        if self.mode == DisplayMode::None {
            self.set_mode(DisplayMode::Baker);
        }
    }

    /// Confirmation accepted or rejected. A pending parcel takes the region
    /// back even when it has nothing to draw, so it can still be acknowledged.
    pub fn finish_confirmation(&mut self, parcel: &DeliveryParcel) {
        self.confirmation_animating = false;
        self.set_mode(if parcel.pending {
            DisplayMode::Delivery
        } else {
            DisplayMode::None
        });
    }

    /// A parcel was served.
    pub fn on_served(&mut self) {
        if self.mode == DisplayMode::None {
            self.set_mode(DisplayMode::Delivery);
        }
    }

    /// The baker acknowledged the parcel.
    pub fn on_acknowledged(&mut self, reservation_pending: bool) {
        self.set_mode(if reservation_pending {
            DisplayMode::Baker
        } else {
            DisplayMode::None
        });
    }

    pub fn set_cook_overlay(&mut self, counts: &BreadCounts) {
        for (cell, &n) in self.cook_overlay.iter_mut().zip(counts) {
            *cell = Some(n);
        }
    }

    pub fn clear_cook_overlay(&mut self) {
        self.cook_overlay = [None; BREAD_TYPES];
    }

    fn set_mode(&mut self, mode: DisplayMode) {
        if self.mode != mode {
            debug!("Display mode {} -> {}", self.mode, mode);
            self.mode = mode;
        }
    }

    /// Compose the panel for `view` at `now_ms`.
    pub fn compose(&self, view: &DisplayView, now_ms: u64) -> Frame {
        let mut frame = Frame::blank();

        match view.status {
            KioskStatus::Normal => {}
            KioskStatus::Booting => return status_frame(Glyph::C, Glyph::Digit(3)),
            KioskStatus::Connecting => return status_frame(Glyph::C, Glyph::Digit(1)),
            KioskStatus::LinkError => return error_frame(Glyph::Digit(1)),
            KioskStatus::ApiError => return error_frame(Glyph::Digit(3)),
        }

        let blink = blink_on(now_ms, BLINK_HALF_PERIOD_MS);

        if !self.confirmation_animating || blink {
            frame.set_counts(&PRIMARY, &view.pending);
        }

        if let (DisplayMode::Baker, Some(baker)) = (self.mode, view.baker) {
            if total(&baker.counts) > 0 && (!baker.uploading || blink) {
                frame.set_counts(&BAKER, &baker.counts);
            }
        }

        if self.mode == DisplayMode::Delivery && view.parcel.is_showing() {
            frame.set_counts(&DELIVERY, &view.parcel.counts);
        }

        for (&c, n) in COOK.iter().zip(self.cook_overlay) {
            if let Some(n) = n {
                frame.set(c, Glyph::Digit(n % 10));
            }
        }

        frame
    }
}

impl Default for DisplayModeArbiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Dashes on the idle positions, `left` and `right` in the two secondary
/// columns.
fn status_frame(left: Glyph, right: Glyph) -> Frame {
    let mut frame = Frame::blank();
    for c in [cell(0, 0), cell(0, 2), cell(0, 3), cell(0, 4), cell(1, 2), cell(1, 7)] {
        frame.set(c, Glyph::Dash);
    }
    frame.set_region(&DELIVERY, left);
    frame.set_region(&BAKER, right);
    frame
}

fn error_frame(code: Glyph) -> Frame {
    let mut frame = Frame::blank();
    frame.fill(Glyph::Dash);
    frame.set_region(&DELIVERY, Glyph::E);
    frame.set_region(&BAKER, code);
    frame
}
