//! Application-wide constants and runtime policy.
//!
//! All hardware pin assignments, timing parameters, and limits live here
//! so they can be tuned in one place. Policy that tests (or a future
//! provisioning step) need to vary goes through [`KioskConfig`].

// Inputs

/// Input sampling cadence (ms).
pub const INPUT_POLL_MS: u64 = 10;

/// Minimum stable time before a raw transition counts as an edge (ms).
pub const DEBOUNCE_MS: u64 = 50;

/// Cells in the bread key matrix (2 rows × 4 columns).
pub const MATRIX_CELLS: usize = 8;

/// Matrix cells plus the confirm and new-bread buttons.
pub const INPUT_LINES: usize = MATRIX_CELLS + 2;

// Order limits

/// Bread slots shown on the display (first entries of the catalog).
pub const BREAD_TYPES: usize = 3;

/// Maximum catalog entries kept in memory / flash.
pub const MAX_BREAD_TYPES: usize = 10;

/// Per-slot ceiling - a single seven-segment digit.
pub const MAX_PER_TYPE: u8 = 9;

/// Ceiling for the whole order.
pub const MAX_TOTAL: u8 = 5;

// Backend

/// Upper bound on any backend call (ms).
pub const BACKEND_TIMEOUT_MS: u64 = 15_000;

/// Upper bound on the boot-time catalog fetch (ms).
pub const INIT_TIMEOUT_MS: u64 = 7_000;

/// Catalog fetch attempts before falling back to the flash cache.
pub const BOOT_FETCH_ATTEMPTS: u8 = 5;

/// Delay between boot fetch attempts (ms).
pub const INIT_RETRY_DELAY_MS: u64 = 5_000;

// Ticket flow

/// Poll suppression window while no customer is believed queued (ms).
pub const POLL_SUPPRESSION_MS: u64 = 300_000;

/// Sleep increment while polling is suppressed (ms).
pub const SUPPRESSED_SLEEP_MS: u64 = 10_000;

/// Backoff while init or network is not ready (ms).
pub const NOT_READY_BACKOFF_MS: u64 = 5_000;

/// Backoff after an empty-queue answer (ms).
pub const EMPTY_QUEUE_BACKOFF_MS: u64 = 5_000;

/// Backoff after a transport / parse failure (ms).
pub const ERROR_BACKOFF_MS: u64 = 5_000;

/// Backoff when another task holds the busy lock (ms).
pub const CONTENTION_BACKOFF_MS: u64 = 1_000;

/// Deadline wait granularity (ms).
pub const WAIT_TICK_MS: u64 = 1_000;

/// Time a handed-off ticket has to be scanned (ms).
pub const RECEIVE_WINDOW_MS: u64 = 180_000;

// UI

/// How long the API error pattern stays on the display (ms).
pub const ERROR_VISIBLE_MS: u64 = 3_000;

/// Half period of every blink animation (ms).
pub const BLINK_HALF_PERIOD_MS: u64 = 300;

/// Display refresh cadence (ms).
pub const DISPLAY_REFRESH_MS: u64 = 50;

/// Idle delay when the scan source has nothing to offer (ms).
pub const SCAN_IDLE_MS: u64 = 100;

/// Co-processor link health check cadence (ms).
pub const CONNECTIVITY_CHECK_MS: u64 = 2_000;

/// Prefix of the QR payload printed on every receipt. The scanner looks
/// for the `t=` marker, so the ticket id must follow it directly.
pub const QR_PAYLOAD_PREFIX: &str = "https://kiosk.bakery.local/r?t=";

// Queues and buffers

/// Pending button-initiated backend operations.
pub const COMMAND_QUEUE_DEPTH: usize = 4;

/// Pending telemetry messages awaiting the link.
pub const TELEMETRY_QUEUE_DEPTH: usize = 16;

/// Longest telemetry message (bytes).
pub const TELEMETRY_MSG_LEN: usize = 96;

/// Longest accepted scan line (bytes).
pub const SCAN_PAYLOAD_LEN: usize = 64;

/// Longest bridge line, either direction (bytes).
pub const LINK_LINE_LEN: usize = 128;

// Display (two cascaded MAX7219, 8 digits each)
//
// Cell coordinates are (device, digit). The layout follows the front panel:
//
//   primary counter  → 0.0 / 0.2 / 0.3
//   cook overlay     → 1.2 / 1.7 / 0.4
//   baker region     → 1.6 / 1.4 / 1.3
//   delivery region  → 1.0 / 1.5 / 1.1

/// Number of cascaded display drivers.
pub const DISPLAY_DEVICES: usize = 2;

/// Digits per display driver.
pub const DIGITS_PER_DEVICE: usize = 8;

// GPIO pin assignments (custom kiosk board)
//
//   Matrix rows      → P0.02, P0.03
//   Matrix columns   → P0.28, P0.29, P0.30, P0.31
//   Confirm button   → P0.11
//   New-bread button → P0.12
//   Buzzer           → P0.13
//   Display SPI      → SCK P0.19, MOSI P0.20, CS P0.21
//   Scanner/printer  → UARTE0 RX P0.08, TX P0.06
//   Co-processor     → UARTE1 RX P1.01, TX P1.02

// Catalog cache storage

/// Flash page index where the catalog cache starts (4 KB pages).
pub const STORAGE_FLASH_PAGE_START: u32 = 252;

/// Number of flash pages reserved for the catalog cache.
pub const STORAGE_FLASH_PAGE_COUNT: u32 = 4;

/// What to do with a ticket nobody scanned before its receive deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UnscannedPolicy {
    /// Give up at once; the ticket is marked skipped.
    Skip,
    /// Send the ticket back to the wait list up to `max_attempts` more
    /// times before giving up.
    Retry { max_attempts: u8 },
}

/// Tunable kiosk policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KioskConfig {
    pub max_per_type: u8,
    pub max_total: u8,
    pub backend_timeout_ms: u64,
    pub poll_suppression_ms: u64,
    pub receive_window_ms: u64,
    pub error_visible_ms: u64,
    pub unscanned: UnscannedPolicy,
}

impl KioskConfig {
    pub const DEFAULT: Self = Self {
        max_per_type: MAX_PER_TYPE,
        max_total: MAX_TOTAL,
        backend_timeout_ms: BACKEND_TIMEOUT_MS,
        poll_suppression_ms: POLL_SUPPRESSION_MS,
        receive_window_ms: RECEIVE_WINDOW_MS,
        error_visible_ms: ERROR_VISIBLE_MS,
        unscanned: UnscannedPolicy::Skip,
    };
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
