//! UARTE0: QR scanner on RX, receipt printer on TX.

use bakery_kiosk::config::SCAN_IDLE_MS;
use bakery_kiosk::model::TicketId;
use bakery_kiosk::ports::{Printer, ScanPayload, ScanSource};
use core::fmt::Write;
use defmt::{debug, warn};
use embassy_nrf::peripherals::UARTE0;
use embassy_nrf::uarte::{UarteRx, UarteTx};
use embassy_time::{with_timeout, Duration};
use heapless::{String, Vec};

/// Longest gap between two bytes of one scan.
const INTER_BYTE_TIMEOUT_MS: u64 = 50;

pub struct QrScanner {
    rx: UarteRx<'static, UARTE0>,
}

impl QrScanner {
    pub fn new(rx: UarteRx<'static, UARTE0>) -> Self {
        Self { rx }
    }

    async fn read_byte(&mut self, timeout_ms: u64) -> Option<u8> {
        let mut byte = [0u8; 1];
        match with_timeout(Duration::from_millis(timeout_ms), self.rx.read(&mut byte)).await {
            Ok(Ok(())) => Some(byte[0]),
            Ok(Err(_)) => {
                warn!("Scanner: UART error");
                None
            }
            Err(_) => None,
        }
    }
}

impl ScanSource for QrScanner {
    async fn next_scan(&mut self) -> Option<ScanPayload> {
        let mut byte = self.read_byte(SCAN_IDLE_MS).await?;
        let mut payload = ScanPayload::new();
        let mut overflow = false;
        loop {
            match byte {
                b'\r' | b'\n' if payload.is_empty() => {}
                b'\r' | b'\n' => break,
                b => overflow |= payload.push(char::from(b)).is_err(),
            }
            // A scan that stops mid-line is dropped.
            byte = self.read_byte(INTER_BYTE_TIMEOUT_MS).await?;
        }
        if overflow {
            warn!("Scanner: payload too long, dropped");
            return None;
        }
        debug!("Scanned {=str}", payload.as_str());
        Some(payload)
    }
}

/// ESC/POS receipt printer with a QR model 2 symbol.
pub struct ReceiptPrinter {
    tx: UarteTx<'static, UARTE0>,
}

impl ReceiptPrinter {
    pub fn new(tx: UarteTx<'static, UARTE0>) -> Self {
        Self { tx }
    }
}

fn qr_commands(qr_payload: &str) -> Vec<u8, 128> {
    let mut out: Vec<u8, 128> = Vec::new();
    let len = qr_payload.len() + 3;
    // GS ( k: module size 6, error correction M, store data, print.
    let _ = out.extend_from_slice(&[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x43, 0x06]);
    let _ = out.extend_from_slice(&[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x45, 0x31]);
    let _ = out.extend_from_slice(&[0x1D, 0x28, 0x6B, len as u8, (len >> 8) as u8, 0x31, 0x50, 0x30]);
    let _ = out.extend_from_slice(qr_payload.as_bytes());
    let _ = out.extend_from_slice(&[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30]);
    out
}

impl Printer for ReceiptPrinter {
    async fn print_ticket(&mut self, id: TicketId, qr_payload: &str) {
        let mut header: String<32> = String::new();
        let _ = write!(header, "\x1B@\x1Ba\x01TICKET {}\n\n", id);
        let qr = qr_commands(qr_payload);

        let result = async {
            self.tx.write(header.as_bytes()).await?;
            self.tx.write(&qr).await?;
            self.tx.write(b"\n\n\n\x1DV\x01").await
        }
        .await;
        if result.is_err() {
            warn!("Printer: write failed for ticket {}", id);
        }
    }
}
