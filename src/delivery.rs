//! Scan-to-serve.
//!
//! The customer holds their receipt under the reader; the QR payload carries
//! the ticket id after a `t=` marker. A successful serve puts the parcel on
//! the delivery region and blocks further scans until the baker
//! acknowledges it (see [`KioskContext::acknowledge`]).

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::config::SCAN_IDLE_MS;
use crate::context::KioskContext;
use crate::error::{Error, Guard};
use crate::model::{BreadCounts, TicketId};
use crate::ports::{report, Backend, Feedback, FeedbackKind, ScanSource, Services, Telemetry};
use crate::time::{bounded, Clock};

/// Ticket id embedded in a scanned payload: the digits right after the
/// first `t=`.
pub fn parse_ticket_id(payload: &str) -> Option<TicketId> {
    let (_, rest) = payload.split_once("t=")?;
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Act on one scanned payload. Returns the parcel counts on success.
pub async fn handle_scan<M, B, C, T, F>(
    ctx: &KioskContext<M>,
    services: Services<'_, B, C, T, F>,
    payload: &str,
) -> Result<BreadCounts, Error>
where
    M: RawMutex,
    B: Backend,
    C: Clock,
    T: Telemetry,
    F: Feedback,
{
    if let Err(guard) = ctx.can_scan() {
        trace!("Scan ignored: {}", guard);
        return Err(guard.into());
    }
    let Some(id) = parse_ticket_id(payload) else {
        trace!("Scan ignored: no ticket id");
        return Err(Guard::NoTicketId.into());
    };

    let Some(_token) = ctx.busy().try_lock() else {
        trace!("Scan of ticket {} dropped: busy", id);
        return Err(Error::LockContention);
    };

    let result = bounded(
        services.clock,
        ctx.config().backend_timeout_ms,
        services.backend.serve_ticket(id),
    )
    .await;

    match result.map_err(Error::from) {
        Ok(req) => {
            let counts = ctx.catalog().slot_counts(&req);
            ctx.record_served(id, &counts);
            services.feedback.signal(FeedbackKind::Success);
            info!("Served ticket {}: {}", id, counts);
            Ok(counts)
        }
        Err(e @ Error::Domain(_)) => {
            warn!("Ticket {} refused: {}", id, e);
            services.feedback.signal(FeedbackKind::Error);
            Err(e)
        }
        Err(e) => {
            error!("serve_ticket({}) failed: {}", id, e);
            report(services.telemetry, format_args!("delivery:serve:{}:{}", id, e));
            ctx.show_error(services.clock.now_ms());
            Err(e)
        }
    }
}

/// Scan ingress loop.
pub async fn run<M, B, C, T, F, S>(
    ctx: &KioskContext<M>,
    services: Services<'_, B, C, T, F>,
    source: &mut S,
) -> !
where
    M: RawMutex,
    B: Backend,
    C: Clock,
    T: Telemetry,
    F: Feedback,
    S: ScanSource,
{
    info!("Scan ingress started");
    loop {
        match source.next_scan().await {
            Some(payload) => {
                let _ = handle_scan(ctx, services, &payload).await;
            }
            None => services.clock.sleep_ms(SCAN_IDLE_MS).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_id_follows_marker() {
        assert_eq!(parse_ticket_id("https://x/r?t=17"), Some(17));
        assert_eq!(parse_ticket_id("t=0042&x=1"), Some(42));
        assert_eq!(parse_ticket_id("a=1&t=9\r"), Some(9));
    }

    #[test]
    fn payloads_without_id_are_rejected() {
        assert_eq!(parse_ticket_id("https://x/r"), None);
        assert_eq!(parse_ticket_id("t="), None);
        assert_eq!(parse_ticket_id("t=abc"), None);
        assert_eq!(parse_ticket_id("t=99999999999"), None);
    }
}
