//! Line protocol to the network co-processor.
//!
//! The nRF52840 has no network stack of its own. A Wi-Fi co-processor on
//! UARTE1 speaks HTTP/MQTT to the bakery backend and exposes each backend
//! call as one ASCII request line answered by one response line.
//!
//! Requests:
//!
//! | Line                  | Call                      |
//! |-----------------------|---------------------------|
//! | `INIT`                | fetch catalog             |
//! | `NC <id>:<n> ...`     | create ticket             |
//! | `CT`                  | query current ticket      |
//! | `SV <ticket>`         | serve ticket              |
//! | `WL <ticket>`         | send to wait list         |
//! | `SK <ticket>`         | is in skipped list        |
//! | `NB`                  | start new bread batch     |
//! | `TO <secs>`           | update timeout            |
//! | `PUB <text>`          | telemetry (no reply)      |
//! | `PING`                | link check                |
//!
//! Replies are `OK [payload]` or `ERR <code>`.

use core::fmt::Write;

use heapless::String;

use crate::catalog::{BreadCatalog, BreadCatalogEntry};
use crate::config::{BREAD_TYPES, LINK_LINE_LEN};
use crate::error::{BackendError, Rejection};
use crate::model::{BreadCounts, BreadRequirements, TicketId};
use crate::ports::{CreatedTicket, CurrentTicket, NewBatch};

pub type Line = String<LINK_LINE_LEN>;

#[derive(Clone, Copy, Debug)]
pub enum Request<'a> {
    Init,
    CreateTicket(&'a BreadRequirements),
    CurrentTicket,
    Serve(TicketId),
    WaitList(TicketId),
    Skipped(TicketId),
    NewBatch,
    Timeout(i32),
    Publish(&'a str),
    Ping,
}

impl Request<'_> {
    /// Encode without the line terminator. Telemetry text is truncated to
    /// fit; anything else that does not fit is an error.
    pub fn encode(&self) -> Result<Line, BackendError> {
        let mut line = Line::new();
        let written = match *self {
            Request::Init => line.push_str("INIT").map_err(|_| core::fmt::Error),
            Request::CreateTicket(req) => {
                let mut r = line.push_str("NC").map_err(|_| core::fmt::Error);
                for (id, count) in req.iter() {
                    r = r.and_then(|_| write!(line, " {}:{}", id, count));
                }
                r
            }
            Request::CurrentTicket => line.push_str("CT").map_err(|_| core::fmt::Error),
            Request::Serve(id) => write!(line, "SV {}", id),
            Request::WaitList(id) => write!(line, "WL {}", id),
            Request::Skipped(id) => write!(line, "SK {}", id),
            Request::NewBatch => line.push_str("NB").map_err(|_| core::fmt::Error),
            Request::Timeout(secs) => write!(line, "TO {}", secs),
            Request::Publish(text) => {
                let _ = line.push_str("PUB ");
                for c in text.chars().filter(|c| !c.is_control()) {
                    if line.push(c).is_err() {
                        break;
                    }
                }
                Ok(())
            }
            Request::Ping => line.push_str("PING").map_err(|_| core::fmt::Error),
        };
        written.map_err(|_| BackendError::Transport)?;
        Ok(line)
    }

    pub fn expects_reply(&self) -> bool {
        !matches!(self, Request::Publish(_))
    }
}

/// Strip `OK` and return the payload, or map an `ERR` code.
pub fn payload(line: &str) -> Result<&str, BackendError> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("OK") {
        if rest.is_empty() || rest.starts_with(' ') {
            return Ok(rest.trim_start());
        }
    }
    match line.strip_prefix("ERR ").map(str::trim) {
        Some("NOT_IN_LIST") => Err(BackendError::Domain(Rejection::NotInList)),
        Some("HTTP" | "TIMEOUT" | "OFFLINE") => Err(BackendError::Transport),
        Some("JSON") => Err(BackendError::Parse),
        Some(_) => Err(BackendError::Domain(Rejection::Refused)),
        None => Err(BackendError::Parse),
    }
}

fn number<N: core::str::FromStr>(field: Option<&str>) -> Result<N, BackendError> {
    field
        .and_then(|f| f.parse().ok())
        .ok_or(BackendError::Parse)
}

fn pair(field: &str) -> Result<(u16, u16), BackendError> {
    let (a, b) = field.split_once(':').ok_or(BackendError::Parse)?;
    Ok((number(Some(a))?, number(Some(b))?))
}

fn requirements<'a>(fields: impl Iterator<Item = &'a str>) -> Result<BreadRequirements, BackendError> {
    let mut req = BreadRequirements::new();
    for field in fields {
        let (id, count) = pair(field)?;
        let count = u8::try_from(count).map_err(|_| BackendError::Parse)?;
        req.insert(id, count).map_err(|_| BackendError::Parse)?;
    }
    Ok(req)
}

/// `OK <id>:<cook_secs> ...`
pub fn parse_catalog(line: &str) -> Result<BreadCatalog, BackendError> {
    let mut catalog = BreadCatalog::new();
    for field in payload(line)?.split_ascii_whitespace() {
        let (id, cook_time_secs) = pair(field)?;
        catalog.push(BreadCatalogEntry { id, cook_time_secs });
    }
    Ok(catalog)
}

/// `OK <ticket> <show 0|1>`
pub fn parse_created(line: &str) -> Result<CreatedTicket, BackendError> {
    let mut fields = payload(line)?.split_ascii_whitespace();
    let ticket_id = number(fields.next())?;
    let show: u8 = number(fields.next())?;
    Ok(CreatedTicket {
        ticket_id,
        show_on_display: show != 0,
    })
}

/// `OK EMPTY` or `OK <ticket> <ready 0|1> <wait_secs> <id>:<n> ...`
pub fn parse_current(line: &str) -> Result<CurrentTicket, BackendError> {
    let body = payload(line)?;
    if body == "EMPTY" {
        return Ok(CurrentTicket::empty_queue());
    }
    let mut fields = body.split_ascii_whitespace();
    let ticket_id = number(fields.next())?;
    let ready: u8 = number(fields.next())?;
    let wait_secs = number(fields.next())?;
    Ok(CurrentTicket {
        has_customer_queued: true,
        ticket_id: Some(ticket_id),
        ready: ready != 0,
        wait_secs,
        requirements: requirements(fields)?,
    })
}

/// `OK <id>:<n> ...`
pub fn parse_requirements(line: &str) -> Result<BreadRequirements, BackendError> {
    requirements(payload(line)?.split_ascii_whitespace())
}

/// `OK`
pub fn parse_ack(line: &str) -> Result<(), BackendError> {
    payload(line).map(|_| ())
}

/// `OK 0|1`
pub fn parse_flag(line: &str) -> Result<bool, BackendError> {
    match payload(line)? {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(BackendError::Parse),
    }
}

/// `OK <index>` or `OK <index> <n>,<n>,<n>`
pub fn parse_new_batch(line: &str) -> Result<NewBatch, BackendError> {
    let mut fields = payload(line)?.split_ascii_whitespace();
    let bread_index = number(fields.next())?;
    let customer_counts = match fields.next() {
        None => None,
        Some(list) => {
            let mut counts: BreadCounts = [0; BREAD_TYPES];
            let mut parts = list.split(',');
            for slot in counts.iter_mut() {
                *slot = number(parts.next())?;
            }
            if parts.next().is_some() {
                return Err(BackendError::Parse);
            }
            Some(counts)
        }
    };
    Ok(NewBatch {
        bread_index,
        customer_counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_requests() {
        let mut req = BreadRequirements::new();
        req.insert(11, 3).unwrap();
        req.insert(12, 0).unwrap();
        assert_eq!(Request::CreateTicket(&req).encode().unwrap(), "NC 11:3 12:0");
        assert_eq!(Request::Serve(17).encode().unwrap(), "SV 17");
        assert_eq!(Request::Timeout(-12).encode().unwrap(), "TO -12");
        assert_eq!(Request::CurrentTicket.encode().unwrap(), "CT");
        assert!(!Request::Publish("x").expects_reply());
        assert!(Request::Ping.expects_reply());
    }

    #[test]
    fn telemetry_is_truncated_and_single_line() {
        let long = [b'a'; 300];
        let text = core::str::from_utf8(&long).unwrap();
        let line = Request::Publish(text).encode().unwrap();
        assert_eq!(line.len(), LINK_LINE_LEN);
        let line = Request::Publish("bad\nline").encode().unwrap();
        assert_eq!(line, "PUB badline");
    }

    #[test]
    fn error_codes_map_to_taxonomy() {
        assert_eq!(
            parse_ack("ERR NOT_IN_LIST"),
            Err(BackendError::Domain(Rejection::NotInList))
        );
        assert_eq!(parse_ack("ERR HTTP\r\n"), Err(BackendError::Transport));
        assert_eq!(parse_ack("ERR JSON"), Err(BackendError::Parse));
        assert_eq!(
            parse_ack("ERR CLOSED"),
            Err(BackendError::Domain(Rejection::Refused))
        );
        assert_eq!(parse_ack("garbage"), Err(BackendError::Parse));
        assert_eq!(parse_ack("OKAY"), Err(BackendError::Parse));
        assert_eq!(parse_ack("OK\r\n"), Ok(()));
    }

    #[test]
    fn parses_catalog() {
        let c = parse_catalog("OK 11:600 12:900 13:300").unwrap();
        assert_eq!(c.len(), 3);
        assert_eq!(c.entries()[1].cook_time_secs, 900);
        assert_eq!(parse_catalog("OK 11-600"), Err(BackendError::Parse));
    }

    #[test]
    fn parses_current_ticket() {
        assert_eq!(parse_current("OK EMPTY"), Ok(CurrentTicket::empty_queue()));

        let t = parse_current("OK 42 0 30 11:2 13:1").unwrap();
        assert!(t.has_customer_queued);
        assert_eq!(t.ticket_id, Some(42));
        assert!(!t.ready);
        assert_eq!(t.wait_secs, 30);
        assert_eq!(t.requirements.get(&13), Some(&1));

        assert_eq!(parse_current("OK 42 1"), Err(BackendError::Parse));
    }

    #[test]
    fn parses_small_answers() {
        assert_eq!(
            parse_created("OK 42 1"),
            Ok(CreatedTicket {
                ticket_id: 42,
                show_on_display: true
            })
        );
        assert_eq!(parse_flag("OK 1"), Ok(true));
        assert_eq!(parse_flag("OK 2"), Err(BackendError::Parse));
        let req = parse_requirements("OK 11:2 12:1").unwrap();
        assert_eq!(req.get(&11), Some(&2));
        assert_eq!(parse_requirements("OK 11:300"), Err(BackendError::Parse));
    }

    #[test]
    fn parses_new_batch() {
        assert_eq!(
            parse_new_batch("OK 2 3,1,0"),
            Ok(NewBatch {
                bread_index: 2,
                customer_counts: Some([3, 1, 0])
            })
        );
        assert_eq!(
            parse_new_batch("OK 0"),
            Ok(NewBatch {
                bread_index: 0,
                customer_counts: None
            })
        );
        assert_eq!(parse_new_batch("OK 1 3,1"), Err(BackendError::Parse));
        assert_eq!(parse_new_batch("OK 1 3,1,0,4"), Err(BackendError::Parse));
    }
}
