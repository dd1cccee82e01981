//! Monotonic time, bounded calls and deadline arithmetic.
//!
//! The core never reads a hardware timer directly; it goes through a
//! [`Clock`] so the same workflows run on embassy-time on target and on a
//! hand-cranked clock in host tests.

use core::future::Future;

use embassy_futures::select::{select, Either};

use crate::error::BackendError;

/// Millisecond monotonic clock with an async sleep.
#[allow(async_fn_in_trait)]
pub trait Clock {
    fn now_ms(&self) -> u64;
    async fn sleep_ms(&self, ms: u64);
}

/// Run `fut`, giving up after `timeout_ms`. A timeout is a transport
/// failure as far as the workflows are concerned.
pub async fn bounded<C, F, T>(clock: &C, timeout_ms: u64, fut: F) -> Result<T, BackendError>
where
    C: Clock,
    F: Future<Output = Result<T, BackendError>>,
{
    match select(fut, clock.sleep_ms(timeout_ms)).await {
        Either::First(result) => result,
        Either::Second(()) => {
            warn!("Backend call timed out after {} ms", timeout_ms);
            Err(BackendError::Transport)
        }
    }
}

/// Milliseconds left until `deadline_ms`; zero once it has passed.
pub fn remaining_ms(now_ms: u64, deadline_ms: u64) -> u64 {
    deadline_ms.saturating_sub(now_ms)
}

/// Deadline `secs` seconds after `now_ms`.
pub fn deadline_after_secs(now_ms: u64, secs: u32) -> u64 {
    now_ms.saturating_add(u64::from(secs) * 1_000)
}

/// Whether the blink animation is in its visible half at `now_ms`.
pub fn blink_on(now_ms: u64, half_period_ms: u64) -> bool {
    (now_ms / half_period_ms.max(1)) % 2 == 0
}
