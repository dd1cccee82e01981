//! Orchestration core of the bakery kiosk firmware.
//!
//! Everything that decides *what* the kiosk does lives here and builds for
//! both the nRF52840 target and the host. Hardware and the network
//! co-processor sit behind the traits in [`ports`], [`time::Clock`] and
//! [`display::SegmentDisplay`]; the embedded binary (`src/main.rs`, behind
//! the `embedded` feature) implements them and spawns the tasks.
//!
//! Usage: `cargo test` on the host, `cargo run --release --features embedded`
//! on target (probe-rs runner).
//!
//! ## Tasks
//!
//! | Task           | Loop                                         |
//! |----------------|----------------------------------------------|
//! | ticket flow    | [`ticket_flow::TicketFlowController::run`]   |
//! | scan ingress   | [`delivery::run`]                            |
//! | input          | [`orchestrator::KioskOrchestrator::input_task`] |
//! | command worker | [`orchestrator::KioskOrchestrator::command_worker`] |
//! | display        | [`orchestrator::KioskOrchestrator::display_task`] |
//!
//! All of them share one [`context::KioskContext`].

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible in every module.
mod fmt;

pub mod bridge;
pub mod busy;
pub mod catalog;
pub mod config;
pub mod confirmation;
pub mod context;
pub mod debounce;
pub mod delivery;
pub mod display;
pub mod error;
pub mod input;
pub mod model;
pub mod orchestrator;
pub mod ports;
pub mod ticket_flow;
pub mod time;

#[cfg(test)]
mod testing;
