//! # greenhouse-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `SignalBackend`: drive and read GPIO levels (sysfs, virtual)
//!   - `EventPublisher`: fan out device events
//! - Define **driving/inbound** use-cases:
//!   - `StateStore`: the single authoritative record of commanded device state
//!   - `ControlDispatcher`: turns loosely-typed control requests into results
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `greenhouse-domain` only (plus `tokio::sync`/`tokio::time`).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod event_bus;
pub mod ports;
pub mod services;

#[cfg(test)]
mod test_support;
