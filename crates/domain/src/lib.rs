//! # greenhouse-domain
//!
//! Pure domain model for the greenhouse device-control core.
//!
//! ## Responsibilities
//! - Foundational types: device identifiers, pins, electrical levels, error conventions
//! - Define **Devices** (relay-driven actuators: fans, pump, light) and the
//!   **DeviceRegistry** that catalogues them together with their aliases
//! - Resolve free-form user input to canonical device ids (**NameResolver**)
//! - Translate logical ON/OFF intent to electrical levels (**PolarityPolicy**)
//! - Normalize the accepted control-request shapes into **ControlActions**
//! - Define **Events** (state-change records)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! Hardware access is expressed as a trait in the `app` crate (ports).

pub mod error;
pub mod id;

pub mod control;
pub mod device;
pub mod event;
pub mod polarity;
pub mod registry;
pub mod resolver;
pub mod signal;
pub mod status;
