//! # greenhouse-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve the **device API** under `/api/iot`:
//!   control (`POST /control`), status (`GET /status`), polarity changes,
//!   pin diagnostics and a server-sent event stream
//! - Map HTTP requests into application service calls (driving adapter)
//! - Map application results and errors into JSON responses
//!
//! ## Dependency rule
//! Depends on `greenhouse-app` (for port traits and services) and
//! `greenhouse-domain` (for types used in request/response mapping). Never
//! leaks axum types into the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;
