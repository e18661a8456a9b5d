//! Application services (use-cases).

pub mod dispatcher;
pub mod state_store;
