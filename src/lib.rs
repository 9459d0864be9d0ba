//! # unihub
//!
//! Client core for the UniHub society platform: a REST client that recovers
//! from expired cookie credentials, the process-wide session state machine,
//! per-route authorization gates, and the invalidation bus and pollers that
//! keep notification badges and live chat current.
//!
//! Start from [`app::Hub`], which wires every component from a
//! [`config::ClientConfig`].

pub mod app;
pub mod bus;
pub mod config;
pub mod gate;
pub mod net;
pub mod poll;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use app::Hub;
pub use config::ClientConfig;
pub use net::types::{AccountId, ApiError, ApiResult};
