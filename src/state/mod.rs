//! Process-wide session state and the manager that owns it.

pub mod auth;
pub mod session;
