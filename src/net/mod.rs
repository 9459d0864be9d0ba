//! Network layer: wire types, the HTTP seam, and the refreshing API client.

pub mod api;
pub mod transport;
pub mod types;
