//! HTTP transport for the daylight simulation orchestration gateway: the
//! downstream [`client::ServiceClient`], the inbound [`auth`] pre-filter,
//! and the [`server`] middleware stack.

pub mod auth;
pub mod client;
pub mod executor;
pub mod handlers;
pub mod server;
pub mod shaper;
