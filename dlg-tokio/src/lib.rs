//! Structured concurrency primitives shared by the gateway's runtime and
//! its HTTP server: a panic-propagating task handle and a multi-consumer
//! at-most-once shutdown signal.

pub mod notify_once;
pub mod task;
