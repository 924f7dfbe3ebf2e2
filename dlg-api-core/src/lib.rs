//! Core types for the daylight simulation orchestration gateway: the data
//! model, the accumulator state machine, the wire contracts per downstream
//! stage, the NPZ/PNG binary parsers, the service registry, request
//! validation, and the closed error taxonomy.
//!
//! This crate is deliberately free of HTTP *transport* concerns (connection
//! pooling, retries, the axum server) - those live in `dlg-api`. It only
//! knows how to describe, validate, and translate the shapes of things that
//! flow through the pipeline.

pub mod accumulator;
pub mod endpoints;
pub mod error;
pub mod geometry;
pub mod npz;
pub mod registry;
pub mod validation;
pub mod wire;
