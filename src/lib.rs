//! Library crate for quiz-clash-back, exposing modules for the binary and
//! integration tests.

/// Runtime configuration.
pub mod config;
/// Persistence seam and backends.
pub mod dao;
/// Request, response, and event payloads.
pub mod dto;
/// Error taxonomy and HTTP projection.
pub mod error;
/// REST and WebSocket route trees.
pub mod routes;
/// Command, query, and background services.
pub mod services;
/// Shared state: roster registry, battle phases, session hub.
pub mod state;
