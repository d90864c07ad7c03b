//! Library crate for swap-conductor, exposing modules for binaries and integration tests.

/// Environment-driven settings.
pub mod config;
/// On-disk state, save artifacts and the plugin seam.
pub mod dao;
/// Wire and REST payloads.
pub mod dto;
/// Service errors and their HTTP mapping.
pub mod error;
/// HTTP, WebSocket and SSE routers.
pub mod routes;
/// Session logic behind the routes.
pub mod services;
/// Shared application state.
pub mod state;
