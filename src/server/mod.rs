//! Admin HTTP server.
//!
//! Class management plus the queue resolution endpoint, backed by the
//! coordinator and the SQLite store.

pub mod extract;
pub mod routes;

pub use routes::{build_router, serve, AppState};
