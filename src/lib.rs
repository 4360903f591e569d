//! tutorq-admin - Administrative API for the TutorQ question queue
//!
//! Resolving a student's question touches three independent stores that
//! have no shared transaction. This crate keeps them coherent by ordering
//! the side effects and reporting exactly how far a resolution got.
//!
//! # Architecture
//!
//! ```text
//!              DELETE /v1/queue/{student_id}
//!                            │
//!                            ▼
//!            ┌──────────────────────────────┐
//!            │      ResolveCoordinator      │
//!            │  lookup → store → cache →    │
//!            │  notify (stop at 1st error)  │
//!            └──────┬─────────┬────────┬────┘
//!                   │         │        │
//!                   ▼         ▼        ▼
//!            ┌──────────┐ ┌────────┐ ┌──────────────┐
//!            │  SQLite  │ │ Redis  │ │ Redis stream │
//!            │ questions│ │ "queue"│ │tutorq:events │
//!            │ (truth)  │ │snapshot│ │   events     │
//!            └──────────┘ └────────┘ └──────────────┘
//! ```
//!
//! The store write is conditional, so concurrent resolutions of the same
//! student converge on one timestamp. Calling resolve again after a cache or
//! notify failure re-runs only the derived steps.
//!
//! # Example
//!
//! ```bash
//! tutorq-admin --db queue.db --redis redis://localhost:6379
//! curl -X DELETE http://127.0.0.1:8080/v1/queue/S1
//! ```

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod notify;
pub mod resolve;
pub mod server;

pub use config::{AdminConfig, CliArgs};
pub use error::{AdminError, ApiError, Result};
pub use resolve::{Resolution, ResolveCoordinator, ResolveError, ResumeFrom, StepTimeouts};
