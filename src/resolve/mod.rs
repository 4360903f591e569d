//! Queue resolution
//!
//! The one place where three independent stores have to stay coherent:
//! - the persistent queue store marks the question resolved (source of truth)
//! - the live queue cache stops listing the student
//! - the notification channel tells subscribers
//!
//! See [`ResolveCoordinator`] for ordering and failure semantics.

mod coordinator;
mod outcome;

pub use coordinator::ResolveCoordinator;
pub use outcome::{Resolution, ResolveError, ResumeFrom, StepTimeouts};
