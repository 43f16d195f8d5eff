//! The save coordination engine
//!
//! Intake, debouncing, merging, the sequential drain loop, versioning, and
//! retry live here. Everything outward-facing goes through
//! [`SaveCoordinator`].

mod core;
mod merge;
mod request;

pub use self::core::{SaveCoordinator, SaveStatus};
