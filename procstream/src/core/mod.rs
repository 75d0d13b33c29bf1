//! Pure building blocks for stream pumping.
//!
//! Core modules do no process or thread management. They operate on readers
//! and in-memory state and are testable in isolation.

pub mod encoding;
pub mod framer;
pub mod gate;
pub mod guard;
pub mod types;
