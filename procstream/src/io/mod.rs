//! Process, thread and pipe handling around the pure core.

pub mod child;
pub mod config;
pub mod exit;
pub mod host;
pub mod process;
pub mod pump;
pub mod reader;
