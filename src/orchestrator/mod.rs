//! Rebuild orchestration modules.
//!
//! Covers site server supervision, external command execution, and the
//! five-step rebuild workflow.

pub mod command;
pub mod rebuild;
pub mod supervisor;
