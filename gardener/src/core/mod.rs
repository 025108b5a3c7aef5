//! Deterministic, pure logic shared by the gardener core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod event;
pub mod iteration;
pub mod labels;
pub mod pr_info;
pub mod registry;
pub mod types;
