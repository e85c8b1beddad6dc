//! Mock filesystem implementations for testing.
//!
//! This module provides `MockFs`, fixture builders and pre-built scenarios
//! for testing collectors without requiring actual Linux `/proc` and `/sys`.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
pub use scenarios::{ProcFixture, WORKER_CMDLINE};
