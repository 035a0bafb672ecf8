//! Deterministic, pure logic shared by the loop core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! records and return deterministic outputs suitable for tests.

pub mod estimator;
pub mod health;
pub mod selector;
pub mod state;
pub mod types;
