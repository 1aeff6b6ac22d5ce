//! Shared test utilities for pooldex integration tests.
//!
//! This module provides:
//! - `MemStore`, `FakeRenderer` and `FakeRecognizer` for the trait seams
//! - `TestHarness` wiring them into a full coordinator over a temp store

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::{test_spec, TestHarness, INCOMING, PROCESSED};
