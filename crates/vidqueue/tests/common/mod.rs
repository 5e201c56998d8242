//! Shared test utilities for vidqueue integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated queues backed by a temp directory
//! - Scripted producer and config builders

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{wait_until, TestHarness};
