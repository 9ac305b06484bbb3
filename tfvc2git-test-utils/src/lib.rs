//! Test utilities shared across the tfvc2git workspace
//!
//! This crate provides common testing infrastructure including:
//! - a temporary, real `git2` repository fixture ([`GitRepoTestGuard`])
//! - helpers for reading back commits/trees written by the object store
//!   adapter so integration tests can assert on them without reaching into
//!   `git2` directly.
//!
//! The clippy dead_code lint is disabled for this crate because test
//! utilities may not be used by all tests, and the compiler cannot detect
//! usage across crate boundaries in development dependencies.

#![allow(clippy::dead_code)]

pub mod fixtures;
pub mod git;

pub use fixtures::{FakeChangeset, FakeHistorySource};
pub use git::{GitRepoTestGuard, read_tree_paths};
