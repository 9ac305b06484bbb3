//! # tfvc2git CLI Library
//!
//! Binary-side modules for `tfvc2git`: the Azure DevOps TFVC History Source,
//! the `git2`-backed Object Store, and the command-line surface that wires
//! them into `tfvc2git-core`'s topology analyzer and commit planner.

pub mod authors;
pub mod cli;
pub mod git_store;
pub mod labels;
pub mod progress;
pub mod tfs_client;
