//! Branch-topology reconstruction and commit planning for a one-way
//! TFVC-to-Git migration.
//!
//! This crate has no knowledge of the concrete History Source or Object
//! Store: [`history::HistorySource`] and [`object_store::ObjectStore`] are
//! the seams the `tfvc2git-cli` binary implements against Azure DevOps and
//! `git2` respectively. Everything here is plain, synchronous logic plus
//! the small async orchestration ([`concurrency`], [`planner`]) needed to
//! drive those two traits efficiently.

pub mod authors;
pub mod branch;
pub mod concurrency;
pub mod content;
pub mod error;
pub mod history;
pub mod mapping;
pub mod mapping_state;
pub mod object_store;
pub mod path;
pub mod planner;
pub mod topo_sort;
pub mod topology;

pub use branch::{BranchIdentity, BranchRegistry};
pub use error::{MigrationError, MigrationResult};
pub use history::{Change, ChangeTypeFlags, ChangesetMeta, HistorySource, Item, Label, MergeSource};
pub use mapping::BranchMapping;
pub use mapping_state::{MappingState, MappingStateIterator};
pub use object_store::{BlobId, CommitId, ObjectStore, Signature, TreeEntry};
pub use planner::CommitPlanner;
pub use topology::{RootPathChange, TopologicalOperation, TopologyAnalyzer};
