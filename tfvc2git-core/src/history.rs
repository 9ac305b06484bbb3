//! The History Source interface (§6) and the plain data types it exchanges.
//!
//! This crate only defines the trait and the value types; the concrete
//! Azure DevOps TFVC REST client lives in `tfvc2git-cli` so that this crate
//! stays free of networking concerns and can be exercised with in-memory
//! fakes.

use async_trait::async_trait;
use bitflags::bitflags;
use chrono::{DateTime, Utc};

use crate::error::MigrationResult;

bitflags! {
  /// The TFVC change-type bitset carried on each path change (§4.D).
  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  pub struct ChangeTypeFlags: u32 {
    const ADD = 1 << 0;
    const EDIT = 1 << 1;
    const ENCODING = 1 << 2;
    const RENAME = 1 << 3;
    const DELETE = 1 << 4;
    const UNDELETE = 1 << 5;
    const BRANCH = 1 << 6;
    const MERGE = 1 << 7;
    const LOCK = 1 << 8;
    const ROLLBACK = 1 << 9;
    const SOURCE_RENAME = 1 << 10;
    const TARGET_RENAME = 1 << 11;
    const PROPERTY = 1 << 12;
  }
}

/// A single TFVC item as returned by `list_items` or embedded in a
/// [`Change`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
  pub path: String,
  pub changeset_version: i64,
  pub is_folder: bool,
  pub is_branch: bool,
  pub is_symbolic_link: bool,
  pub size: u64,
  /// Server-reported content hash (TFVC uses MD5); used only to decide
  /// whether an item's content needs a fresh download, never as the blob
  /// cache key (§4.F uses the downloaded bytes' own hash for that).
  pub hash: Option<String>,
}

/// An incoming merge or branch contribution recorded on a [`Change`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSource {
  pub server_item: String,
  pub version_to: i64,
  pub is_rename: bool,
}

/// A single path-level change within a changeset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
  pub item: Item,
  pub change_type: ChangeTypeFlags,
  pub source_server_item: Option<String>,
  pub merge_sources: Vec<MergeSource>,
}

/// Metadata about a changeset, independent of its path changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangesetMeta {
  pub changeset_id: i64,
  pub author: String,
  pub checked_in_by: String,
  pub created_date: DateTime<Utc>,
  pub comment: Option<String>,
}

/// A TFVC label: a named snapshot of a set of items at fixed versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
  pub name: String,
  pub owner: String,
}

/// The sole source of TFVC facts (§6). Implementations are expected to
/// retry their own transient I/O failures and only surface
/// [`crate::error::MigrationError::TransientIo`] once retries are
/// exhausted.
#[async_trait]
pub trait HistorySource: Send + Sync {
  /// List changesets under `root_path`, ascending, inclusive of `min`/`max`
  /// when given.
  async fn list_changesets(
    &self,
    root_path: &str,
    min: Option<i64>,
    max: Option<i64>,
  ) -> MigrationResult<Vec<ChangesetMeta>>;

  /// List the path-level changes recorded at `changeset_id`.
  async fn list_changeset_changes(&self, changeset_id: i64) -> MigrationResult<Vec<Change>>;

  /// Fully recursive item listing under the (pre-unioned, non-overlapping)
  /// `scope_paths`, as of `changeset`.
  async fn list_items(&self, scope_paths: &[String], changeset: i64) -> MigrationResult<Vec<Item>>;

  /// Fetch the raw bytes of `path` as of `changeset`.
  async fn fetch_content(&self, path: &str, changeset: i64) -> MigrationResult<Vec<u8>>;

  /// List labels recorded under `root_path`.
  async fn list_labels(&self, root_path: &str) -> MigrationResult<Vec<Label>>;

  /// The changeset a label's items were recorded against (the maximum item
  /// changeset within the label).
  async fn label_items(&self, label: &Label) -> MigrationResult<i64>;
}
