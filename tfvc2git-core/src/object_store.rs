//! The Object Store interface (§6): the narrow surface this crate needs
//! from a Git repository. The concrete `git2`-backed implementation lives
//! in `tfvc2git-cli`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MigrationResult;

/// A single entry in a tree being built for a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
  /// Path relative to the tree root, using `/` separators.
  pub path: String,
  pub blob_id: BlobId,
  pub executable: bool,
}

/// Opaque handle to a stored blob's content-addressed id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobId(pub String);

/// Opaque handle to a stored commit's id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitId(pub String);

/// An author/committer identity attached to a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
  pub name: String,
  pub email: String,
  pub when: DateTime<Utc>,
}

/// The subset of Git operations the commit planner needs (§4.F, §6).
/// Implementations own the physical repository; every method is
/// content-addressed or ref-addressed, never path-addressed on disk.
#[async_trait]
pub trait ObjectStore: Send + Sync {
  /// Store `content` as a blob, returning its id. Storing the same bytes
  /// twice returns the same id.
  async fn write_blob(&self, content: &[u8]) -> MigrationResult<BlobId>;

  /// Build a tree from a flat, already-deduplicated list of entries.
  async fn write_tree(&self, entries: &[TreeEntry]) -> MigrationResult<String>;

  /// Create a commit pointing at `tree`, with `parents` as its parent
  /// commit ids in order (first parent is the branch's own history).
  async fn write_commit(
    &self,
    tree: &str,
    parents: &[CommitId],
    author: &Signature,
    committer: &Signature,
    message: &str,
  ) -> MigrationResult<CommitId>;

  /// Point `ref_name` at `commit`, creating or moving it.
  async fn update_ref(&self, ref_name: &str, commit: &CommitId) -> MigrationResult<()>;

  /// Remove `ref_name` entirely (used when a branch is deleted with no
  /// successor).
  async fn delete_ref(&self, ref_name: &str) -> MigrationResult<()>;

  /// The commit a ref currently points at, or `None` if it doesn't exist.
  async fn read_ref(&self, ref_name: &str) -> MigrationResult<Option<CommitId>>;

  /// Create a lightweight or annotated tag at `commit`, depending on
  /// `tagger`: `Some` produces an annotated tag.
  async fn create_tag(&self, name: &str, commit: &CommitId, tagger: Option<&Signature>, message: &str) -> MigrationResult<()>;
}
