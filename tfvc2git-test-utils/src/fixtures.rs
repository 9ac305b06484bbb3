//! An in-memory [`HistorySource`] and small builder helpers, so integration
//! tests can drive a migration end to end without a mock HTTP server.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tfvc2git_core::error::{MigrationError, MigrationResult};
use tfvc2git_core::history::{Change, ChangeTypeFlags, ChangesetMeta, HistorySource, Item, Label, MergeSource};

/// Build a plain-file [`Item`] at `path`, last changed at `changeset_version`.
pub fn item(path: &str, changeset_version: i64) -> Item {
  Item {
    path: path.to_string(),
    changeset_version,
    is_folder: false,
    is_branch: false,
    is_symbolic_link: false,
    size: 0,
    hash: None,
  }
}

/// Build a folder [`Item`] at `path`.
pub fn folder(path: &str, changeset_version: i64) -> Item {
  Item {
    is_folder: true,
    ..item(path, changeset_version)
  }
}

/// Build a [`Change`] with no source item and no merge sources.
pub fn change(item: Item, change_type: ChangeTypeFlags) -> Change {
  Change {
    item,
    change_type,
    source_server_item: None,
    merge_sources: Vec::new(),
  }
}

/// Build a rename [`Change`], carrying `from` as the source path.
pub fn rename(item: Item, from: &str) -> Change {
  Change {
    item,
    change_type: ChangeTypeFlags::RENAME,
    source_server_item: Some(from.to_string()),
    merge_sources: Vec::new(),
  }
}

/// Build a branch-or-merge [`Change`] carrying a single merge source.
pub fn branch_or_merge(item: Item, change_type: ChangeTypeFlags, source_path: &str, version_to: i64, is_rename: bool) -> Change {
  Change {
    item,
    change_type,
    source_server_item: None,
    merge_sources: vec![MergeSource {
      server_item: source_path.to_string(),
      version_to,
      is_rename,
    }],
  }
}

fn fixed_date(changeset_id: i64) -> DateTime<Utc> {
  Utc.timestamp_opt(1_700_000_000 + changeset_id * 3600, 0).single().expect("in range")
}

/// One recorded changeset: its metadata, its path changes, and the content
/// each changed, non-folder item holds as of this changeset.
pub struct FakeChangeset {
  pub meta: ChangesetMeta,
  pub changes: Vec<Change>,
  pub content: HashMap<String, Vec<u8>>,
}

/// An in-memory [`HistorySource`] fed a fixed list of [`FakeChangeset`]s,
/// for integration tests that exercise the full topology analyzer / mapping
/// state / commit planner pipeline without a network.
#[derive(Default)]
pub struct FakeHistorySource {
  changesets: Vec<FakeChangeset>,
  labels: Vec<(Label, i64)>,
}

impl FakeHistorySource {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a changeset whose author and committer are both `author`, with
  /// a generated comment and a deterministic, increasing timestamp.
  pub fn push(&mut self, changeset_id: i64, author: &str, changes: Vec<Change>, content: HashMap<String, Vec<u8>>) -> &mut Self {
    self.changesets.push(FakeChangeset {
      meta: ChangesetMeta {
        changeset_id,
        author: author.to_string(),
        checked_in_by: author.to_string(),
        created_date: fixed_date(changeset_id),
        comment: Some(format!("Changeset {changeset_id}")),
      },
      changes,
      content,
    });
    self
  }

  pub fn push_label(&mut self, name: &str, owner: &str, changeset: i64) -> &mut Self {
    self.labels.push((
      Label {
        name: name.to_string(),
        owner: owner.to_string(),
      },
      changeset,
    ));
    self
  }
}

#[async_trait]
impl HistorySource for FakeHistorySource {
  async fn list_changesets(&self, root_path: &str, min: Option<i64>, max: Option<i64>) -> MigrationResult<Vec<ChangesetMeta>> {
    let mut changesets: Vec<ChangesetMeta> = self
      .changesets
      .iter()
      .map(|c| &c.meta)
      .filter(|m| min.is_none_or(|min| m.changeset_id >= min))
      .filter(|m| max.is_none_or(|max| m.changeset_id <= max))
      .filter(|_| !root_path.is_empty())
      .cloned()
      .collect();
    changesets.sort_by_key(|c| c.changeset_id);
    Ok(changesets)
  }

  async fn list_changeset_changes(&self, changeset_id: i64) -> MigrationResult<Vec<Change>> {
    self
      .changesets
      .iter()
      .find(|c| c.meta.changeset_id == changeset_id)
      .map(|c| c.changes.clone())
      .ok_or_else(|| MigrationError::invariant(format!("no such changeset {changeset_id}")))
  }

  async fn list_items(&self, scope_paths: &[String], changeset: i64) -> MigrationResult<Vec<Item>> {
    let mut seen: HashMap<String, Item> = HashMap::new();
    for c in self.changesets.iter().filter(|c| c.meta.changeset_id <= changeset) {
      for change in &c.changes {
        if scope_paths.iter().any(|scope| change.item.path.starts_with(scope)) {
          seen.insert(change.item.path.clone(), change.item.clone());
        }
      }
    }
    Ok(seen.into_values().collect())
  }

  async fn fetch_content(&self, path: &str, changeset: i64) -> MigrationResult<Vec<u8>> {
    self
      .changesets
      .iter()
      .filter(|c| c.meta.changeset_id <= changeset)
      .rev()
      .find_map(|c| c.content.get(path))
      .cloned()
      .ok_or_else(|| MigrationError::invariant(format!("no content recorded for '{path}' as of changeset {changeset}")))
  }

  async fn list_labels(&self, _root_path: &str) -> MigrationResult<Vec<Label>> {
    Ok(self.labels.iter().map(|(label, _)| label.clone()).collect())
  }

  async fn label_items(&self, label: &Label) -> MigrationResult<i64> {
    self
      .labels
      .iter()
      .find(|(l, _)| l.name == label.name && l.owner == label.owner)
      .map(|(_, changeset)| *changeset)
      .ok_or_else(|| MigrationError::invariant(format!("no such label '{}'", label.name)))
  }
}
