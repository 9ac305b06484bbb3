//! Branch identity and the live-branch registry (§3, §4.B).

use crate::error::RegistryError;
use crate::path;

/// An immutable value identifying a TFVC branch for the purposes of this
/// tool: the changeset it was created at, and its path at that time.
/// `path` must be absolute (`$/...`) and carries no trailing slash.
///
/// Equality compares `creation_changeset` exactly and `path`
/// case-insensitively, matching TFVC's own path semantics.
#[derive(Debug, Clone)]
pub struct BranchIdentity {
  pub creation_changeset: i64,
  pub path: String,
}

impl BranchIdentity {
  pub fn new(creation_changeset: i64, path: impl Into<String>) -> Self {
    let path = path.into();
    debug_assert!(path::is_absolute(&path), "branch path must be absolute: {path}");
    Self { creation_changeset, path }
  }
}

impl PartialEq for BranchIdentity {
  fn eq(&self, other: &Self) -> bool {
    self.creation_changeset == other.creation_changeset && self.path.eq_ignore_ascii_case(&other.path)
  }
}

impl Eq for BranchIdentity {}

impl std::hash::Hash for BranchIdentity {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.creation_changeset.hash(state);
    self.path.to_ascii_lowercase().hash(state);
  }
}

impl std::fmt::Display for BranchIdentity {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}@{}", self.path, self.creation_changeset)
  }
}

struct Entry {
  identity: BranchIdentity,
  deleted_at: Option<i64>,
}

/// The live-branch registry of §4.B: an ordered set of branch identities,
/// kept in descending path specificity, that can answer "which branch
/// contains this path at changeset N" queries as the topology analyzer
/// replays history forward.
pub struct BranchRegistry {
  entries: Vec<Entry>,
  max_known_changeset: i64,
}

impl BranchRegistry {
  /// Create a registry whose first live branch is `root`, known valid as of
  /// `root.creation_changeset - 1` (nothing has happened yet).
  pub fn new(root: BranchIdentity) -> Self {
    let max_known_changeset = root.creation_changeset - 1;
    Self {
      entries: vec![Entry {
        identity: root,
        deleted_at: None,
      }],
      max_known_changeset,
    }
  }

  pub fn max_known_changeset(&self) -> i64 {
    self.max_known_changeset
  }

  fn require_advance(&self, changeset: i64) -> Result<(), RegistryError> {
    if changeset <= self.max_known_changeset {
      return Err(RegistryError::OutOfOrder {
        changeset,
        max_known: self.max_known_changeset,
      });
    }
    Ok(())
  }

  /// Insert `identity` in descending-specificity order (longer paths first;
  /// ties broken by insertion order, which is stable since we only ever
  /// append within a tie group).
  fn insert_ordered(&mut self, identity: BranchIdentity) {
    let pos = self
      .entries
      .iter()
      .position(|e| e.identity.path.len() < identity.path.len())
      .unwrap_or(self.entries.len());
    self.entries.insert(pos, Entry {
      identity,
      deleted_at: None,
    });
  }

  /// Add a newly created branch, live as of `new.creation_changeset`.
  pub fn add(&mut self, new: BranchIdentity) -> Result<(), RegistryError> {
    self.require_advance(new.creation_changeset)?;
    if self.find_live_index(&new.path).is_some() {
      return Err(RegistryError::Duplicate { path: new.path });
    }
    let changeset = new.creation_changeset;
    self.insert_ordered(new);
    self.max_known_changeset = changeset - 1;
    Ok(())
  }

  fn find_live_index(&self, path: &str) -> Option<usize> {
    self
      .entries
      .iter()
      .position(|e| e.deleted_at.is_none() && e.identity.path.eq_ignore_ascii_case(path))
  }

  /// Mark the live branch at `path` deleted as of `at`.
  pub fn delete(&mut self, at: i64, path: &str) -> Result<BranchIdentity, RegistryError> {
    self.require_advance(at)?;
    let idx = self
      .find_live_index(path)
      .ok_or_else(|| RegistryError::NotFound { path: path.to_string() })?;
    self.entries[idx].deleted_at = Some(at);
    self.max_known_changeset = at - 1;
    Ok(self.entries[idx].identity.clone())
  }

  /// Retire the live branch at `old_path` and insert a new identity
  /// `(at, new_path)` in its place. Returns the retired identity.
  pub fn rename(&mut self, at: i64, old_path: &str, new_path: &str) -> Result<BranchIdentity, RegistryError> {
    self.require_advance(at)?;
    let idx = self
      .find_live_index(old_path)
      .ok_or_else(|| RegistryError::NotFound {
        path: old_path.to_string(),
      })?;
    let old_identity = self.entries.remove(idx).identity;
    self.insert_ordered(BranchIdentity::new(at, new_path));
    self.max_known_changeset = at - 1;
    Ok(old_identity)
  }

  /// Seal the registry so that no further operation may reference a
  /// changeset `<= at`. A no-op on the bookkeeping besides asserting the
  /// registry had already advanced at least this far.
  pub fn no_further_changes_up_to(&mut self, at: i64) {
    self.max_known_changeset = self.max_known_changeset.max(at);
  }

  /// The most specific live branch containing `item_path` at changeset
  /// `at`, or `None` if no live branch does. Fails if `at` is past what the
  /// registry has seen.
  pub fn find(&self, at: i64, item_path: &str) -> Result<Option<&BranchIdentity>, RegistryError> {
    if at > self.max_known_changeset {
      return Err(RegistryError::UnknownChangeset {
        queried: at,
        max_known: self.max_known_changeset,
      });
    }
    Ok(self.entries.iter().find_map(|e| {
      let alive = e.deleted_at.is_none_or(|deleted_at| deleted_at > at);
      if alive && path::is_or_contains(&e.identity.path, item_path) {
        Some(&e.identity)
      } else {
        None
      }
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn id(cs: i64, path: &str) -> BranchIdentity {
    BranchIdentity::new(cs, path)
  }

  #[test]
  fn find_returns_most_specific_live_branch() {
    let mut reg = BranchRegistry::new(id(1, "$/P"));
    reg.add(id(2, "$/P/Sub")).unwrap();
    reg.no_further_changes_up_to(2);

    assert_eq!(reg.find(2, "$/P/Sub/file.txt").unwrap(), Some(&id(2, "$/P/Sub")));
    assert_eq!(reg.find(2, "$/P/other.txt").unwrap(), Some(&id(1, "$/P")));
  }

  #[test]
  fn add_duplicate_live_path_fails() {
    let mut reg = BranchRegistry::new(id(1, "$/P"));
    reg.add(id(2, "$/P/Sub")).unwrap();
    let err = reg.add(id(3, "$/P/Sub")).unwrap_err();
    assert_eq!(err, RegistryError::Duplicate { path: "$/P/Sub".into() });
  }

  #[test]
  fn delete_marks_but_does_not_remove() {
    let mut reg = BranchRegistry::new(id(1, "$/P"));
    reg.add(id(2, "$/P/Sub")).unwrap();
    reg.delete(3, "$/P/Sub").unwrap();
    reg.no_further_changes_up_to(3);

    // Still resolvable before the delete changeset.
    assert_eq!(reg.find(2, "$/P/Sub/f.txt").unwrap(), Some(&id(2, "$/P/Sub")));
    // No longer resolvable at/after the delete.
    assert_eq!(reg.find(3, "$/P/Sub/f.txt").unwrap(), Some(&id(1, "$/P")));
  }

  #[test]
  fn rename_retires_old_identity_and_installs_new_one() {
    let mut reg = BranchRegistry::new(id(1, "$/P"));
    let old = reg.rename(2, "$/P", "$/Q").unwrap();
    assert_eq!(old, id(1, "$/P"));
    reg.no_further_changes_up_to(2);

    assert_eq!(reg.find(2, "$/Q/a.txt").unwrap(), Some(&id(2, "$/Q")));
    assert!(reg.find(2, "$/P/a.txt").unwrap().is_none());
  }

  #[test]
  fn out_of_order_changeset_fails() {
    let mut reg = BranchRegistry::new(id(1, "$/P"));
    reg.add(id(5, "$/P/Sub")).unwrap();
    let err = reg.add(id(3, "$/P/Other")).unwrap_err();
    assert_eq!(err, RegistryError::OutOfOrder { changeset: 3, max_known: 4 });
  }

  #[test]
  fn find_past_known_changeset_fails() {
    let reg = BranchRegistry::new(id(1, "$/P"));
    let err = reg.find(10, "$/P/a.txt").unwrap_err();
    assert_eq!(err, RegistryError::UnknownChangeset { queried: 10, max_known: 0 });
  }

  #[test]
  fn delete_of_unknown_path_fails() {
    let mut reg = BranchRegistry::new(id(1, "$/P"));
    let err = reg.delete(2, "$/P/Missing").unwrap_err();
    assert_eq!(err, RegistryError::NotFound { path: "$/P/Missing".into() });
  }
}
