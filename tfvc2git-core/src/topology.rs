//! The topology analyzer (§4.D): turns one changeset's path changes into an
//! ordered stream of [`TopologicalOperation`]s.

use std::collections::HashSet;

use crate::branch::{BranchIdentity, BranchRegistry};
use crate::error::{ErrorContext, MigrationError, MigrationResult};
use crate::history::{Change, ChangeTypeFlags};
use crate::path;

/// A discrete, branch-graph-level event emitted by the analyzer (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologicalOperation {
  Branch {
    source_branch: BranchIdentity,
    source_branch_changeset: i64,
    source_branch_path: String,
    new_branch: BranchIdentity,
  },
  Merge {
    changeset: i64,
    source_branch: BranchIdentity,
    source_branch_changeset: i64,
    source_branch_path: String,
    target_branch: BranchIdentity,
    target_branch_path: String,
  },
  Rename {
    old_identity: BranchIdentity,
    new_identity: BranchIdentity,
  },
  Delete {
    changeset: i64,
    branch: BranchIdentity,
  },
}

/// A requested change of the migration root's TFVC path, taking effect at
/// `changeset` (§3). At most one per changeset; supplied up front by the
/// CLI's `--root-path-changes` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPathChange {
  pub changeset: i64,
  pub new_root_path: String,
}

fn lower(s: &str) -> String {
  s.to_ascii_lowercase()
}

/// Replays TFVC path changes forward, maintaining the live-branch registry
/// and emitting the topological operations implied by each changeset.
pub struct TopologyAnalyzer {
  registry: BranchRegistry,
  trunk: BranchIdentity,
  current_root: String,
  current_branch_paths: HashSet<String>,
  pending_root_changes: Vec<RootPathChange>,
}

impl TopologyAnalyzer {
  /// `first_changeset` is the changeset at which the migration root is
  /// first considered live (normally the minimum changeset in range).
  pub fn new(first_changeset: i64, root_path: String, mut root_path_changes: Vec<RootPathChange>) -> Self {
    root_path_changes.sort_by_key(|c| c.changeset);
    let root = BranchIdentity::new(first_changeset, root_path.clone());
    let mut current_branch_paths = HashSet::new();
    current_branch_paths.insert(lower(&root_path));
    Self {
      registry: BranchRegistry::new(root.clone()),
      trunk: root,
      current_root: root_path,
      current_branch_paths,
      pending_root_changes: root_path_changes,
    }
  }

  pub fn trunk(&self) -> &BranchIdentity {
    &self.trunk
  }

  /// Process the path changes recorded at `changeset`, emitting operations
  /// in the order specified by §4.D.
  pub fn process_changeset(&mut self, changeset: i64, changes: &[Change]) -> MigrationResult<Vec<TopologicalOperation>> {
    let ctx = || ErrorContext::for_changeset(changeset);
    let mut ops = Vec::new();

    self.apply_root_path_rewrite(changeset, &mut ops)?;
    self.apply_branch_renames(changeset, changes, &mut ops)?;

    self.registry.no_further_changes_up_to(changeset - 1);

    self.apply_branches_and_merges(changeset, changes, &mut ops).map_err(|e| e.with_context(ctx()))?;
    self.apply_deletes(changeset, changes, &mut ops)?;

    Ok(ops)
  }

  fn apply_root_path_rewrite(&mut self, changeset: i64, ops: &mut Vec<TopologicalOperation>) -> MigrationResult<()> {
    let Some(pending) = self.pending_root_changes.first() else {
      return Ok(());
    };
    if pending.changeset < changeset {
      return Err(MigrationError::configuration(format!(
        "root-path change scheduled for changeset {} was never applied before changeset {changeset} (root moved outside)",
        pending.changeset
      )));
    }
    if pending.changeset > changeset {
      return Ok(());
    }
    let pending = self.pending_root_changes.remove(0);
    let old_identity = self.registry.rename(changeset, &self.current_root, &pending.new_root_path)?;
    self.current_branch_paths.remove(&lower(&self.current_root));
    self.current_branch_paths.insert(lower(&pending.new_root_path));
    let new_identity = BranchIdentity::new(changeset, pending.new_root_path.clone());
    if self.trunk == old_identity {
      self.trunk = new_identity.clone();
    }
    self.current_root = pending.new_root_path;
    ops.push(TopologicalOperation::Rename { old_identity, new_identity });
    Ok(())
  }

  fn apply_branch_renames(
    &mut self,
    changeset: i64,
    changes: &[Change],
    ops: &mut Vec<TopologicalOperation>,
  ) -> MigrationResult<()> {
    for change in changes {
      if !change.change_type.contains(ChangeTypeFlags::RENAME) {
        continue;
      }
      let Some(source) = &change.source_server_item else { continue };
      if !self.current_branch_paths.contains(&lower(source)) {
        continue;
      }
      if change.change_type != ChangeTypeFlags::RENAME {
        return Err(MigrationError::poorly_understood(format!(
          "rename of live branch '{source}' carries additional flags: {:?}",
          change.change_type
        ))
        .with_context(ErrorContext::for_changeset(changeset).with_operation("branch rename")));
      }
      let old_identity = self.registry.rename(changeset, source, &change.item.path)?;
      self.current_branch_paths.remove(&lower(source));
      self.current_branch_paths.insert(lower(&change.item.path));
      let new_identity = BranchIdentity::new(changeset, change.item.path.clone());
      if self.trunk == old_identity {
        self.trunk = new_identity.clone();
      }
      ops.push(TopologicalOperation::Rename { old_identity, new_identity });
    }
    Ok(())
  }

  fn apply_branches_and_merges(
    &mut self,
    changeset: i64,
    changes: &[Change],
    ops: &mut Vec<TopologicalOperation>,
  ) -> MigrationResult<()> {
    struct BranchCandidate {
      source_branch: BranchIdentity,
      source_branch_changeset: i64,
      source_branch_path: String,
      new_branch_path: String,
    }
    struct MergeCandidate {
      source_branch: BranchIdentity,
      source_branch_changeset: i64,
      source_branch_path: String,
      target_branch: BranchIdentity,
      target_branch_path: String,
    }

    let mut branch_order: Vec<(String, String, String)> = Vec::new();
    let mut branch_candidates: Vec<((String, String, String), BranchCandidate)> = Vec::new();
    let mut merge_order: Vec<(String, String, String, String)> = Vec::new();
    let mut merge_candidates: Vec<((String, String, String, String), MergeCandidate)> = Vec::new();

    for change in changes {
      let non_rename_sources: Vec<&crate::history::MergeSource> =
        change.merge_sources.iter().filter(|m| !m.is_rename).collect();
      if non_rename_sources.len() != 1 {
        continue;
      }
      let merge_source = non_rename_sources[0];

      let source_branch = self.registry.find(merge_source.version_to - 1, &merge_source.server_item)?;
      let Some(source_branch) = source_branch else {
        if self.registry.find(changeset - 1, &change.item.path)?.is_none() {
          return Err(MigrationError::invariant(format!(
            "merge/branch source '{}' at version {} resolves to no known branch",
            merge_source.server_item, merge_source.version_to
          )));
        }
        continue;
      };
      let source_branch = source_branch.clone();

      let (source_branch_path, other_path) =
        path::strip_common_trailing_segments(&merge_source.server_item, &change.item.path);

      if change.change_type.contains(ChangeTypeFlags::MERGE) {
        let target_branch = self
          .registry
          .find(changeset - 1, &change.item.path)?
          .ok_or_else(|| MigrationError::invariant(format!("merge target '{}' has no live branch", change.item.path)))?
          .clone();
        let key = (
          format!("{}@{}", lower(&source_branch.path), source_branch.creation_changeset),
          lower(&source_branch_path),
          format!("{}@{}", lower(&target_branch.path), target_branch.creation_changeset),
          lower(&other_path),
        );
        match merge_candidates.iter_mut().find(|(k, _)| *k == key) {
          Some((_, existing)) if merge_source.version_to > existing.source_branch_changeset => {
            existing.source_branch_changeset = merge_source.version_to;
          }
          Some(_) => {}
          None => {
            merge_order.push(key.clone());
            merge_candidates.push((key, MergeCandidate {
              source_branch,
              source_branch_changeset: merge_source.version_to,
              source_branch_path,
              target_branch,
              target_branch_path: other_path,
            }));
          }
        }
      } else {
        let key = (
          format!("{}@{}", lower(&source_branch.path), source_branch.creation_changeset),
          lower(&source_branch_path),
          lower(&other_path),
        );
        match branch_candidates.iter_mut().find(|(k, _)| *k == key) {
          Some((_, existing)) if merge_source.version_to > existing.source_branch_changeset => {
            existing.source_branch_changeset = merge_source.version_to;
          }
          Some(_) => {}
          None => {
            branch_order.push(key.clone());
            branch_candidates.push((key, BranchCandidate {
              source_branch,
              source_branch_changeset: merge_source.version_to,
              source_branch_path,
              new_branch_path: other_path,
            }));
          }
        }
      }
    }

    // Apply branch creations to the registry/path set before deduping merges,
    // so a merge into a branch created this same changeset resolves.
    for key in &branch_order {
      let (_, candidate) = branch_candidates.iter().find(|(k, _)| k == key).expect("just inserted");
      let new_branch = BranchIdentity::new(changeset, candidate.new_branch_path.clone());
      self.registry.add(new_branch.clone())?;
      self.current_branch_paths.insert(lower(&candidate.new_branch_path));
      ops.push(TopologicalOperation::Branch {
        source_branch: candidate.source_branch.clone(),
        source_branch_changeset: candidate.source_branch_changeset,
        source_branch_path: candidate.source_branch_path.clone(),
        new_branch,
      });
    }

    // Dedupe merges sharing (source_branch, target_branch): drop any whose
    // sub-paths are both strictly contained by another merge's in the group.
    let is_subsumed = |i: usize| {
      let (key_i, cand_i) = &merge_candidates[i];
      merge_candidates.iter().enumerate().any(|(j, (key_j, cand_j))| {
        i != j
          && key_i.0 == key_j.0
          && key_i.2 == key_j.2
          && path::contains(&cand_j.source_branch_path, &cand_i.source_branch_path)
          && path::contains(&cand_j.target_branch_path, &cand_i.target_branch_path)
      })
    };
    for (idx, key) in merge_order.iter().enumerate() {
      if is_subsumed(idx) {
        continue;
      }
      let (_, candidate) = merge_candidates.iter().find(|(k, _)| k == key).expect("just inserted");
      ops.push(TopologicalOperation::Merge {
        changeset,
        source_branch: candidate.source_branch.clone(),
        source_branch_changeset: candidate.source_branch_changeset,
        source_branch_path: candidate.source_branch_path.clone(),
        target_branch: candidate.target_branch.clone(),
        target_branch_path: candidate.target_branch_path.clone(),
      });
    }

    Ok(())
  }

  fn apply_deletes(&mut self, changeset: i64, changes: &[Change], ops: &mut Vec<TopologicalOperation>) -> MigrationResult<()> {
    for change in changes {
      if !change.change_type.contains(ChangeTypeFlags::DELETE) {
        continue;
      }
      if !self.current_branch_paths.contains(&lower(&change.item.path)) {
        continue;
      }
      if change.change_type != ChangeTypeFlags::DELETE {
        return Err(MigrationError::poorly_understood(format!(
          "delete of live branch '{}' carries additional flags: {:?}",
          change.item.path, change.change_type
        ))
        .with_context(ErrorContext::for_changeset(changeset).with_operation("branch delete")));
      }
      let branch = self.registry.delete(changeset, &change.item.path)?;
      self.current_branch_paths.remove(&lower(&change.item.path));
      ops.push(TopologicalOperation::Delete { changeset, branch });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::history::{Item, MergeSource};

  fn item(path: &str, size: u64) -> Item {
    Item {
      path: path.to_string(),
      changeset_version: 1,
      is_folder: false,
      is_branch: false,
      is_symbolic_link: false,
      size,
      hash: None,
    }
  }

  fn branch_marker(path: &str) -> Item {
    Item {
      is_folder: true,
      is_branch: true,
      ..item(path, 0)
    }
  }

  fn branch_change(new_path: &str, source_path: &str, version_to: i64) -> Change {
    Change {
      item: branch_marker(new_path),
      change_type: ChangeTypeFlags::BRANCH | ChangeTypeFlags::ADD,
      source_server_item: Some(source_path.to_string()),
      merge_sources: vec![MergeSource {
        server_item: source_path.to_string(),
        version_to,
        is_rename: false,
      }],
    }
  }

  fn merge_change(target_path: &str, source_path: &str, version_to: i64) -> Change {
    Change {
      item: item(target_path, 0),
      change_type: ChangeTypeFlags::MERGE | ChangeTypeFlags::EDIT,
      source_server_item: None,
      merge_sources: vec![MergeSource {
        server_item: source_path.to_string(),
        version_to,
        is_rename: false,
      }],
    }
  }

  fn delete_change(path: &str) -> Change {
    Change {
      item: branch_marker(path),
      change_type: ChangeTypeFlags::DELETE,
      source_server_item: None,
      merge_sources: vec![],
    }
  }

  fn rename_change(new_path: &str, old_path: &str) -> Change {
    Change {
      item: item(new_path, 0),
      change_type: ChangeTypeFlags::RENAME,
      source_server_item: Some(old_path.to_string()),
      merge_sources: vec![],
    }
  }

  #[test]
  fn branch_from_root_emits_branch_op() {
    let mut analyzer = TopologyAnalyzer::new(1, "$/P".to_string(), vec![]);
    let ops = analyzer.process_changeset(2, &[branch_change("$/P/B", "$/P", 1)]).unwrap();
    assert_eq!(ops, vec![TopologicalOperation::Branch {
      source_branch: BranchIdentity::new(1, "$/P"),
      source_branch_changeset: 1,
      source_branch_path: "$/P".to_string(),
      new_branch: BranchIdentity::new(2, "$/P/B"),
    }]);
  }

  #[test]
  fn merge_emits_merge_op_with_both_parents() {
    let mut analyzer = TopologyAnalyzer::new(1, "$/P".to_string(), vec![]);
    analyzer.process_changeset(2, &[branch_change("$/P/B", "$/P", 1)]).unwrap();
    analyzer.process_changeset(3, &[]).unwrap();
    let ops = analyzer.process_changeset(4, &[merge_change("$/P", "$/P/B", 3)]).unwrap();
    assert_eq!(ops, vec![TopologicalOperation::Merge {
      changeset: 4,
      source_branch: BranchIdentity::new(2, "$/P/B"),
      source_branch_changeset: 3,
      source_branch_path: "$/P/B".to_string(),
      target_branch: BranchIdentity::new(1, "$/P"),
      target_branch_path: "$/P".to_string(),
    }]);
  }

  #[test]
  fn delete_of_live_branch_emits_delete_op() {
    let mut analyzer = TopologyAnalyzer::new(1, "$/P".to_string(), vec![]);
    analyzer.process_changeset(2, &[branch_change("$/P/B", "$/P", 1)]).unwrap();
    let ops = analyzer.process_changeset(3, &[delete_change("$/P/B")]).unwrap();
    assert_eq!(ops, vec![TopologicalOperation::Delete {
      changeset: 3,
      branch: BranchIdentity::new(2, "$/P/B"),
    }]);
  }

  #[test]
  fn rename_of_trunk_updates_trunk_identity() {
    let mut analyzer = TopologyAnalyzer::new(1, "$/P".to_string(), vec![]);
    let ops = analyzer.process_changeset(2, &[rename_change("$/Q", "$/P")]).unwrap();
    assert_eq!(ops, vec![TopologicalOperation::Rename {
      old_identity: BranchIdentity::new(1, "$/P"),
      new_identity: BranchIdentity::new(2, "$/Q"),
    }]);
    assert_eq!(analyzer.trunk(), &BranchIdentity::new(2, "$/Q"));
  }

  #[test]
  fn configured_root_path_change_is_applied_at_its_changeset() {
    let mut analyzer = TopologyAnalyzer::new(
      1,
      "$/P".to_string(),
      vec![RootPathChange { changeset: 2, new_root_path: "$/Q".to_string() }],
    );
    let ops = analyzer.process_changeset(2, &[]).unwrap();
    assert_eq!(ops, vec![TopologicalOperation::Rename {
      old_identity: BranchIdentity::new(1, "$/P"),
      new_identity: BranchIdentity::new(2, "$/Q"),
    }]);
  }

  #[test]
  fn rename_with_extra_flags_is_poorly_understood() {
    let mut analyzer = TopologyAnalyzer::new(1, "$/P".to_string(), vec![]);
    analyzer.process_changeset(2, &[branch_change("$/P/B", "$/P", 1)]).unwrap();
    let mut change = rename_change("$/P/B2", "$/P/B");
    change.change_type |= ChangeTypeFlags::EDIT;
    let err = analyzer.process_changeset(3, &[change]).unwrap_err();
    assert!(matches!(err, MigrationError::PoorlyUnderstoodCombination { .. }));
  }

  #[test]
  fn determinism_same_input_same_output() {
    let changes = vec![branch_change("$/P/B", "$/P", 1)];
    let mut a = TopologyAnalyzer::new(1, "$/P".to_string(), vec![]);
    let mut b = TopologyAnalyzer::new(1, "$/P".to_string(), vec![]);
    assert_eq!(a.process_changeset(2, &changes).unwrap(), b.process_changeset(2, &changes).unwrap());
  }

  #[test]
  fn outer_merge_subsumes_inner_merge_in_same_group() {
    let mut analyzer = TopologyAnalyzer::new(1, "$/P".to_string(), vec![]);
    analyzer.process_changeset(2, &[branch_change("$/P/B", "$/P", 1)]).unwrap();
    analyzer.process_changeset(3, &[]).unwrap();
    let ops = analyzer
      .process_changeset(4, &[merge_change("$/P/Sub", "$/P/B/Sub", 3), merge_change("$/P", "$/P/B", 3)])
      .unwrap();
    assert_eq!(ops.len(), 1);
    assert!(matches!(&ops[0], TopologicalOperation::Merge { target_branch, .. } if *target_branch == BranchIdentity::new(1, "$/P")));
  }
}
