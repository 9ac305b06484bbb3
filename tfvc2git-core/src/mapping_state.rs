//! The mapping-state iterator (§4.E): folds each changeset's topological
//! operations into the live branch-mapping snapshot the commit planner
//! needs to route item changes and order per-branch commits.

use std::collections::{HashMap, HashSet};

use crate::branch::BranchIdentity;
use crate::error::{MigrationError, MigrationResult};
use crate::mapping::BranchMapping;
use crate::path;
use crate::topo_sort::topological_sort;
use crate::topology::TopologicalOperation;

/// The live-branch mapping snapshot after folding in one changeset's
/// topological operations.
#[derive(Debug, Clone)]
pub struct MappingState {
  pub changeset: i64,
  pub trunk: BranchIdentity,
  /// Every currently-live branch's projection, keyed by identity.
  pub live_mappings: HashMap<BranchIdentity, BranchMapping>,
  /// Brand-new identities created by a *Branch* op this changeset, mapped
  /// to `(source_branch, source_branch_changeset)`. Disjoint from
  /// `renamed_from`: a branch-from relationship starts a new line of
  /// history, it does not continue the source's. The changeset is the
  /// exact historical version the branch was cut from, which the commit
  /// planner must resolve against its per-changeset commit index rather
  /// than the source's current tip (the source may have advanced further
  /// by the time this changeset is replayed).
  pub created_from: HashMap<BranchIdentity, (BranchIdentity, i64)>,
  /// Identities installed by a *Rename* op this changeset, mapped to the
  /// identity they replace. The new identity continues the old one's
  /// history and ref name.
  pub renamed_from: HashMap<BranchIdentity, BranchIdentity>,
  /// Additional (non-primary) parent edges contributed by merges landing
  /// this changeset, keyed by the merge's target branch, each paired with
  /// the exact source changeset merged from (see `created_from`).
  pub merge_parents: HashMap<BranchIdentity, Vec<(BranchIdentity, i64)>>,
  /// Branches retired this changeset.
  pub deleted: Vec<BranchIdentity>,
}

impl MappingState {
  /// Order `touched` (branches needing a new commit this changeset, from
  /// topological operations and/or plain item edits) so that a branch
  /// merging from another touched branch this changeset is committed after
  /// it. Branches with no in-changeset dependency keep their input order.
  pub fn order_branches(&self, touched: Vec<BranchIdentity>) -> MigrationResult<Vec<BranchIdentity>> {
    let touched_set: HashSet<BranchIdentity> = touched.iter().cloned().collect();
    let merge_parents = &self.merge_parents;
    topological_sort(
      touched,
      |b: &BranchIdentity| b.clone(),
      |b: &BranchIdentity| {
        merge_parents
          .get(b)
          .map(|parents| {
            parents
              .iter()
              .map(|(source, _changeset)| source)
              .filter(|p| touched_set.contains(p))
              .cloned()
              .collect()
          })
          .unwrap_or_default()
      },
    )
    .map_err(|e| MigrationError::invariant(format!("could not order this changeset's branch commits: {e}")))
  }
}

/// Maintains the running live-branch map across changesets and produces a
/// [`MappingState`] snapshot for each one.
pub struct MappingStateIterator {
  live: HashMap<BranchIdentity, BranchMapping>,
  trunk: BranchIdentity,
}

impl MappingStateIterator {
  pub fn new(trunk: BranchIdentity) -> Self {
    let mut live = HashMap::new();
    live.insert(trunk.clone(), BranchMapping::at_root(trunk.path.clone()));
    Self { live, trunk }
  }

  /// Fold `ops` (the result of [`crate::topology::TopologyAnalyzer::process_changeset`])
  /// into the running map and return the resulting snapshot.
  pub fn apply(&mut self, changeset: i64, ops: &[TopologicalOperation]) -> MigrationResult<MappingState> {
    let mut created_from = HashMap::new();
    let mut renamed_from = HashMap::new();
    let mut merge_parents: HashMap<BranchIdentity, Vec<(BranchIdentity, i64)>> = HashMap::new();
    let mut deleted = Vec::new();

    for op in ops {
      match op {
        TopologicalOperation::Branch {
          source_branch,
          source_branch_changeset,
          source_branch_path,
          new_branch,
        } => {
          let source_mapping = self.live.get(source_branch).ok_or_else(|| {
            MigrationError::invariant(format!("branch source '{source_branch}' has no live mapping"))
          })?;
          let new_mapping = if path::is_or_contains(&source_mapping.root_directory, source_branch_path) {
            BranchMapping::at_root(source_branch_path.clone()).rename_root(source_branch_path, &new_branch.path)?
          } else {
            // The branch was cut from a subdirectory of the source's *view*
            // rather than a literal subdirectory of its TFVC root (a mirror
            // reference, §4.E/§9): alias the branch's own physical path onto
            // that view, hiding the source's own copy of it so it isn't
            // double-counted.
            BranchMapping::at_root(source_branch_path.clone()).with_subdir_mapping(new_branch.path.clone(), source_branch_path.clone())
          };
          self.live.insert(new_branch.clone(), new_mapping);
          created_from.insert(new_branch.clone(), (source_branch.clone(), *source_branch_changeset));
        }
        TopologicalOperation::Merge {
          source_branch,
          source_branch_changeset,
          target_branch,
          ..
        } => {
          merge_parents
            .entry(target_branch.clone())
            .or_default()
            .push((source_branch.clone(), *source_branch_changeset));
        }
        TopologicalOperation::Rename { old_identity, new_identity } => {
          let mapping = match self.live.remove(old_identity) {
            Some(mapping) => mapping.rename_root(&old_identity.path, &new_identity.path)?,
            None => BranchMapping::at_root(new_identity.path.clone()),
          };
          self.live.insert(new_identity.clone(), mapping);
          renamed_from.insert(new_identity.clone(), old_identity.clone());
          if self.trunk == *old_identity {
            self.trunk = new_identity.clone();
          }
        }
        TopologicalOperation::Delete { branch, .. } => {
          self.live.remove(branch);
          deleted.push(branch.clone());
        }
      }
    }

    Ok(MappingState {
      changeset,
      trunk: self.trunk.clone(),
      live_mappings: self.live.clone(),
      created_from,
      renamed_from,
      merge_parents,
      deleted,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn id(cs: i64, path: &str) -> BranchIdentity {
    BranchIdentity::new(cs, path)
  }

  #[test]
  fn branch_op_installs_a_fresh_mapping() {
    let mut iter = MappingStateIterator::new(id(1, "$/P"));
    let state = iter
      .apply(2, &[TopologicalOperation::Branch {
        source_branch: id(1, "$/P"),
        source_branch_changeset: 1,
        source_branch_path: "$/P".to_string(),
        new_branch: id(2, "$/P/B"),
      }])
      .unwrap();
    assert!(state.live_mappings.contains_key(&id(2, "$/P/B")));
    assert_eq!(state.created_from.get(&id(2, "$/P/B")), Some(&(id(1, "$/P"), 1)));
    assert_eq!(state.live_mappings[&id(2, "$/P/B")].git_path("$/P/B/a.rs"), Some("a.rs".to_string()));
  }

  #[test]
  fn branch_op_into_a_mirrored_view_installs_a_subdir_remap() {
    let mut iter = MappingStateIterator::new(id(1, "$/P"));
    let state = iter
      .apply(2, &[TopologicalOperation::Branch {
        source_branch: id(1, "$/P"),
        source_branch_changeset: 1,
        source_branch_path: "$/Other/View".to_string(),
        new_branch: id(2, "$/P/B"),
      }])
      .unwrap();
    let mapping = &state.live_mappings[&id(2, "$/P/B")];
    assert_eq!(mapping.git_path("$/P/B/a.rs"), Some("a.rs".to_string()));
    assert_eq!(mapping.git_path("$/Other/View/a.rs"), None, "the source's own copy must not also appear");
  }

  #[test]
  fn rename_op_rebases_the_mapping() {
    let mut iter = MappingStateIterator::new(id(1, "$/P"));
    let state = iter
      .apply(2, &[TopologicalOperation::Rename {
        old_identity: id(1, "$/P"),
        new_identity: id(2, "$/Q"),
      }])
      .unwrap();
    assert_eq!(state.trunk, id(2, "$/Q"));
    assert!(!state.live_mappings.contains_key(&id(1, "$/P")));
    assert_eq!(state.live_mappings[&id(2, "$/Q")].git_path("$/Q/a.rs"), Some("a.rs".to_string()));
    assert_eq!(state.renamed_from.get(&id(2, "$/Q")), Some(&id(1, "$/P")));
    assert!(state.created_from.is_empty(), "a rename must not also register as a branch-from");
  }

  #[test]
  fn delete_op_removes_from_live_map() {
    let mut iter = MappingStateIterator::new(id(1, "$/P"));
    iter
      .apply(2, &[TopologicalOperation::Branch {
        source_branch: id(1, "$/P"),
        source_branch_changeset: 1,
        source_branch_path: "$/P".to_string(),
        new_branch: id(2, "$/P/B"),
      }])
      .unwrap();
    let state = iter
      .apply(3, &[TopologicalOperation::Delete { changeset: 3, branch: id(2, "$/P/B") }])
      .unwrap();
    assert!(!state.live_mappings.contains_key(&id(2, "$/P/B")));
    assert_eq!(state.deleted, vec![id(2, "$/P/B")]);
  }

  #[test]
  fn order_branches_puts_merge_source_before_target() {
    let mut iter = MappingStateIterator::new(id(1, "$/P"));
    let state = iter
      .apply(2, &[TopologicalOperation::Merge {
        changeset: 2,
        source_branch: id(2, "$/P/B"),
        source_branch_changeset: 1,
        source_branch_path: "$/P/B".to_string(),
        target_branch: id(1, "$/P"),
        target_branch_path: "$/P".to_string(),
      }])
      .unwrap();
    let ordered = state.order_branches(vec![id(1, "$/P"), id(2, "$/P/B")]).unwrap();
    assert_eq!(ordered, vec![id(2, "$/P/B"), id(1, "$/P")]);
  }
}
