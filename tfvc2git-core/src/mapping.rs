//! Per-branch mapping view: projects TFVC item paths into Git repository
//! paths for a single branch (§3, §4.C).

use crate::error::MigrationError;
use crate::path;

/// A subdirectory remap created when a branch was branched into a
/// subdirectory of another branch's *view* rather than from a proper
/// subdirectory of the source branch's root (§4.E, mirror-reference case).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdirMapping {
  pub branch_dir: String,
  pub target_dir: String,
}

/// A branch's projection of the flat TFVC namespace into its own Git tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchMapping {
  pub root_directory: String,
  pub subdir_mapping: Option<SubdirMapping>,
}

impl BranchMapping {
  /// A mapping rooted directly at `root_directory` with no subdirectory
  /// remap.
  pub fn at_root(root_directory: impl Into<String>) -> Self {
    Self {
      root_directory: root_directory.into(),
      subdir_mapping: None,
    }
  }

  /// Replace the root with `new_root`, rewriting it via
  /// [`path::replace_containing`]. Fails with `NotImplemented` if a subdir
  /// mapping is already set — the interaction between rename and subdir
  /// remap has not been validated (§9 open question).
  pub fn rename_root(&self, old_root: &str, new_root: &str) -> Result<Self, MigrationError> {
    if self.subdir_mapping.is_some() {
      return Err(MigrationError::not_implemented(format!(
        "renaming the root of a mapping that carries a subdirectory remap ('{old_root}' -> '{new_root}')"
      )));
    }
    Ok(Self {
      root_directory: path::replace_containing(&self.root_directory, old_root, new_root),
      subdir_mapping: None,
    })
  }

  /// Return a copy of this mapping with a subdirectory remap installed:
  /// items under `target_dir` are hidden, items under `branch_dir` are
  /// rewritten to appear under `target_dir`.
  pub fn with_subdir_mapping(&self, branch_dir: impl Into<String>, target_dir: impl Into<String>) -> Self {
    Self {
      root_directory: self.root_directory.clone(),
      subdir_mapping: Some(SubdirMapping {
        branch_dir: branch_dir.into(),
        target_dir: target_dir.into(),
      }),
    }
  }

  /// Project a TFVC item path into this branch's Git path, or `None` if the
  /// item is outside this branch's view (§3).
  pub fn git_path(&self, item_path: &str) -> Option<String> {
    if let Some(remap) = &self.subdir_mapping {
      if path::is_or_contains(&remap.target_dir, item_path) {
        return None;
      }
      if path::is_or_contains(&remap.branch_dir, item_path) {
        let rewritten = path::replace_containing(item_path, &remap.branch_dir, &remap.target_dir);
        return self.strip_root(&rewritten);
      }
    }
    self.strip_root(item_path)
  }

  fn strip_root(&self, item_path: &str) -> Option<String> {
    if path::is_or_contains(&self.root_directory, item_path) {
      Some(path::remove_containing(item_path, &self.root_directory).to_string())
    } else {
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plain_root_strips_prefix() {
    let mapping = BranchMapping::at_root("$/P");
    assert_eq!(mapping.git_path("$/P/src/a.rs"), Some("src/a.rs".to_string()));
    assert_eq!(mapping.git_path("$/P"), Some(String::new()));
    assert_eq!(mapping.git_path("$/Other/a.rs"), None);
  }

  #[test]
  fn rename_root_rewrites_prefix() {
    let mapping = BranchMapping::at_root("$/P");
    let renamed = mapping.rename_root("$/P", "$/Q").unwrap();
    assert_eq!(renamed.git_path("$/Q/a.rs"), Some("a.rs".to_string()));
    assert_eq!(renamed.git_path("$/P/a.rs"), None);
  }

  #[test]
  fn rename_root_with_subdir_mapping_is_not_implemented() {
    let mapping = BranchMapping::at_root("$/P").with_subdir_mapping("$/P/Sub", "$/Other/Sub");
    let err = mapping.rename_root("$/P", "$/Q").unwrap_err();
    assert!(matches!(err, MigrationError::NotImplemented { .. }));
  }

  #[test]
  fn subdir_mapping_hides_target_and_rewrites_branch_dir() {
    let mapping = BranchMapping::at_root("$/P").with_subdir_mapping("$/P/BranchDir", "$/P/TargetDir");

    // Hidden: under target_dir.
    assert_eq!(mapping.git_path("$/P/TargetDir/x.txt"), None);
    // Rewritten: under branch_dir, appears as if under target_dir, then
    // root-stripped.
    assert_eq!(
      mapping.git_path("$/P/BranchDir/x.txt"),
      Some("TargetDir/x.txt".to_string())
    );
    // Unaffected: elsewhere under the root.
    assert_eq!(mapping.git_path("$/P/other.txt"), Some("other.txt".to_string()));
  }
}
