//! Projects TFVC labels onto annotated Git tags once their changeset's
//! commits exist (§6, §10.7).

use std::collections::HashMap;
use std::sync::Arc;

use tfvc2git_core::error::MigrationResult;
use tfvc2git_core::history::{HistorySource, Label};
use tfvc2git_core::object_store::{CommitId, ObjectStore, Signature};

/// One label resolved to the changeset it snapshots.
pub struct ResolvedLabel {
  pub label: Label,
  pub changeset: i64,
}

/// Resolve every label under `root_path` to its changeset via
/// `label_items`.
pub async fn resolve_labels(history: &dyn HistorySource, root_path: &str) -> MigrationResult<Vec<ResolvedLabel>> {
  let labels = history.list_labels(root_path).await?;
  let mut resolved = Vec::with_capacity(labels.len());
  for label in labels {
    let changeset = history.label_items(&label).await?;
    resolved.push(ResolvedLabel { label, changeset });
  }
  Ok(resolved)
}

/// Create one annotated tag per resolved label whose changeset has
/// commits in `commits_by_changeset_and_branch_leaf`. When more than one
/// branch committed at a label's changeset, the tag name is suffixed
/// `-<branch-leaf>` per §6 to disambiguate.
pub async fn create_tags(
  store: &Arc<dyn ObjectStore>,
  resolved: &[ResolvedLabel],
  commits_by_changeset: &HashMap<i64, Vec<(String, CommitId)>>,
  tagger: &Signature,
) -> MigrationResult<()> {
  for entry in resolved {
    let Some(commits) = commits_by_changeset.get(&entry.changeset) else {
      continue;
    };
    let disambiguate = commits.len() > 1;
    for (branch_leaf, commit) in commits {
      let name = if disambiguate {
        format!("{}-{branch_leaf}", entry.label.name)
      } else {
        entry.label.name.clone()
      };
      let message = format!("TFVC label '{}' (owner: {})", entry.label.name, entry.label.owner);
      store.create_tag(&name, commit, Some(tagger), &message).await?;
    }
  }
  Ok(())
}
