//! The commit planner (§4.F): replays one changeset's item changes against
//! the live mapping state, materializing blobs, building trees, and
//! writing one commit per touched branch in dependency order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::branch::BranchIdentity;
use crate::concurrency::{CancellationToken, bounded_parallel_map};
use crate::content;
use crate::error::{MigrationError, MigrationResult};
use crate::history::{Change, ChangeTypeFlags, ChangesetMeta, HistorySource};
use crate::mapping_state::MappingState;
use crate::object_store::{BlobId, CommitId, ObjectStore, Signature, TreeEntry};
use crate::authors::AuthorMap;
use crate::path;

static DISALLOWED_REF_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._/-]+").expect("static pattern"));
static REPEATED_DASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").expect("static pattern"));

/// Turn a TFVC branch path into a valid, readable `refs/heads/...` name:
/// collapse disallowed characters to `-`, drop the leading `$/`, and trim
/// stray separators. Not guaranteed collision-free across pathologically
/// similar TFVC paths; the planner does not attempt to detect that.
pub fn sanitize_ref_name(branch_path: &str) -> String {
  let without_root = branch_path.strip_prefix("$/").unwrap_or(branch_path);
  let collapsed = DISALLOWED_REF_CHARS.replace_all(without_root, "-");
  let deduped = REPEATED_DASH.replace_all(&collapsed, "-");
  let trimmed = deduped.trim_matches(|c| c == '-' || c == '/');
  format!("refs/heads/{trimmed}")
}

/// Replays TFVC changesets into Git commits, one per live branch touched
/// per changeset, maintaining a flat content index of live file paths so
/// each branch's tree can be derived by projecting that index through its
/// own [`crate::mapping::BranchMapping`].
pub struct CommitPlanner {
  history: Arc<dyn HistorySource>,
  store: Arc<dyn ObjectStore>,
  authors: AuthorMap,
  concurrency: usize,
  blob_cache: HashMap<[u8; 32], BlobId>,
  content_index: BTreeMap<String, BlobId>,
  ref_names: HashMap<BranchIdentity, String>,
  latest_commit: HashMap<BranchIdentity, CommitId>,
  latest_tree: HashMap<BranchIdentity, String>,
  /// Per-changeset commit index (§3/§4.F): every branch committed (or
  /// reconfirmed as unchanged) at a given changeset, so a later merge or
  /// branch referencing that exact historical version resolves to the
  /// commit that branch actually had *then*, not wherever its ref has
  /// since advanced to.
  commit_index: HashMap<(i64, BranchIdentity), CommitId>,
}

impl CommitPlanner {
  pub fn new(history: Arc<dyn HistorySource>, store: Arc<dyn ObjectStore>, authors: AuthorMap, concurrency: usize) -> Self {
    Self {
      history,
      store,
      authors,
      concurrency: concurrency.max(1),
      blob_cache: HashMap::new(),
      content_index: BTreeMap::new(),
      ref_names: HashMap::new(),
      latest_commit: HashMap::new(),
      latest_tree: HashMap::new(),
      commit_index: HashMap::new(),
    }
  }

  /// Resolve the commit a branch had as of an exact past changeset, as
  /// recorded in the per-changeset commit index. Fails `Invariant` if that
  /// branch was never committed at that changeset -- which should not
  /// happen when dependency order is correct, since a source referenced by
  /// a Branch/Merge op was necessarily touched at the changeset it was cut
  /// or merged from.
  fn resolve_commit_at(&self, changeset: i64, branch: &BranchIdentity) -> MigrationResult<CommitId> {
    self
      .commit_index
      .get(&(changeset, branch.clone()))
      .cloned()
      .ok_or_else(|| MigrationError::invariant(format!("no commit recorded for branch '{branch}' at changeset {changeset}")))
  }

  /// Seed the trunk's ref name before the first changeset is processed, so
  /// the migration root lands on a conventional branch name (`main`)
  /// rather than a name derived from its TFVC path.
  pub fn seed_trunk_ref(&mut self, trunk: BranchIdentity, ref_name: impl Into<String>) {
    self.ref_names.insert(trunk, ref_name.into());
  }

  /// Apply one changeset's item-level `changes`, using `state` (already
  /// folded with this changeset's topological operations) to route items
  /// to branches and order the resulting commits. Returns each committed
  /// branch paired with its (possibly reused, see `commit_branch`) commit,
  /// in the order branches were processed.
  pub async fn process_changeset(
    &mut self,
    meta: &ChangesetMeta,
    changes: &[Change],
    state: &MappingState,
    cancellation: &CancellationToken,
  ) -> MigrationResult<Vec<(BranchIdentity, CommitId)>> {
    if cancellation.is_cancelled() {
      return Err(MigrationError::precondition("migration cancelled").with_context(crate::error::ErrorContext::for_changeset(meta.changeset_id)));
    }

    self.update_content_index(changes).await?;
    self.rewrite_renamed_content_index_entries(state);

    for deleted in &state.deleted {
      if let Some(ref_name) = self.ref_names.remove(deleted) {
        self.store.delete_ref(&ref_name).await?;
      }
      self.latest_commit.remove(deleted);
      self.latest_tree.remove(deleted);
    }

    let touched = self.touched_branches(changes, state);
    let order = state.order_branches(touched)?;

    let mut commits = Vec::with_capacity(order.len());
    for branch in order {
      let commit = self.commit_branch(meta, &branch, state).await?;
      commits.push((branch, commit));
    }
    Ok(commits)
  }

  fn touched_branches(&self, changes: &[Change], state: &MappingState) -> Vec<BranchIdentity> {
    let mut touched: Vec<BranchIdentity> = Vec::new();
    let mut seen: HashSet<BranchIdentity> = HashSet::new();

    let mut note = |id: &BranchIdentity, touched: &mut Vec<BranchIdentity>, seen: &mut HashSet<BranchIdentity>| {
      if seen.insert(id.clone()) {
        touched.push(id.clone());
      }
    };

    for new_branch in state.created_from.keys() {
      note(new_branch, &mut touched, &mut seen);
    }
    for new_identity in state.renamed_from.keys() {
      note(new_identity, &mut touched, &mut seen);
    }
    for target in state.merge_parents.keys() {
      note(target, &mut touched, &mut seen);
    }
    for change in changes {
      if change.item.is_folder {
        continue;
      }
      for (identity, mapping) in &state.live_mappings {
        if mapping.git_path(&change.item.path).is_none() {
          continue;
        }
        if shadowed_by_a_more_specific_branch(&state.live_mappings, identity, &mapping.root_directory, &change.item.path) {
          continue;
        }
        note(identity, &mut touched, &mut seen);
      }
    }
    touched
  }

  async fn update_content_index(&mut self, changes: &[Change]) -> MigrationResult<()> {
    let fetches: Vec<(String, i64)> = changes
      .iter()
      .filter(|c| !c.item.is_folder && self.needs_fresh_content(c))
      .map(|c| (c.item.path.clone(), c.item.changeset_version))
      .collect();

    let history = Arc::clone(&self.history);
    let fetched: Vec<MigrationResult<(String, Vec<u8>)>> = bounded_parallel_map(fetches, self.concurrency, move |(path, version)| {
      let history = Arc::clone(&history);
      async move {
        let bytes = history.fetch_content(&path, version).await?;
        Ok((path, bytes))
      }
    })
    .await;

    for result in fetched {
      let (path, raw) = result?;
      let materialized = content::materialize(&raw);
      let blob_id = self.write_blob_cached(&materialized).await?;
      self.content_index.insert(path, blob_id);
    }

    for change in changes {
      if change.item.is_folder {
        continue;
      }
      if change.change_type.contains(ChangeTypeFlags::DELETE) && !change.change_type.contains(ChangeTypeFlags::UNDELETE) {
        self.content_index.remove(&change.item.path);
        continue;
      }
      if change.change_type.contains(ChangeTypeFlags::RENAME) {
        if let Some(old_path) = &change.source_server_item {
          if let Some(blob_id) = self.content_index.remove(old_path) {
            self.content_index.entry(change.item.path.clone()).or_insert(blob_id);
          }
        }
      }
    }

    Ok(())
  }

  /// A path-rename op moves a whole subtree under a new TFVC prefix without
  /// the history source re-issuing a change for every item underneath it;
  /// carry the live content index's keys across the same rewrite so files
  /// untouched this changeset are still found under their branch's new root.
  fn rewrite_renamed_content_index_entries(&mut self, state: &MappingState) {
    for (new_identity, old_identity) in &state.renamed_from {
      let old_root = &old_identity.path;
      let new_root = &new_identity.path;
      let stale: Vec<String> = self
        .content_index
        .keys()
        .filter(|path| path::is_or_contains(old_root, path))
        .cloned()
        .collect();
      for path in stale {
        if let Some(blob_id) = self.content_index.remove(&path) {
          let rewritten = path::replace_containing(&path, old_root, new_root);
          self.content_index.insert(rewritten, blob_id);
        }
      }
    }
  }

  fn needs_fresh_content(&self, change: &Change) -> bool {
    change.change_type.intersects(ChangeTypeFlags::ADD | ChangeTypeFlags::EDIT | ChangeTypeFlags::ENCODING | ChangeTypeFlags::UNDELETE)
  }

  async fn write_blob_cached(&mut self, content: &[u8]) -> MigrationResult<BlobId> {
    let digest: [u8; 32] = Sha256::digest(content).into();
    if let Some(blob_id) = self.blob_cache.get(&digest) {
      return Ok(blob_id.clone());
    }
    let blob_id = self.store.write_blob(content).await?;
    self.blob_cache.insert(digest, blob_id.clone());
    Ok(blob_id)
  }

  async fn commit_branch(&mut self, meta: &ChangesetMeta, branch: &BranchIdentity, state: &MappingState) -> MigrationResult<CommitId> {
    let mapping = state.live_mappings.get(branch).ok_or_else(|| {
      MigrationError::invariant(format!("branch '{branch}' has no live mapping this changeset"))
    })?;

    let mut entries: Vec<TreeEntry> = self
      .content_index
      .iter()
      .filter(|(item_path, _)| !shadowed_by_a_more_specific_branch(&state.live_mappings, branch, &mapping.root_directory, item_path))
      .filter_map(|(path, blob_id)| {
        mapping.git_path(path).filter(|p| !p.is_empty()).map(|git_path| TreeEntry {
          path: git_path,
          blob_id: blob_id.clone(),
          executable: false,
        })
      })
      .collect();
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    let tree_id = self.store.write_tree(&entries).await?;

    let mut parents = Vec::new();
    let mut has_topological_op = false;

    if let Some((source, source_changeset)) = state.created_from.get(branch) {
      // A new line of history: take the source's tip as of the exact
      // changeset it was branched from as parent, but the source keeps its
      // own ref name and latest_commit entry.
      has_topological_op = true;
      parents.push(self.resolve_commit_at(*source_changeset, source)?);
    } else if let Some(old_identity) = state.renamed_from.get(branch) {
      // Continuing history under a new identity: carry the old identity's
      // parent and ref name forward, and retire its latest_commit entry.
      has_topological_op = true;
      if let Some(parent) = self.latest_commit.remove(old_identity) {
        parents.push(parent);
      }
      self.latest_tree.remove(old_identity);
      let ref_name = self.ref_names.remove(old_identity).unwrap_or_else(|| sanitize_ref_name(&branch.path));
      self.ref_names.insert(branch.clone(), ref_name);
    } else if let Some(parent) = self.latest_commit.get(branch) {
      parents.push(parent.clone());
    }
    if let Some(merge_sources) = state.merge_parents.get(branch) {
      has_topological_op = true;
      for (source, source_changeset) in merge_sources {
        let parent = self.resolve_commit_at(*source_changeset, source)?;
        if !parents.contains(&parent) {
          parents.push(parent);
        }
      }
    }

    // A Branch/Merge/Rename op always produces a commit, even if the
    // resulting tree happens to match the parent's: the new ref/identity
    // still needs its own commit to exist. Otherwise, a touched branch
    // whose tree hash is unchanged from its current tip (e.g. a sub-branch's
    // edit that was entirely shadowed out of this branch's view) reuses the
    // existing tip rather than writing an empty-diff commit (§4.F step 4).
    let commit_required = has_topological_op || self.latest_tree.get(branch) != Some(&tree_id);

    let commit_id = if commit_required {
      let (author_name, author_email) = self.authors.resolve(&meta.author);
      let (committer_name, committer_email) = self.authors.resolve(&meta.checked_in_by);
      let author = Signature {
        name: author_name,
        email: author_email,
        when: meta.created_date,
      };
      let committer = Signature {
        name: committer_name,
        email: committer_email,
        when: meta.created_date,
      };
      let message = meta.comment.clone().unwrap_or_else(|| format!("Changeset {}", meta.changeset_id));

      let commit_id = self.store.write_commit(&tree_id, &parents, &author, &committer, &message).await?;

      let ref_name = self.ref_names.entry(branch.clone()).or_insert_with(|| sanitize_ref_name(&branch.path)).clone();
      self.store.update_ref(&ref_name, &commit_id).await?;
      self.latest_commit.insert(branch.clone(), commit_id.clone());
      self.latest_tree.insert(branch.clone(), tree_id);
      commit_id
    } else {
      self.latest_commit.get(branch).cloned().ok_or_else(|| {
        MigrationError::invariant(format!("branch '{branch}' has no existing commit to reuse as its unchanged tip"))
      })?
    };

    self.commit_index.insert((meta.changeset_id, branch.clone()), commit_id.clone());

    Ok(commit_id)
  }
}

/// An item belongs to the most specific live branch whose root contains it,
/// not to every ancestor branch's view: if another live branch's root sits
/// inside `root` and the item is at-or-under that root, it belongs to that
/// branch's tree, not the one rooted at `root` (§6 step 2).
fn shadowed_by_a_more_specific_branch(
  live_mappings: &HashMap<BranchIdentity, crate::mapping::BranchMapping>,
  branch: &BranchIdentity,
  root: &str,
  item_path: &str,
) -> bool {
  live_mappings
    .keys()
    .any(|other| other != branch && path::contains(root, &other.path) && path::is_or_contains(&other.path, item_path))
}
