//! End-to-end exercise of topology analysis, mapping state, and commit
//! planning against a real `git2` repository, driven by an in-memory
//! history source (scenarios grounded on S1/S2 of the migration's testable
//! properties).

use std::collections::HashMap;
use std::sync::Arc;

use git2::Repository;
use tempfile::TempDir;
use tfvc2git_cli::git_store::Git2ObjectStore;
use tfvc2git_core::authors::AuthorMap;
use tfvc2git_core::concurrency::CancellationToken;
use tfvc2git_core::history::{ChangeTypeFlags, HistorySource};
use tfvc2git_core::mapping_state::MappingStateIterator;
use tfvc2git_core::object_store::ObjectStore;
use tfvc2git_core::planner::CommitPlanner;
use tfvc2git_core::topology::TopologyAnalyzer;
use tfvc2git_core::BranchIdentity;
use tfvc2git_test_utils::fixtures::{branch_or_merge, change, folder, item, rename, FakeHistorySource};
use tfvc2git_test_utils::read_tree_paths;

async fn run_migration(history: FakeHistorySource, out_dir: &std::path::Path) -> Arc<dyn ObjectStore> {
  let history: Arc<dyn HistorySource> = Arc::new(history);
  let store: Arc<dyn ObjectStore> = Arc::new(Git2ObjectStore::open_or_init(out_dir).unwrap());

  let root = "$/P".to_string();
  let changesets = history.list_changesets(&root, None, None).await.unwrap();
  let first = changesets[0].changeset_id;

  let trunk = BranchIdentity::new(first, root.clone());
  let mut analyzer = TopologyAnalyzer::new(first, root.clone(), Vec::new());
  let mut mapping_state = MappingStateIterator::new(trunk.clone());
  let mut planner = CommitPlanner::new(Arc::clone(&history), Arc::clone(&store), AuthorMap::default(), 2);
  planner.seed_trunk_ref(trunk, "refs/heads/main");

  let cancellation = CancellationToken::new();
  for meta in &changesets {
    let changes = history.list_changeset_changes(meta.changeset_id).await.unwrap();
    let ops = if meta.changeset_id == first {
      Vec::new()
    } else {
      analyzer.process_changeset(meta.changeset_id, &changes).unwrap()
    };
    let state = mapping_state.apply(meta.changeset_id, &ops).unwrap();
    planner.process_changeset(meta, &changes, &state, &cancellation).await.unwrap();
  }

  store
}

#[tokio::test]
async fn trunk_only_history_produces_a_linear_main_branch() {
  let temp = TempDir::new().unwrap();

  let mut history = FakeHistorySource::new();
  history.push(
    1,
    "alice",
    vec![change(item("$/P/a.txt", 1), ChangeTypeFlags::ADD)],
    HashMap::from([("$/P/a.txt".to_string(), b"one".to_vec())]),
  );
  history.push(
    2,
    "alice",
    vec![change(item("$/P/a.txt", 2), ChangeTypeFlags::EDIT)],
    HashMap::from([("$/P/a.txt".to_string(), b"two".to_vec())]),
  );

  run_migration(history, temp.path()).await;

  let repo = Repository::open(temp.path()).unwrap();
  let main = repo.find_reference("refs/heads/main").unwrap();
  let tip = main.peel_to_commit().unwrap();
  assert_eq!(tip.parent_count(), 1);
  assert_eq!(read_tree_paths(&repo, tip.id())["a.txt"], "two");
}

#[tokio::test]
async fn branch_then_merge_creates_two_refs_with_a_merge_commit() {
  let temp = TempDir::new().unwrap();

  let mut history = FakeHistorySource::new();
  history.push(
    1,
    "alice",
    vec![change(item("$/P/a.txt", 1), ChangeTypeFlags::ADD)],
    HashMap::from([("$/P/a.txt".to_string(), b"trunk-1".to_vec())]),
  );
  history.push(
    2,
    "bob",
    vec![branch_or_merge(folder("$/P/Feature", 2), ChangeTypeFlags::BRANCH, "$/P", 1, false)],
    HashMap::new(),
  );
  history.push(
    3,
    "bob",
    vec![change(item("$/P/Feature/a.txt", 3), ChangeTypeFlags::EDIT)],
    HashMap::from([("$/P/Feature/a.txt".to_string(), b"feature-3".to_vec())]),
  );
  history.push(
    4,
    "alice",
    vec![branch_or_merge(item("$/P/a.txt", 4), ChangeTypeFlags::MERGE | ChangeTypeFlags::EDIT, "$/P/Feature", 3, false)],
    HashMap::from([("$/P/a.txt".to_string(), b"feature-3".to_vec())]),
  );

  run_migration(history, temp.path()).await;

  let repo = Repository::open(temp.path()).unwrap();
  let main_tip = repo.find_reference("refs/heads/main").unwrap().peel_to_commit().unwrap();
  let feature_tip = repo.find_reference("refs/heads/Feature").unwrap().peel_to_commit().unwrap();

  assert_eq!(main_tip.parent_count(), 2);
  assert_eq!(read_tree_paths(&repo, feature_tip.id())["a.txt"], "feature-3");
  let main_tree = read_tree_paths(&repo, main_tip.id());
  assert_eq!(main_tree["a.txt"], "feature-3");
  assert!(!main_tree.contains_key("Feature/a.txt"), "trunk's tree must not carry the feature branch's own subtree");
}

#[tokio::test]
async fn root_rename_keeps_the_same_ref_and_carries_history_forward() {
  let temp = TempDir::new().unwrap();

  let mut history = FakeHistorySource::new();
  history.push(
    1,
    "alice",
    vec![change(item("$/P/a.txt", 1), ChangeTypeFlags::ADD)],
    HashMap::from([("$/P/a.txt".to_string(), b"one".to_vec())]),
  );
  history.push(2, "alice", vec![rename(folder("$/Q", 2), "$/P")], HashMap::new());
  history.push(
    3,
    "alice",
    vec![change(item("$/Q/a.txt", 3), ChangeTypeFlags::EDIT)],
    HashMap::from([("$/Q/a.txt".to_string(), b"two".to_vec())]),
  );

  run_migration(history, temp.path()).await;

  let repo = Repository::open(temp.path()).unwrap();
  // The renamed identity must still be reachable under the original ref
  // name, not under a fresh name derived from its new TFVC path.
  assert!(repo.find_reference("refs/heads/Q").is_err());
  let tip = repo.find_reference("refs/heads/main").unwrap().peel_to_commit().unwrap();

  assert_eq!(read_tree_paths(&repo, tip.id())["a.txt"], "two");
  assert_eq!(tip.parent_count(), 1);

  let rename_commit = tip.parent(0).unwrap();
  assert_eq!(rename_commit.parent_count(), 1, "the rename changeset must chain to the pre-rename commit");
  assert_eq!(read_tree_paths(&repo, rename_commit.id())["a.txt"], "one", "untouched content must carry across the rename");

  let root_commit = rename_commit.parent(0).unwrap();
  assert_eq!(root_commit.parent_count(), 0);
}
