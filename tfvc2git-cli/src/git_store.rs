//! The `git2`-backed [`ObjectStore`] implementation (§10.3).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use git2::{Oid, Repository, Signature as Git2Signature, Time};
use tfvc2git_core::error::{MigrationError, MigrationResult};
use tfvc2git_core::object_store::{BlobId, CommitId, ObjectStore, Signature, TreeEntry};

fn git_err(context: &str, err: git2::Error) -> MigrationError {
  MigrationError::invariant(format!("{context}: {err}"))
}

/// One flat namespace of content to turn into a nested tree: either a
/// file (a blob id) or a directory of further entries.
enum Node {
  Blob(Oid, bool),
  Dir(BTreeMap<String, Node>),
}

fn insert_entry(root: &mut BTreeMap<String, Node>, path: &str, blob_id: Oid, executable: bool) {
  let mut segments = path.split('/').peekable();
  let mut cursor = root;
  while let Some(segment) = segments.next() {
    if segments.peek().is_none() {
      cursor.insert(segment.to_string(), Node::Blob(blob_id, executable));
      return;
    }
    let entry = cursor.entry(segment.to_string()).or_insert_with(|| Node::Dir(BTreeMap::new()));
    match entry {
      Node::Dir(children) => cursor = children,
      Node::Blob(..) => {
        *entry = Node::Dir(BTreeMap::new());
        let Node::Dir(children) = entry else { unreachable!() };
        cursor = children;
      }
    }
  }
}

fn write_node(repo: &Repository, node: &BTreeMap<String, Node>) -> Result<Oid, git2::Error> {
  let mut builder = repo.treebuilder(None)?;
  for (name, node) in node {
    match node {
      Node::Blob(oid, executable) => {
        let mode = if *executable { 0o100755 } else { 0o100644 };
        builder.insert(name, *oid, mode)?;
      }
      Node::Dir(children) => {
        let child_oid = write_node(repo, children)?;
        builder.insert(name, child_oid, 0o040000)?;
      }
    }
  }
  builder.write()
}

/// Wraps a `git2::Repository` opened (or freshly initialized) at the
/// migration's `--out-dir`. `Repository` is `Send` but not `Sync`; the
/// planner is single-writer per §5, so a `Mutex` is enough to satisfy the
/// `ObjectStore: Send + Sync` bound without any real contention.
pub struct Git2ObjectStore {
  repo: Mutex<Repository>,
}

impl Git2ObjectStore {
  /// Open an existing repository at `path`, or initialize a new one (bare
  /// working tree, matching a fresh migration target) if it isn't one yet.
  pub fn open_or_init(path: &Path) -> MigrationResult<Self> {
    let repo = match Repository::open(path) {
      Ok(repo) => repo,
      Err(_) => Repository::init(path).map_err(|e| git_err("initializing target repository", e))?,
    };
    Ok(Self { repo: Mutex::new(repo) })
  }

  fn to_signature(sig: &Signature) -> Result<Git2Signature<'static>, git2::Error> {
    let time = Time::new(sig.when.timestamp(), 0);
    Git2Signature::new(&sig.name, &sig.email, &time)
  }
}

#[async_trait]
impl ObjectStore for Git2ObjectStore {
  async fn write_blob(&self, content: &[u8]) -> MigrationResult<BlobId> {
    let repo = self.repo.lock().expect("repository mutex poisoned");
    let oid = repo.blob(content).map_err(|e| git_err("writing blob", e))?;
    Ok(BlobId(oid.to_string()))
  }

  async fn write_tree(&self, entries: &[TreeEntry]) -> MigrationResult<String> {
    let repo = self.repo.lock().expect("repository mutex poisoned");
    let mut root: BTreeMap<String, Node> = BTreeMap::new();
    for entry in entries {
      let oid = Oid::from_str(&entry.blob_id.0).map_err(|e| git_err("parsing blob id", e))?;
      insert_entry(&mut root, &entry.path, oid, entry.executable);
    }
    let oid = write_node(&repo, &root).map_err(|e| git_err("writing tree", e))?;
    Ok(oid.to_string())
  }

  async fn write_commit(
    &self,
    tree: &str,
    parents: &[CommitId],
    author: &Signature,
    committer: &Signature,
    message: &str,
  ) -> MigrationResult<CommitId> {
    let repo = self.repo.lock().expect("repository mutex poisoned");
    let tree_oid = Oid::from_str(tree).map_err(|e| git_err("parsing tree id", e))?;
    let tree = repo.find_tree(tree_oid).map_err(|e| git_err("looking up tree", e))?;

    let mut parent_commits = Vec::with_capacity(parents.len());
    for parent in parents {
      let oid = Oid::from_str(&parent.0).map_err(|e| git_err("parsing parent commit id", e))?;
      parent_commits.push(repo.find_commit(oid).map_err(|e| git_err("looking up parent commit", e))?);
    }
    let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

    let author_sig = Self::to_signature(author).map_err(|e| git_err("building author signature", e))?;
    let committer_sig = Self::to_signature(committer).map_err(|e| git_err("building committer signature", e))?;

    let oid = repo
      .commit(None, &author_sig, &committer_sig, message, &tree, &parent_refs)
      .map_err(|e| git_err("writing commit", e))?;
    Ok(CommitId(oid.to_string()))
  }

  async fn update_ref(&self, ref_name: &str, commit: &CommitId) -> MigrationResult<()> {
    let repo = self.repo.lock().expect("repository mutex poisoned");
    let oid = Oid::from_str(&commit.0).map_err(|e| git_err("parsing commit id", e))?;
    repo
      .reference(ref_name, oid, true, "tfvc2git: advance branch")
      .map_err(|e| git_err("updating ref", e))?;
    Ok(())
  }

  async fn delete_ref(&self, ref_name: &str) -> MigrationResult<()> {
    let repo = self.repo.lock().expect("repository mutex poisoned");
    let mut reference = repo.find_reference(ref_name).map_err(|e| git_err("looking up ref to delete", e))?;
    reference.delete().map_err(|e| git_err("deleting ref", e))?;
    Ok(())
  }

  async fn read_ref(&self, ref_name: &str) -> MigrationResult<Option<CommitId>> {
    let repo = self.repo.lock().expect("repository mutex poisoned");
    match repo.find_reference(ref_name) {
      Ok(reference) => {
        let oid = reference.target().ok_or_else(|| MigrationError::invariant(format!("ref '{ref_name}' is symbolic, not direct")))?;
        Ok(Some(CommitId(oid.to_string())))
      }
      Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
      Err(e) => Err(git_err("looking up ref", e)),
    }
  }

  async fn create_tag(&self, name: &str, commit: &CommitId, tagger: Option<&Signature>, message: &str) -> MigrationResult<()> {
    let repo = self.repo.lock().expect("repository mutex poisoned");
    let oid = Oid::from_str(&commit.0).map_err(|e| git_err("parsing tagged commit id", e))?;
    let object = repo.find_object(oid, None).map_err(|e| git_err("looking up tagged object", e))?;
    match tagger {
      Some(tagger) => {
        let tagger_sig = Self::to_signature(tagger).map_err(|e| git_err("building tagger signature", e))?;
        repo
          .tag(name, &object, &tagger_sig, message, true)
          .map_err(|e| git_err("creating annotated tag", e))?;
      }
      None => {
        repo.tag_lightweight(name, &object, true).map_err(|e| git_err("creating lightweight tag", e))?;
      }
    }
    Ok(())
  }
}
