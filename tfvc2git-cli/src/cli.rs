//! The `tfvc2git` command-line surface (§6, §10.7).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tfvc2git_core::authors::AuthorMap;
use tfvc2git_core::error::MigrationError;
use tfvc2git_core::history::HistorySource;
use tfvc2git_core::mapping_state::MappingStateIterator;
use tfvc2git_core::object_store::{CommitId, ObjectStore, Signature};
use tfvc2git_core::planner::CommitPlanner;
use tfvc2git_core::topology::{RootPathChange, TopologyAnalyzer};
use tfvc2git_core::{
  BranchIdentity,
  concurrency::{CancellationToken, Lookahead, changeset_change_stream},
};
use tracing::{debug, error, info, info_span};

use crate::authors::{load_authors_file, require_full_coverage};
use crate::git_store::Git2ObjectStore;
use crate::labels::{create_tags, resolve_labels};
use crate::progress::MigrationProgress;
use crate::tfs_client::AzureDevOpsHistorySource;

/// Migrate a TFVC changeset history into a Git repository, reconstructing
/// branch topology from flat path changes.
#[derive(Parser, Debug)]
#[command(name = "tfvc2git")]
#[command(about = "Migrate a TFVC project history into a Git repository")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
  /// The Azure DevOps project-collection URL.
  pub project_collection_url: String,

  /// The TFVC root path to migrate, e.g. `$/MyProject`.
  pub root_path: String,

  /// Path to the authors mapping file (`TFVC_NAME = Display Name <email>` per line).
  #[arg(long)]
  pub authors: PathBuf,

  /// Target directory for the migrated Git repository.
  #[arg(long, default_value = ".")]
  pub out_dir: PathBuf,

  /// Only migrate changesets at or after this id (inclusive).
  #[arg(long)]
  pub min_changeset: Option<i64>,

  /// Only migrate changesets at or before this id (inclusive).
  #[arg(long)]
  pub max_changeset: Option<i64>,

  /// A root-path change to apply mid-migration, as `CSn:$/new-path`. May be
  /// given more than once; at most one per changeset.
  #[arg(long = "root-path-changes")]
  pub root_path_changes: Vec<String>,

  /// A Personal Access Token for the History Source, if required.
  #[arg(long)]
  pub pat: Option<String>,

  /// Sets the level of verbosity (can be used multiple times).
  #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
  pub verbose: u8,
}

fn parse_root_path_change(raw: &str) -> Result<RootPathChange, MigrationError> {
  let (changeset_part, new_root_path) = raw.split_once(':').ok_or_else(|| {
    MigrationError::configuration(format!("malformed --root-path-changes entry (expected 'CSn:$/path'): {raw}"))
  })?;
  let changeset_digits = changeset_part.strip_prefix("CS").ok_or_else(|| {
    MigrationError::configuration(format!("malformed --root-path-changes entry (expected 'CSn:$/path'): {raw}"))
  })?;
  let changeset = changeset_digits
    .parse::<i64>()
    .map_err(|_| MigrationError::configuration(format!("malformed changeset number in --root-path-changes entry: {raw}")))?;
  if !new_root_path.starts_with("$/") {
    return Err(MigrationError::configuration(format!(
      "--root-path-changes new path must start with '$/': {raw}"
    )));
  }
  Ok(RootPathChange {
    changeset,
    new_root_path: new_root_path.to_string(),
  })
}

/// Run the migration end to end. Returns an error that the binary's
/// `main` converts to exit code `1` and a stderr message.
pub async fn run(cli: Cli) -> Result<()> {
  if cli.out_dir.exists() {
    let mut entries = std::fs::read_dir(&cli.out_dir).context("reading --out-dir")?;
    if entries.next().is_some() && !cli.out_dir.join(".git").exists() {
      bail!(
        "--out-dir '{}' is non-empty and is not an existing Git repository",
        cli.out_dir.display()
      );
    }
  } else {
    std::fs::create_dir_all(&cli.out_dir).context("creating --out-dir")?;
  }

  let mut root_path_changes = Vec::with_capacity(cli.root_path_changes.len());
  for raw in &cli.root_path_changes {
    root_path_changes.push(parse_root_path_change(raw)?);
  }

  let authors: AuthorMap = load_authors_file(&cli.authors)?;

  let history: Arc<dyn HistorySource> = Arc::new(AzureDevOpsHistorySource::new(cli.project_collection_url.clone(), cli.pat.clone()));
  let store: Arc<dyn ObjectStore> = Arc::new(Git2ObjectStore::open_or_init(&cli.out_dir)?);

  let changesets = history.list_changesets(&cli.root_path, cli.min_changeset, cli.max_changeset).await?;
  let Some(first) = changesets.first() else {
    info!("no changesets found under {}", cli.root_path);
    return Ok(());
  };

  let identities = changesets.iter().flat_map(|c| [c.author.clone(), c.checked_in_by.clone()]);
  require_full_coverage(&authors, identities)?;

  let cancellation = CancellationToken::new();
  {
    let cancellation = cancellation.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        info!("cancellation requested, finishing the current changeset before exiting");
        cancellation.cancel();
      }
    });
  }

  let trunk = BranchIdentity::new(first.changeset_id, cli.root_path.clone());
  let mut analyzer = TopologyAnalyzer::new(first.changeset_id, cli.root_path.clone(), root_path_changes);
  let mut mapping_state = MappingStateIterator::new(trunk.clone());
  let mut planner = CommitPlanner::new(Arc::clone(&history), Arc::clone(&store), authors, num_cpus_hint());
  planner.seed_trunk_ref(trunk, "refs/heads/main");

  let first_changeset_id = first.changeset_id;
  let progress = MigrationProgress::new(changesets.len() as u64);
  let mut commits_by_changeset: HashMap<i64, Vec<(String, CommitId)>> = HashMap::new();

  let change_stream = changeset_change_stream(Arc::clone(&history), changesets.clone());
  let mut lookahead = Lookahead::new(change_stream);

  while lookahead.next().await? {
    let (meta, changes) = lookahead.current().expect("next() just returned true");

    if cancellation.is_cancelled() {
      info!("cancelled before changeset {}", meta.changeset_id);
      break;
    }
    progress.changeset_started(meta.changeset_id);
    let span = info_span!("changeset", id = meta.changeset_id);
    let _enter = span.enter();

    let ops = if meta.changeset_id == first_changeset_id {
      Vec::new()
    } else {
      analyzer.process_changeset(meta.changeset_id, changes)?
    };
    for op in &ops {
      debug!(?op, "topological operation");
    }

    let state = mapping_state.apply(meta.changeset_id, &ops)?;
    let result = planner.process_changeset(meta, changes, &state, &cancellation).await;
    let commits = match result {
      Ok(commits) => commits,
      Err(err @ MigrationError::Invariant { .. }) | Err(err @ MigrationError::PoorlyUnderstoodCombination { .. }) => {
        error!(%err, "fatal error during changeset {}", meta.changeset_id);
        return Err(err.into());
      }
      Err(err) => return Err(err.into()),
    };

    let leaves: Vec<(String, CommitId)> = commits
      .iter()
      .map(|(branch, commit)| (tfvc2git_core::path::leaf(&branch.path).to_string(), commit.clone()))
      .collect();
    if !leaves.is_empty() {
      commits_by_changeset.insert(meta.changeset_id, leaves);
    }

    progress.changeset_finished();
  }
  progress.finish("migration complete");

  let resolved_labels = resolve_labels(history.as_ref(), &cli.root_path).await?;
  if !resolved_labels.is_empty() {
    let tagger = Signature {
      name: "tfvc2git".to_string(),
      email: "tfvc2git@localhost".to_string(),
      when: chrono::Utc::now(),
    };
    create_tags(&store, &resolved_labels, &commits_by_changeset, &tagger).await?;
  }

  Ok(())
}

fn num_cpus_hint() -> usize {
  std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
