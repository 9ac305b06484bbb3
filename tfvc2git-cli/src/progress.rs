//! `indicatif` progress reporting (§10.7): one bar tracking changesets
//! processed, and a transient sub-bar for in-flight blob downloads.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub struct MigrationProgress {
  multi: MultiProgress,
  changesets: ProgressBar,
}

impl MigrationProgress {
  pub fn new(total_changesets: u64) -> Self {
    let multi = MultiProgress::new();
    let changesets = multi.add(ProgressBar::new(total_changesets));
    changesets.set_style(
      ProgressStyle::with_template("{spinner:.green} changeset {pos}/{len} [{bar:40.cyan/blue}] {msg}")
        .expect("static template")
        .progress_chars("#>-"),
    );
    Self { multi, changesets }
  }

  pub fn changeset_started(&self, changeset_id: i64) {
    self.changesets.set_message(format!("CS{changeset_id}"));
  }

  pub fn changeset_finished(&self) {
    self.changesets.inc(1);
  }

  /// A transient bar for one changeset's blob downloads, removed once
  /// dropped or finished.
  pub fn download_bar(&self, total: u64) -> ProgressBar {
    let bar = self.multi.add(ProgressBar::new(total));
    bar.set_style(
      ProgressStyle::with_template("  {spinner:.yellow} downloading blobs [{bar:30.yellow/red}] {pos}/{len}")
        .expect("static template"),
    );
    bar
  }

  pub fn finish(&self, message: impl Into<std::borrow::Cow<'static, str>>) {
    self.changesets.finish_with_message(message);
  }
}
