//! Error categories for the migration pipeline.
//!
//! The categories mirror the failure modes a TFVC->Git migration run can
//! hit: misconfiguration the operator must fix, preconditions about the
//! target directory, defects surfaced as invariant violations, shapes of
//! TFVC history the analyzer has not been validated against, features the
//! migrator does not implement, and transient I/O failures from the
//! History Source or Object Store. None of these are recovered locally;
//! they propagate with changeset/operation context attached.

use thiserror::Error;

/// The changeset and, where known, the operation being processed when a
/// [`MigrationError`] occurred. Attached to fatal errors so the operator can
/// correlate the failure with the detailed log (see `tracing` spans in
/// `tfvc2git-cli`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
  pub changeset: Option<i64>,
  pub operation: Option<String>,
}

impl ErrorContext {
  pub fn for_changeset(changeset: i64) -> Self {
    Self {
      changeset: Some(changeset),
      operation: None,
    }
  }

  pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
    self.operation = Some(operation.into());
    self
  }
}

impl std::fmt::Display for ErrorContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match (&self.changeset, &self.operation) {
      (Some(cs), Some(op)) => write!(f, " (changeset {cs}, during {op})"),
      (Some(cs), None) => write!(f, " (changeset {cs})"),
      (None, Some(op)) => write!(f, " (during {op})"),
      (None, None) => Ok(()),
    }
  }
}

/// The registry discipline violations described in §4.B.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
  #[error("changeset {changeset} is not after the registry's known changeset {max_known}")]
  OutOfOrder { changeset: i64, max_known: i64 },
  #[error("branch already live at path '{path}'")]
  Duplicate { path: String },
  #[error("no live branch found at path '{path}'")]
  NotFound { path: String },
  #[error("queried changeset {queried} is past the registry's known changeset {max_known}")]
  UnknownChangeset { queried: i64, max_known: i64 },
}

/// Failures from the stable topological sort (§4.H).
#[derive(Debug, Error, PartialEq, Eq)]
#[error("topological sort failed: {} cyclical, {} external dependencies", cyclical.len(), external_dependencies.len())]
pub struct TopologicalSortError<K> {
  /// Keys that participate in a dependency cycle.
  pub cyclical: Vec<K>,
  /// Keys referenced as a dependency but absent from the input set, paired
  /// with the dependent that referenced them.
  pub external_dependencies: Vec<(K, K)>,
  /// Keys with no satisfiable dependents, echoed back for diagnostics
  /// symmetry with `external_dependencies`.
  pub external_dependents: Vec<K>,
}

/// Overlap and fault handling violations from [`crate::concurrency::Lookahead`]
/// (§4.G, testable property #8).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookaheadError {
  #[error("overlapping call to Lookahead::next: a previous call has not completed")]
  OverlappedCall,
}

/// The top-level error type returned by every fallible operation in this
/// crate. The CLI binary maps this to an exit code and a human-readable
/// message; the library itself never uses `anyhow`.
#[derive(Debug, Error)]
pub enum MigrationError {
  #[error("configuration error: {message}{context}")]
  Configuration { message: String, context: ErrorContext },

  #[error("precondition failed: {message}{context}")]
  Precondition { message: String, context: ErrorContext },

  #[error("invariant violated: {message}{context}")]
  Invariant { message: String, context: ErrorContext },

  #[error("poorly understood change combination: {message}{context}")]
  PoorlyUnderstoodCombination { message: String, context: ErrorContext },

  #[error("not implemented: {message}{context}")]
  NotImplemented { message: String, context: ErrorContext },

  #[error("transient I/O failure: {message}{context}")]
  TransientIo { message: String, context: ErrorContext },
}

impl MigrationError {
  pub fn configuration(message: impl Into<String>) -> Self {
    Self::Configuration {
      message: message.into(),
      context: ErrorContext::default(),
    }
  }

  pub fn precondition(message: impl Into<String>) -> Self {
    Self::Precondition {
      message: message.into(),
      context: ErrorContext::default(),
    }
  }

  pub fn invariant(message: impl Into<String>) -> Self {
    Self::Invariant {
      message: message.into(),
      context: ErrorContext::default(),
    }
  }

  pub fn poorly_understood(message: impl Into<String>) -> Self {
    Self::PoorlyUnderstoodCombination {
      message: message.into(),
      context: ErrorContext::default(),
    }
  }

  pub fn not_implemented(message: impl Into<String>) -> Self {
    Self::NotImplemented {
      message: message.into(),
      context: ErrorContext::default(),
    }
  }

  pub fn transient_io(message: impl Into<String>) -> Self {
    Self::TransientIo {
      message: message.into(),
      context: ErrorContext::default(),
    }
  }

  /// Attach changeset/operation context to an already-constructed error.
  pub fn with_context(self, context: ErrorContext) -> Self {
    match self {
      Self::Configuration { message, .. } => Self::Configuration { message, context },
      Self::Precondition { message, .. } => Self::Precondition { message, context },
      Self::Invariant { message, .. } => Self::Invariant { message, context },
      Self::PoorlyUnderstoodCombination { message, .. } => Self::PoorlyUnderstoodCombination { message, context },
      Self::NotImplemented { message, .. } => Self::NotImplemented { message, context },
      Self::TransientIo { message, .. } => Self::TransientIo { message, context },
    }
  }
}

impl From<LookaheadError> for MigrationError {
  fn from(err: LookaheadError) -> Self {
    match &err {
      LookaheadError::OverlappedCall => Self::invariant(err.to_string()),
    }
  }
}

impl From<RegistryError> for MigrationError {
  fn from(err: RegistryError) -> Self {
    match &err {
      RegistryError::OutOfOrder { .. } => Self::invariant(err.to_string()),
      RegistryError::Duplicate { .. } => Self::invariant(err.to_string()),
      RegistryError::NotFound { .. } => Self::invariant(err.to_string()),
      RegistryError::UnknownChangeset { .. } => Self::invariant(err.to_string()),
    }
  }
}

pub type MigrationResult<T> = Result<T, MigrationError>;
