//! Parses the `--authors` file into a [`tfvc2git_core::authors::AuthorMap`]
//! (§6, §10.7).

use std::collections::HashMap;
use std::path::Path;

use tfvc2git_core::authors::AuthorMap;
use tfvc2git_core::error::{MigrationError, MigrationResult};

/// Parse lines of the form `TFVC_NAME = Display Name <email>`. Blank lines
/// are skipped; a line missing `=` or the `<...>` email delimiters fails
/// with [`MigrationError::Configuration`].
pub fn parse_authors_file(contents: &str) -> MigrationResult<AuthorMap> {
  let mut entries = HashMap::new();
  for (line_number, line) in contents.lines().enumerate() {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    let (tfvc_name, rest) = line.split_once('=').ok_or_else(|| {
      MigrationError::configuration(format!("authors file line {}: missing '=': {line}", line_number + 1))
    })?;
    let rest = rest.trim();
    let email_start = rest.find('<').ok_or_else(|| {
      MigrationError::configuration(format!("authors file line {}: missing '<email>': {line}", line_number + 1))
    })?;
    let email_end = rest.find('>').ok_or_else(|| {
      MigrationError::configuration(format!("authors file line {}: missing closing '>': {line}", line_number + 1))
    })?;
    if email_end < email_start {
      return Err(MigrationError::configuration(format!(
        "authors file line {}: malformed email delimiters: {line}",
        line_number + 1
      )));
    }
    let display_name = rest[..email_start].trim().to_string();
    let email = rest[email_start + 1..email_end].trim().to_string();
    entries.insert(tfvc_name.trim().to_string(), (display_name, email));
  }
  Ok(AuthorMap::new(entries))
}

/// Read and parse the authors file at `path`.
pub fn load_authors_file(path: &Path) -> MigrationResult<AuthorMap> {
  let contents = std::fs::read_to_string(path)
    .map_err(|e| MigrationError::configuration(format!("reading authors file '{}': {e}", path.display())))?;
  parse_authors_file(&contents)
}

/// Fail with [`MigrationError::Configuration`] listing every identity the
/// History Source reports that has no entry in `authors`.
pub fn require_full_coverage(authors: &AuthorMap, identities: impl IntoIterator<Item = String>) -> MigrationResult<()> {
  let mut unmapped: Vec<String> = identities.into_iter().filter(|id| !authors.covers(id)).collect();
  unmapped.sort();
  unmapped.dedup();
  if unmapped.is_empty() {
    Ok(())
  } else {
    Err(MigrationError::configuration(format!("authors file does not cover: {}", unmapped.join(", "))))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_a_simple_line() {
    let map = parse_authors_file("DOMAIN\\jdoe = Jane Doe <jane@example.com>\n").unwrap();
    assert_eq!(map.resolve("DOMAIN\\jdoe"), ("Jane Doe".to_string(), "jane@example.com".to_string()));
  }

  #[test]
  fn skips_blank_lines() {
    let map = parse_authors_file("\nDOMAIN\\jdoe = Jane Doe <jane@example.com>\n\n").unwrap();
    assert_eq!(map.resolve("DOMAIN\\jdoe"), ("Jane Doe".to_string(), "jane@example.com".to_string()));
  }

  #[test]
  fn fails_on_missing_equals() {
    let err = parse_authors_file("DOMAIN\\jdoe Jane Doe <jane@example.com>\n").unwrap_err();
    assert!(matches!(err, MigrationError::Configuration { .. }));
  }

  #[test]
  fn fails_on_missing_email_delimiters() {
    let err = parse_authors_file("DOMAIN\\jdoe = Jane Doe jane@example.com\n").unwrap_err();
    assert!(matches!(err, MigrationError::Configuration { .. }));
  }
}
