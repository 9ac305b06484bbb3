//! Resolves a TFVC identity string to a Git author/committer identity.
//!
//! Parsing the on-disk authors file is a CLI concern (it's just text I/O);
//! this crate only owns the lookup table and its fallback behavior so the
//! planner can be exercised without touching the filesystem.

use std::collections::HashMap;

/// Maps TFVC usernames (as they appear in `ChangesetMeta::author` /
/// `checked_in_by`) to a `(display name, email)` pair.
#[derive(Debug, Clone, Default)]
pub struct AuthorMap {
  entries: HashMap<String, (String, String)>,
}

impl AuthorMap {
  pub fn new(entries: HashMap<String, (String, String)>) -> Self {
    Self { entries }
  }

  /// Resolve `tfvc_user` to a `(name, email)` pair. Falls back to using the
  /// raw identity string as both name and a synthesized `@localhost`
  /// address when there's no mapping, rather than failing the migration
  /// over an unmapped author.
  pub fn resolve(&self, tfvc_user: &str) -> (String, String) {
    match self.entries.get(tfvc_user) {
      Some((name, email)) => (name.clone(), email.clone()),
      None => (tfvc_user.to_string(), format!("{tfvc_user}@localhost")),
    }
  }

  /// `true` if `tfvc_user` has an explicit entry (as opposed to falling
  /// back to a synthesized identity).
  pub fn covers(&self, tfvc_user: &str) -> bool {
    self.entries.contains_key(tfvc_user)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolves_mapped_author() {
    let mut entries = HashMap::new();
    entries.insert("DOMAIN\\jdoe".to_string(), ("Jane Doe".to_string(), "jane@example.com".to_string()));
    let map = AuthorMap::new(entries);
    assert_eq!(map.resolve("DOMAIN\\jdoe"), ("Jane Doe".to_string(), "jane@example.com".to_string()));
  }

  #[test]
  fn falls_back_to_synthesized_identity() {
    let map = AuthorMap::default();
    assert_eq!(map.resolve("DOMAIN\\unknown"), ("DOMAIN\\unknown".to_string(), "DOMAIN\\unknown@localhost".to_string()));
  }
}
