//! TFVC path semantics (§4.A).
//!
//! A TFVC path is absolute iff it begins with `$/`. None of the functions
//! here accept a path with a trailing slash — callers are expected to have
//! already normalized input from the History Source, which never emits
//! trailing slashes itself.

/// `true` iff `path` is an absolute TFVC path (`$/...`).
pub fn is_absolute(path: &str) -> bool {
  path.starts_with("$/")
}

fn assert_no_trailing_slash(path: &str) {
  debug_assert!(!path.ends_with('/'), "TFVC path must not have a trailing slash: {path}");
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
  a.eq_ignore_ascii_case(b)
}

/// `true` iff `b` is strictly under `a`: longer by at least a separator and
/// one more character, separated by `/`, with a case-insensitive prefix
/// match.
pub fn contains(a: &str, b: &str) -> bool {
  assert_no_trailing_slash(a);
  assert_no_trailing_slash(b);
  if b.len() <= a.len() + 1 {
    return false;
  }
  b.as_bytes()[a.len()] == b'/' && eq_ignore_case(&b[..a.len()], a)
}

/// `true` iff `a` and `b` are the same path (case-insensitively) or `a`
/// strictly contains `b`.
pub fn is_or_contains(a: &str, b: &str) -> bool {
  eq_ignore_case(a, b) || contains(a, b)
}

/// `true` iff either path is-or-contains the other.
pub fn overlaps(a: &str, b: &str) -> bool {
  is_or_contains(a, b) || is_or_contains(b, a)
}

/// The final path segment, or the whole path if it has no `/`.
pub fn leaf(path: &str) -> &str {
  match path.rfind('/') {
    Some(idx) => &path[idx + 1..],
    None => path,
  }
}

/// Replace the leading segment of `path` that is-or-contains `old_container`
/// with `new_container`. Requires `is_or_contains(old_container, path)`.
pub fn replace_containing(path: &str, old_container: &str, new_container: &str) -> String {
  assert!(
    is_or_contains(old_container, path),
    "'{old_container}' does not contain '{path}'"
  );
  let suffix = &path[old_container.len()..];
  format!("{new_container}{suffix}")
}

/// The suffix of `path` after `container/`, or empty if `path == container`.
/// Requires `is_or_contains(container, path)`.
pub fn remove_containing<'a>(path: &'a str, container: &str) -> &'a str {
  assert!(is_or_contains(container, path), "'{container}' does not contain '{path}'");
  if path.len() == container.len() {
    ""
  } else {
    &path[container.len() + 1..]
  }
}

/// Strip the largest common run of trailing path segments shared by `src`
/// and `tgt`, case-insensitively. Used to reduce a merge/branch record
/// like `$/X/A/Sub` <-> `$/X/B/Sub` to `($/X/A, $/X/B)`.
///
/// Returns `("", "")` if the paths are identical after stripping all common
/// trailing segments down to nothing.
pub fn strip_common_trailing_segments(src: &str, tgt: &str) -> (String, String) {
  let mut src = src.to_string();
  let mut tgt = tgt.to_string();

  while src.contains('/') {
    let seg_start = src.rfind('/').expect("loop guarded by contains('/')");
    let segment = &src[seg_start..]; // includes the leading '/'
    if tgt.len() >= segment.len() && eq_ignore_case(&tgt[tgt.len() - segment.len()..], segment) {
      src.truncate(seg_start);
      tgt.truncate(tgt.len() - segment.len());
    } else {
      break;
    }
  }

  if eq_ignore_case(&src, &tgt) {
    (String::new(), String::new())
  } else {
    (src, tgt)
  }
}

/// Return `paths` with no two entries where one contains the other. Later
/// entries that contain an earlier one displace it; later entries that are
/// contained by an earlier one are dropped.
pub fn non_overlapping_union(paths: impl IntoIterator<Item = String>) -> Vec<String> {
  let mut result: Vec<String> = Vec::new();
  for path in paths {
    result.retain(|existing: &String| !contains(&path, existing));
    if !result.iter().any(|existing| is_or_contains(existing, &path)) {
      result.push(path);
    }
  }
  result
}
