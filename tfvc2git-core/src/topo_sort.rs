//! Stable, dependency-respecting topological sort (§4.H).

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::error::TopologicalSortError;

/// Sort `items` so that every item appears after the items named by
/// `deps_of`. Among items whose dependencies are all already satisfied,
/// output preserves input order (a stable Kahn's-algorithm variant: at each
/// step, scan remaining items in their original relative order and take the
/// first with no unsatisfied dependency).
///
/// `key_of` extracts a comparable, hashable key for each item; `deps_of`
/// returns the keys of the items it depends on (which must themselves come
/// first in the output).
pub fn topological_sort<T, K, KeyFn, DepsFn>(
  items: Vec<T>,
  key_of: KeyFn,
  deps_of: DepsFn,
) -> Result<Vec<T>, TopologicalSortError<K>>
where
  K: Eq + Hash + Clone,
  KeyFn: Fn(&T) -> K,
  DepsFn: Fn(&T) -> Vec<K>,
{
  let keys: Vec<K> = items.iter().map(&key_of).collect();
  let key_set: HashSet<&K> = keys.iter().collect();
  let deps: Vec<Vec<K>> = items.iter().map(&deps_of).collect();

  let mut remaining: Vec<usize> = (0..items.len()).collect();
  let mut emitted: HashSet<K> = HashSet::new();
  let mut order: Vec<usize> = Vec::with_capacity(items.len());

  loop {
    let mut progressed = false;
    let mut still_remaining = Vec::with_capacity(remaining.len());
    for idx in remaining {
      if deps[idx].iter().all(|d| emitted.contains(d)) {
        emitted.insert(keys[idx].clone());
        order.push(idx);
        progressed = true;
      } else {
        still_remaining.push(idx);
      }
    }
    remaining = still_remaining;
    if remaining.is_empty() || !progressed {
      break;
    }
  }

  if !remaining.is_empty() {
    let mut cyclical = Vec::new();
    let mut external_dependencies = Vec::new();
    let mut external_dependents = Vec::new();
    for &idx in &remaining {
      let missing: Vec<K> = deps[idx].iter().filter(|d| !key_set.contains(d)).cloned().collect();
      if missing.is_empty() {
        cyclical.push(keys[idx].clone());
      } else {
        external_dependents.push(keys[idx].clone());
        for dep in missing {
          external_dependencies.push((keys[idx].clone(), dep));
        }
      }
    }
    return Err(TopologicalSortError {
      cyclical,
      external_dependencies,
      external_dependents,
    });
  }

  let mut items: Vec<Option<T>> = items.into_iter().map(Some).collect();
  Ok(order.into_iter().map(|idx| items[idx].take().expect("each index visited once")).collect())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stable_with_a_single_dependency() {
    let items = vec!["A", "B", "C"];
    let sorted = topological_sort(
      items,
      |s: &&str| s.to_string(),
      |s: &&str| if *s == "B" { vec!["A".to_string()] } else { vec![] },
    )
    .unwrap();
    assert_eq!(sorted, vec!["A", "B", "C"]);
  }

  #[test]
  fn preserves_relative_order_among_independent_items() {
    let items = vec!["C", "B", "A"];
    let sorted = topological_sort(items, |s: &&str| s.to_string(), |_: &&str| vec![]).unwrap();
    assert_eq!(sorted, vec!["C", "B", "A"]);
  }

  #[test]
  fn detects_a_cycle() {
    let items = vec!["A", "B"];
    let err = topological_sort(
      items,
      |s: &&str| s.to_string(),
      |s: &&str| if *s == "A" { vec!["B".to_string()] } else { vec!["A".to_string()] },
    )
    .unwrap_err();
    let mut cyclical = err.cyclical;
    cyclical.sort();
    assert_eq!(cyclical, vec!["A".to_string(), "B".to_string()]);
  }

  #[test]
  fn reports_external_dependencies_separately_from_cycles() {
    let items = vec!["A"];
    let err = topological_sort(
      items,
      |s: &&str| s.to_string(),
      |_: &&str| vec!["Missing".to_string()],
    )
    .unwrap_err();
    assert!(err.cyclical.is_empty());
    assert_eq!(err.external_dependents, vec!["A".to_string()]);
    assert_eq!(err.external_dependencies, vec![("A".to_string(), "Missing".to_string())]);
  }
}
