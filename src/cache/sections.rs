//! Section projection: groups query results by category for display.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::menu::{MenuRecord, Section};

/// Display form of a category: first letter upper-cased, rest unchanged.
pub fn display_category(category: &str) -> String {
  let mut chars = category.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

/// Name ordering used for sections and items.
///
/// Compares case-folded first so "apple" sorts next to "Apple", then falls
/// back to the raw strings to keep the order total.
pub fn compare_names(a: &str, b: &str) -> Ordering {
  a.to_lowercase()
    .cmp(&b.to_lowercase())
    .then_with(|| a.cmp(b))
}

/// Group records into sections ordered by name, each sorted by item name
/// with ties broken by id.
pub fn project(records: &[MenuRecord]) -> Vec<Section> {
  let mut groups: HashMap<String, Vec<MenuRecord>> = HashMap::new();
  for record in records {
    groups
      .entry(display_category(&record.category))
      .or_default()
      .push(record.clone());
  }

  let mut sections: Vec<Section> = groups
    .into_iter()
    .map(|(name, mut items)| {
      items.sort_by(|a, b| compare_names(&a.name, &b.name).then_with(|| a.id.cmp(&b.id)));
      Section { name, items }
    })
    .collect();

  sections.sort_by(|a, b| compare_names(&a.name, &b.name));
  sections
}
