//! Query engine: combined text/category predicate over the menu store.
//!
//! Predicates compile to parameterized SQL. User-supplied text is only ever
//! bound as a value, never spliced into the statement. Text matching goes
//! through the `fold` SQL function so case folding covers all of Unicode,
//! not just ASCII.

use crate::cache::storage::MenuStore;
use crate::error::Result;
use crate::menu::{FilterState, MenuRecord};

/// Name of the case-folding SQL function registered on every store connection.
pub const FOLD_FUNCTION: &str = "fold";

/// Case folding shared by SQL and in-memory matching.
pub fn fold(text: &str) -> String {
  text.to_lowercase()
}

/// A compiled menu predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuFilter {
  text: String,
  categories: Vec<String>,
}

impl MenuFilter {
  /// Predicate that matches every record.
  pub fn all() -> Self {
    Self {
      text: String::new(),
      categories: Vec::new(),
    }
  }

  pub fn from_state(state: &FilterState) -> Self {
    Self {
      text: state.text_query.clone(),
      // BTreeSet iteration keeps the bound parameter order stable
      categories: state.active_categories.iter().cloned().collect(),
    }
  }

  /// Search text, matched as a case-insensitive substring of the name.
  pub fn text(&self) -> &str {
    &self.text
  }

  /// Active categories; empty means all.
  pub fn categories(&self) -> &[String] {
    &self.categories
  }

  /// Evaluate the predicate in memory, with the same folding as the SQL.
  pub fn matches(&self, record: &MenuRecord) -> bool {
    let text_ok = self.text.is_empty() || fold(&record.name).contains(&fold(&self.text));
    let category_ok = self.categories.is_empty() || self.categories.contains(&record.category);
    text_ok && category_ok
  }

  /// SQL `WHERE` clause and the values bound to its placeholders, in order.
  pub fn to_sql(&self) -> (String, Vec<String>) {
    // instr() matches literally, so no wildcard escaping is needed
    let mut clause = format!("instr({}(name), ?) > 0", FOLD_FUNCTION);
    let mut values = vec![fold(&self.text)];

    if !self.categories.is_empty() {
      let placeholders = vec!["?"; self.categories.len()].join(", ");
      clause.push_str(&format!(" AND category IN ({})", placeholders));
      values.extend(self.categories.iter().cloned());
    }

    (clause, values)
  }
}

/// Return every stored record whose name contains `filter.text_query`
/// (case-insensitive) and whose category is active, or any category when no
/// category is active.
pub fn evaluate<S: MenuStore + ?Sized>(store: &S, filter: &FilterState) -> Result<Vec<MenuRecord>> {
  store.query(&MenuFilter::from_state(filter))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::SqliteMenuStore;

  fn record(id: i64, name: &str, category: &str) -> MenuRecord {
    MenuRecord {
      id,
      name: name.to_string(),
      price: 1.0,
      description: String::new(),
      image: String::new(),
      category: category.to_string(),
    }
  }

  fn store_with(records: &[MenuRecord]) -> SqliteMenuStore {
    let store = SqliteMenuStore::open_in_memory().unwrap();
    store.initialize().unwrap();
    store.replace_all(records).unwrap();
    store
  }

  fn ids(mut records: Vec<MenuRecord>) -> Vec<i64> {
    records.sort_by_key(|r| r.id);
    records.into_iter().map(|r| r.id).collect()
  }

  #[test]
  fn test_empty_filter_returns_everything() {
    let store = store_with(&[
      record(1, "Lemon Cake", "desserts"),
      record(2, "Greek Salad", "starters"),
      record(3, "Pasta", "mains"),
    ]);
    let result = evaluate(&store, &FilterState::default()).unwrap();
    assert_eq!(ids(result), vec![1, 2, 3]);
  }

  #[test]
  fn test_text_match_is_case_insensitive() {
    let store = store_with(&[record(1, "Zucchini", "mains"), record(2, "Bruschetta", "starters")]);
    let result = evaluate(&store, &FilterState::new("ZU")).unwrap();
    assert_eq!(ids(result), vec![1]);
  }

  #[test]
  fn test_text_match_folds_non_ascii() {
    let store = store_with(&[
      record(1, "Éclair", "desserts"),
      record(2, "Crème Brûlée", "desserts"),
      record(3, "Eclipse Salad", "starters"),
    ]);
    assert_eq!(ids(evaluate(&store, &FilterState::new("éc")).unwrap()), vec![1]);
    assert_eq!(ids(evaluate(&store, &FilterState::new("BRÛ")).unwrap()), vec![2]);
    assert!(MenuFilter::from_state(&FilterState::new("éc")).matches(&record(1, "Éclair", "desserts")));
  }

  #[test]
  fn test_text_and_category_combined() {
    let store = store_with(&[
      record(1, "Lemon Cake", "desserts"),
      record(2, "Greek Salad", "starters"),
    ]);
    let filter = FilterState::new("a").with_category("starters");
    let result = evaluate(&store, &filter).unwrap();
    assert_eq!(ids(result), vec![2]);
  }

  #[test]
  fn test_multiple_categories() {
    let store = store_with(&[
      record(1, "Lemon Cake", "desserts"),
      record(2, "Greek Salad", "starters"),
      record(3, "Pasta", "mains"),
    ]);
    let filter = FilterState::default()
      .with_category("desserts")
      .with_category("mains");
    assert_eq!(ids(evaluate(&store, &filter).unwrap()), vec![1, 3]);
  }

  #[test]
  fn test_wildcards_match_literally() {
    let store = store_with(&[
      record(1, "100% Juice", "drinks"),
      record(2, "1000 Island", "starters"),
      record(3, "Snake_Case", "mains"),
    ]);
    assert_eq!(ids(evaluate(&store, &FilterState::new("0%")).unwrap()), vec![1]);
    assert_eq!(ids(evaluate(&store, &FilterState::new("_")).unwrap()), vec![3]);
  }

  #[test]
  fn test_quotes_are_bound_not_interpolated() {
    let store = store_with(&[record(1, "Chef's Special", "mains")]);
    let result = evaluate(&store, &FilterState::new("'; DROP TABLE menuitems; --")).unwrap();
    assert!(result.is_empty());
    assert_eq!(ids(evaluate(&store, &FilterState::new("chef's")).unwrap()), vec![1]);
  }

  #[test]
  fn test_unknown_category_yields_empty() {
    let store = store_with(&[record(1, "Pasta", "mains")]);
    let filter = FilterState::default().with_category("drinks");
    assert!(evaluate(&store, &filter).unwrap().is_empty());
  }

  #[test]
  fn test_matches_mirrors_sql() {
    let filter = MenuFilter::from_state(&FilterState::new("sal").with_category("starters"));
    assert!(filter.matches(&record(1, "Greek Salad", "starters")));
    assert!(!filter.matches(&record(2, "Greek Salad", "mains")));
    assert!(!filter.matches(&record(3, "Pasta", "starters")));
    assert!(MenuFilter::all().matches(&record(4, "Anything", "mains")));
  }

  #[test]
  fn test_to_sql_binds_every_value() {
    let filter = MenuFilter::from_state(&FilterState::new("A%").with_category("mains"));
    let (clause, values) = filter.to_sql();
    assert_eq!(clause.matches('?').count(), values.len());
    assert_eq!(values[0], "a%");
    assert_eq!(values[1], "mains");
  }
}
