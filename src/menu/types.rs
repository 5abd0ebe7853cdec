use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One menu item as persisted in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuRecord {
  pub id: i64,
  pub name: String,
  pub price: f64,
  pub description: String,
  /// Image file name as published by the remote menu
  pub image: String,
  pub category: String,
}

impl MenuRecord {
  /// Price formatted for display, e.g. `$12.99`.
  pub fn display_price(&self) -> String {
    format!("${:.2}", self.price)
  }

  /// Render the image reference through a template containing `{image}`.
  pub fn image_url(&self, template: &str) -> String {
    template.replace("{image}", &self.image)
  }
}

/// A named group of records sharing a category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
  pub name: String,
  pub items: Vec<MenuRecord>,
}

/// Search text plus the set of enabled category toggles.
///
/// An empty `active_categories` set matches every category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
  pub text_query: String,
  pub active_categories: BTreeSet<String>,
}

impl FilterState {
  pub fn new(text_query: impl Into<String>) -> Self {
    Self {
      text_query: text_query.into(),
      active_categories: BTreeSet::new(),
    }
  }

  pub fn with_category(mut self, category: impl Into<String>) -> Self {
    self.active_categories.insert(category.into());
    self
  }

  /// Build active categories from a list of toggles and their on/off state.
  /// Toggles without a matching selection count as off.
  pub fn from_toggles(text_query: &str, categories: &[String], selections: &[bool]) -> Self {
    let active_categories = categories
      .iter()
      .zip(selections.iter().chain(std::iter::repeat(&false)))
      .filter(|(_, on)| **on)
      .map(|(c, _)| c.clone())
      .collect();

    Self {
      text_query: text_query.to_string(),
      active_categories,
    }
  }

  /// Flip a single category toggle.
  pub fn toggle_category(&mut self, category: &str) {
    if !self.active_categories.remove(category) {
      self.active_categories.insert(category.to_string());
    }
  }

  pub fn matches_all_categories(&self) -> bool {
    self.active_categories.is_empty()
  }
}
