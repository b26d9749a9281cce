//! Content kinds and display languages.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

// ============================================================================
// Content kinds
// ============================================================================

/// Filterable attributes shared by every item-backed kind.
const ITEM_FILTERS: &[&str] = &["super_type", "type_name", "level"];

/// A logical collection of the catalog. Each kind maps to one store table per
/// generation and, when searchable, one search index per generation and language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
  Equipment,
  Consumables,
  Resources,
  QuestItems,
  Cosmetics,
  AllItems,
  Sets,
  Mounts,
  Recipes,
}

impl ContentKind {
  pub const ALL: [ContentKind; 9] = [
    ContentKind::Equipment,
    ContentKind::Consumables,
    ContentKind::Resources,
    ContentKind::QuestItems,
    ContentKind::Cosmetics,
    ContentKind::AllItems,
    ContentKind::Sets,
    ContentKind::Mounts,
    ContentKind::Recipes,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      ContentKind::Equipment => "equipment",
      ContentKind::Consumables => "consumables",
      ContentKind::Resources => "resources",
      ContentKind::QuestItems => "quest_items",
      ContentKind::Cosmetics => "cosmetics",
      ContentKind::AllItems => "all_items",
      ContentKind::Sets => "sets",
      ContentKind::Mounts => "mounts",
      ContentKind::Recipes => "recipes",
    }
  }

  /// Recipes live only in the store; every other kind gets search indices.
  pub fn is_searchable(self) -> bool {
    !matches!(self, ContentKind::Recipes)
  }

  /// Kinds that get search indices.
  pub fn searchable() -> impl Iterator<Item = ContentKind> {
    Self::ALL.into_iter().filter(|k| k.is_searchable())
  }

  /// Attributes the search service must allow filtering on.
  pub fn filterable_attributes(self) -> &'static [&'static str] {
    match self {
      ContentKind::Equipment
      | ContentKind::Consumables
      | ContentKind::Resources
      | ContentKind::QuestItems
      | ContentKind::Cosmetics
      | ContentKind::AllItems => ITEM_FILTERS,
      ContentKind::Sets => &["level"],
      ContentKind::Mounts => &["family_name"],
      ContentKind::Recipes => &[],
    }
  }
}

impl fmt::Display for ContentKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {what}: {value}")]
pub struct ParseError {
  what: &'static str,
  value: String,
}

impl FromStr for ContentKind {
  type Err = ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_lowercase().replace('-', "_");
    Self::ALL
      .into_iter()
      .find(|k| k.as_str() == normalized)
      .or(match normalized.as_str() {
        "items" => Some(ContentKind::AllItems),
        "quest" => Some(ContentKind::QuestItems),
        _ => None,
      })
      .ok_or_else(|| ParseError {
        what: "content kind",
        value: s.to_string(),
      })
  }
}

// ============================================================================
// Languages
// ============================================================================

/// Display language of localized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  En,
  Fr,
  De,
  Es,
  It,
  Pt,
}

impl Language {
  pub const ALL: [Language; 6] = [
    Language::En,
    Language::Fr,
    Language::De,
    Language::Es,
    Language::It,
    Language::Pt,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Language::En => "en",
      Language::Fr => "fr",
      Language::De => "de",
      Language::Es => "es",
      Language::It => "it",
      Language::Pt => "pt",
    }
  }
}

impl fmt::Display for Language {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Language {
  type Err = ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_lowercase();
    Self::ALL
      .into_iter()
      .find(|l| l.as_str() == normalized)
      .ok_or_else(|| ParseError {
        what: "language",
        value: s.to_string(),
      })
  }
}

/// Localized text keyed by language. Missing languages are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Translations(BTreeMap<Language, String>);

impl Translations {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, language: Language, text: impl Into<String>) -> Self {
    self.0.insert(language, text.into());
    self
  }

  /// Text in `language`, treating blank strings as missing.
  pub fn get(&self, language: Language) -> Option<&str> {
    self
      .0
      .get(&language)
      .map(String::as_str)
      .filter(|s| !s.trim().is_empty())
  }

  /// Languages that have non-blank text.
  pub fn languages(&self) -> impl Iterator<Item = Language> + '_ {
    self.0.iter().filter(|(_, v)| !v.trim().is_empty()).map(|(k, _)| *k)
  }

  pub fn is_empty(&self) -> bool {
    self.languages().next().is_none()
  }
}

impl<S: Into<String>> FromIterator<(Language, S)> for Translations {
  fn from_iter<I: IntoIterator<Item = (Language, S)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(l, s)| (l, s.into())).collect())
  }
}
