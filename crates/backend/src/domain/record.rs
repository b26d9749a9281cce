//! Typed catalog records and the per-cycle record batch.
//!
//! Records arrive already parsed and language-annotated from the ingestion
//! collaborator. They are immutable once ingested; the store shares them
//! between generations' snapshots behind `Arc`.

use std::{collections::BTreeSet, sync::Arc};

use serde::{Deserialize, Serialize};

use super::content::{ContentKind, Language, Translations};

/// Integer entity id (ankama id, or the result item id for recipes).
pub type EntityId = i64;

// ============================================================================
// Items
// ============================================================================

/// Top-level item category. Decides which per-category table an item lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
  Equipment,
  Consumable,
  Resource,
  QuestItem,
  Cosmetic,
}

impl ItemCategory {
  pub fn content_kind(self) -> ContentKind {
    match self {
      ItemCategory::Equipment => ContentKind::Equipment,
      ItemCategory::Consumable => ContentKind::Consumables,
      ItemCategory::Resource => ContentKind::Resources,
      ItemCategory::QuestItem => ContentKind::QuestItems,
      ItemCategory::Cosmetic => ContentKind::Cosmetics,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      ItemCategory::Equipment => "equipment",
      ItemCategory::Consumable => "consumable",
      ItemCategory::Resource => "resource",
      ItemCategory::QuestItem => "quest_item",
      ItemCategory::Cosmetic => "cosmetic",
    }
  }
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
  pub id: EntityId,
  pub category: ItemCategory,
  pub name: Translations,
  #[serde(default)]
  pub description: Translations,
  /// Item type within the category ("Sword", "Hat", ...)
  #[serde(default)]
  pub type_name: Translations,
  #[serde(default)]
  pub level: u32,
  pub image_url: Option<String>,
  /// Recipe producing this item, if any
  pub recipe_id: Option<EntityId>,
}

// ============================================================================
// Sets, mounts, recipes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentSet {
  pub id: EntityId,
  pub name: Translations,
  #[serde(default)]
  pub level: u32,
  #[serde(default)]
  pub item_ids: Vec<EntityId>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mount {
  pub id: EntityId,
  pub name: Translations,
  #[serde(default)]
  pub family_name: Translations,
  pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeEntry {
  pub item_id: EntityId,
  pub quantity: u32,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
  /// The crafted item's id; recipes are keyed by it
  pub result_id: EntityId,
  pub job_id: Option<EntityId>,
  #[serde(default)]
  pub level: u32,
  #[serde(default)]
  pub entries: Vec<RecipeEntry>,
}

// ============================================================================
// Stored record
// ============================================================================

/// A record as held by a store table. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Record {
  Item(Arc<Item>),
  Set(Arc<EquipmentSet>),
  Mount(Arc<Mount>),
  Recipe(Arc<Recipe>),
}

impl Record {
  /// The table key of this record.
  pub fn id(&self) -> EntityId {
    match self {
      Record::Item(item) => item.id,
      Record::Set(set) => set.id,
      Record::Mount(mount) => mount.id,
      Record::Recipe(recipe) => recipe.result_id,
    }
  }

  /// Name in `language`, if the record has one.
  pub fn name(&self, language: Language) -> Option<&str> {
    match self {
      Record::Item(item) => item.name.get(language),
      Record::Set(set) => set.name.get(language),
      Record::Mount(mount) => mount.name.get(language),
      Record::Recipe(_) => None,
    }
  }

  pub fn as_item(&self) -> Option<&Item> {
    match self {
      Record::Item(item) => Some(item),
      _ => None,
    }
  }
}

// ============================================================================
// Batch
// ============================================================================

/// Everything one rebuild cycle ingests. Created once per cycle and dropped
/// after it has been written into the store and the search indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordBatch {
  pub items: Vec<Item>,
  pub sets: Vec<EquipmentSet>,
  pub mounts: Vec<Mount>,
  pub recipes: Vec<Recipe>,
}

impl RecordBatch {
  pub fn len(&self) -> usize {
    self.items.len() + self.sets.len() + self.mounts.len() + self.recipes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Store rows this batch produces, as `(kind, record)` pairs.
  ///
  /// Items appear twice: once in their category table and once in `all_items`.
  pub fn table_rows(&self) -> impl Iterator<Item = (ContentKind, Record)> + '_ {
    let items = self.items.iter().flat_map(|item| {
      let record = Record::Item(Arc::new(item.clone()));
      [
        (item.category.content_kind(), record.clone()),
        (ContentKind::AllItems, record),
      ]
    });
    let sets = self
      .sets
      .iter()
      .map(|s| (ContentKind::Sets, Record::Set(Arc::new(s.clone()))));
    let mounts = self
      .mounts
      .iter()
      .map(|m| (ContentKind::Mounts, Record::Mount(Arc::new(m.clone()))));
    let recipes = self
      .recipes
      .iter()
      .map(|r| (ContentKind::Recipes, Record::Recipe(Arc::new(r.clone()))));

    items.chain(sets).chain(mounts).chain(recipes)
  }

  /// Languages with at least one named record of `kind`.
  pub fn languages(&self, kind: ContentKind) -> BTreeSet<Language> {
    let names: Box<dyn Iterator<Item = &Translations> + '_> = match kind {
      ContentKind::AllItems => Box::new(self.items.iter().map(|i| &i.name)),
      ContentKind::Sets => Box::new(self.sets.iter().map(|s| &s.name)),
      ContentKind::Mounts => Box::new(self.mounts.iter().map(|m| &m.name)),
      ContentKind::Recipes => Box::new(std::iter::empty()),
      category => Box::new(
        self
          .items
          .iter()
          .filter(move |i| i.category.content_kind() == category)
          .map(|i| &i.name),
      ),
    };
    names.flat_map(|n| n.languages()).collect()
  }
}
