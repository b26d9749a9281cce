//! Projection of catalog records into per-language search documents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::FilterValue;
use crate::domain::{
  content::{ContentKind, Language},
  record::{EntityId, Record, RecordBatch},
};

/// One record rendered in one language. Also the shape of a search hit.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDocument {
  pub id: EntityId,
  pub name: String,
  pub description: Option<String>,
  /// Item category ("equipment", "resource", ...)
  pub super_type: Option<String>,
  pub type_name: Option<String>,
  pub level: Option<u32>,
  pub family_name: Option<String>,
  pub image_url: Option<String>,
}

impl SearchDocument {
  /// Project `record` into `language`. Records without a name in that
  /// language produce no document; recipes never do.
  pub fn project(record: &Record, language: Language) -> Option<Self> {
    let name = record.name(language)?.to_string();
    let mut doc = Self {
      id: record.id(),
      name,
      description: None,
      super_type: None,
      type_name: None,
      level: None,
      family_name: None,
      image_url: None,
    };

    match record {
      Record::Item(item) => {
        doc.description = item.description.get(language).map(str::to_string);
        doc.super_type = Some(item.category.as_str().to_string());
        doc.type_name = item.type_name.get(language).map(str::to_string);
        doc.level = Some(item.level);
        doc.image_url = item.image_url.clone();
      }
      Record::Set(set) => {
        doc.level = Some(set.level);
      }
      Record::Mount(mount) => {
        doc.family_name = mount.family_name.get(language).map(str::to_string);
        doc.image_url = mount.image_url.clone();
      }
      Record::Recipe(_) => return None,
    }

    Some(doc)
  }

  /// Value of a filterable attribute, if set on this document.
  pub fn attribute(&self, attribute: &str) -> Option<FilterValue> {
    match attribute {
      "id" => Some(FilterValue::Number(self.id)),
      "level" => self.level.map(|l| FilterValue::Number(i64::from(l))),
      "super_type" => self.super_type.clone().map(FilterValue::Text),
      "type_name" => self.type_name.clone().map(FilterValue::Text),
      "family_name" => self.family_name.clone().map(FilterValue::Text),
      _ => None,
    }
  }
}

/// Documents grouped by the index they belong in.
pub type DocumentPlan = BTreeMap<(ContentKind, Language), Vec<SearchDocument>>;

/// Group a batch's documents by `(kind, language)`.
///
/// Pairs with no documents are absent, so no index is created for them.
pub fn plan_documents(batch: &RecordBatch) -> DocumentPlan {
  let mut plan = DocumentPlan::new();
  for (kind, record) in batch.table_rows().filter(|(k, _)| k.is_searchable()) {
    for language in Language::ALL {
      if let Some(doc) = SearchDocument::project(&record, language) {
        plan.entry((kind, language)).or_default().push(doc);
      }
    }
  }
  plan
}
