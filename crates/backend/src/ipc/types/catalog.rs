//! Catalog IPC types - record lookups, scans and full-text search
use serde::{Deserialize, Serialize};

use crate::{
  domain::{
    content::{ContentKind, Language},
    generation::Generation,
    record::{EntityId, Record},
  },
  search::{DEFAULT_LIMIT, Filter, SearchDocument, SearchQuery},
};

/// Page size of a scan when the caller does not pick one.
pub const DEFAULT_SCAN_LIMIT: usize = 50;

// ============================================================================
// Request/Response enums
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "params")]
pub enum CatalogRequest {
  Get(GetParams),
  Scan(ScanParams),
  Search(SearchParams),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "data")]
pub enum CatalogResponse {
  Get(GetResult),
  Scan(ScanResult),
  Search(SearchResult),
}

// ============================================================================
// Request param types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetParams {
  pub kind: ContentKind,
  pub id: EntityId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanParams {
  pub kind: ContentKind,
  #[serde(default)]
  pub offset: usize,
  #[serde(default = "default_scan_limit")]
  pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
  pub kind: ContentKind,
  #[serde(default = "default_language")]
  pub language: Language,
  #[serde(default)]
  pub query: String,
  #[serde(default)]
  pub filters: Vec<Filter>,
  #[serde(default = "default_search_limit")]
  pub limit: usize,
}

impl SearchParams {
  pub fn to_query(&self) -> SearchQuery {
    SearchQuery {
      query: self.query.clone(),
      filters: self.filters.clone(),
      limit: self.limit,
    }
  }
}

fn default_scan_limit() -> usize {
  DEFAULT_SCAN_LIMIT
}

fn default_search_limit() -> usize {
  DEFAULT_LIMIT
}

fn default_language() -> Language {
  Language::En
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResult {
  /// Store generation the record was read from
  pub generation: Generation,
  pub record: Record,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
  pub generation: Generation,
  /// Rows in the table, regardless of paging
  pub total: usize,
  pub offset: usize,
  pub records: Vec<Record>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
  /// Search generation current when the query ran
  pub generation: Generation,
  pub hits: Vec<SearchDocument>,
}

// ============================================================================
// IpcRequest implementations
// ============================================================================

use crate::{
  impl_ipc_request,
  ipc::{RequestData, ResponseData},
};

impl_ipc_request!(
  GetParams => GetResult,
  ResponseData::Catalog(CatalogResponse::Get(v)) => v,
  v => RequestData::Catalog(CatalogRequest::Get(v)),
  v => ResponseData::Catalog(CatalogResponse::Get(v))
);
impl_ipc_request!(
  ScanParams => ScanResult,
  ResponseData::Catalog(CatalogResponse::Scan(v)) => v,
  v => RequestData::Catalog(CatalogRequest::Scan(v)),
  v => ResponseData::Catalog(CatalogResponse::Scan(v))
);
impl_ipc_request!(
  SearchParams => SearchResult,
  ResponseData::Catalog(CatalogResponse::Search(v)) => v,
  v => RequestData::Catalog(CatalogRequest::Search(v)),
  v => ResponseData::Catalog(CatalogResponse::Search(v))
);
