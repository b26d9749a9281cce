//! Catalog read commands: get, scan, search

use anyhow::{Context, Result, bail};
use encyclo::{
  Daemon,
  domain::{
    content::{ContentKind, Language},
    record::{EntityId, Record},
  },
  ipc::catalog::{GetParams, ScanParams, SearchParams},
  search::{Filter, FilterValue, SearchDocument},
};

/// Show one record from the current generation
pub async fn cmd_get(kind: ContentKind, id: EntityId, json: bool) -> Result<()> {
  let client = Daemon::connect_or_start()
    .await
    .context("Failed to connect to daemon")?;

  let result = client.call(GetParams { kind, id }).await?;

  if json {
    println!("{}", serde_json::to_string_pretty(&result)?);
    return Ok(());
  }

  println!("{} #{} (generation {})", kind, id, result.generation);
  println!("{}", "-".repeat(40));
  print_record(&result.record);
  Ok(())
}

/// List records of one kind in id order
pub async fn cmd_scan(kind: ContentKind, offset: usize, limit: usize, json: bool) -> Result<()> {
  let client = Daemon::connect_or_start()
    .await
    .context("Failed to connect to daemon")?;

  let result = client.call(ScanParams { kind, offset, limit }).await?;

  if json {
    println!("{}", serde_json::to_string_pretty(&result)?);
    return Ok(());
  }

  if result.records.is_empty() {
    println!("No {} records at offset {} ({} total)", kind, offset, result.total);
    return Ok(());
  }

  println!(
    "{} {}-{} of {} (generation {}):\n",
    kind,
    result.offset + 1,
    result.offset + result.records.len(),
    result.total,
    result.generation
  );
  for record in &result.records {
    println!("  {:>8}  {}", record.id(), display_name(record));
  }
  Ok(())
}

/// Full-text search over the current generation
pub async fn cmd_search(
  kind: ContentKind,
  query: &str,
  language: Language,
  limit: usize,
  filters: &[String],
  json: bool,
) -> Result<()> {
  let filters = filters
    .iter()
    .map(|raw| parse_filter(raw))
    .collect::<Result<Vec<_>>>()?;

  let client = Daemon::connect_or_start()
    .await
    .context("Failed to connect to daemon")?;

  let result = client
    .call(SearchParams {
      kind,
      language,
      query: query.to_string(),
      filters,
      limit,
    })
    .await?;

  if json {
    println!("{}", serde_json::to_string_pretty(&result)?);
    return Ok(());
  }

  if result.hits.is_empty() {
    println!("No {} matches for \"{}\" ({})", kind, query, language);
    return Ok(());
  }

  println!(
    "Found {} {} matches ({}, generation {}):\n",
    result.hits.len(),
    kind,
    language,
    result.generation
  );
  for hit in &result.hits {
    print_hit(hit);
  }
  Ok(())
}

/// Parse `attr=value` or `attr=min..max` into a search filter.
fn parse_filter(raw: &str) -> Result<Filter> {
  let Some((attribute, value)) = raw.split_once('=') else {
    bail!("Invalid filter '{}': expected ATTR=VALUE", raw);
  };
  let attribute = attribute.trim();
  if attribute.is_empty() {
    bail!("Invalid filter '{}': missing attribute", raw);
  }

  if let Some((min, max)) = value.split_once("..") {
    let bound = |s: &str| -> Result<Option<i64>> {
      let s = s.trim();
      if s.is_empty() {
        return Ok(None);
      }
      s.parse::<i64>()
        .map(Some)
        .with_context(|| format!("Invalid range bound '{}' in filter '{}'", s, raw))
    };
    return Ok(Filter::Range {
      attribute: attribute.to_string(),
      min: bound(min)?,
      max: bound(max)?,
    });
  }

  Ok(Filter::Eq {
    attribute: attribute.to_string(),
    value: FilterValue::parse(value.trim()),
  })
}

fn display_name(record: &Record) -> String {
  if let Record::Recipe(recipe) = record {
    return format!("recipe for item {}", recipe.result_id);
  }
  Language::ALL
    .iter()
    .find_map(|lang| record.name(*lang))
    .unwrap_or("(unnamed)")
    .to_string()
}

fn print_record(record: &Record) {
  match record {
    Record::Item(item) => {
      print_names(record);
      println!("Category:  {}", item.category.as_str());
      if let Some(type_name) = item.type_name.get(Language::En) {
        println!("Type:      {}", type_name);
      }
      println!("Level:     {}", item.level);
      if let Some(recipe_id) = item.recipe_id {
        println!("Recipe:    {}", recipe_id);
      }
      if let Some(url) = &item.image_url {
        println!("Image:     {}", url);
      }
      if let Some(description) = item.description.get(Language::En) {
        println!("\n{}", description);
      }
    }
    Record::Set(set) => {
      print_names(record);
      println!("Level:     {}", set.level);
      let ids: Vec<String> = set.item_ids.iter().map(|id| id.to_string()).collect();
      println!("Items:     {}", ids.join(", "));
    }
    Record::Mount(mount) => {
      print_names(record);
      if let Some(family) = mount.family_name.get(Language::En) {
        println!("Family:    {}", family);
      }
      if let Some(url) = &mount.image_url {
        println!("Image:     {}", url);
      }
    }
    Record::Recipe(recipe) => {
      println!("Result:    {}", recipe.result_id);
      if let Some(job_id) = recipe.job_id {
        println!("Job:       {}", job_id);
      }
      println!("Level:     {}", recipe.level);
      println!("Inputs:");
      for entry in &recipe.entries {
        println!("  {} x {}", entry.quantity, entry.item_id);
      }
    }
  }
}

fn print_names(record: &Record) {
  for lang in &Language::ALL {
    if let Some(name) = record.name(*lang) {
      println!("Name [{}]: {}", lang, name);
    }
  }
}

fn print_hit(hit: &SearchDocument) {
  let mut details = Vec::new();
  if let Some(type_name) = &hit.type_name {
    details.push(type_name.clone());
  }
  if let Some(level) = hit.level {
    details.push(format!("lvl {}", level));
  }
  if let Some(family) = &hit.family_name {
    details.push(family.clone());
  }

  if details.is_empty() {
    println!("  {:>8}  {}", hit.id, hit.name);
  } else {
    println!("  {:>8}  {} ({})", hit.id, hit.name, details.join(", "));
  }
}
