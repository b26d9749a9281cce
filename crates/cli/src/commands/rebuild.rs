//! Rebuild and status commands

use std::time::Duration;

use anyhow::{Context, Result, bail};
use encyclo::{
  Daemon,
  actor::message::{CoordinatorStatus, CycleOutcome, CycleReport, TriggerOutcome},
  ipc::{
    rebuild::{RebuildStatusParams, RebuildTriggerParams},
    system::StatusParams,
  },
};

/// Trigger a rebuild, optionally waiting for it to finish
pub async fn cmd_rebuild(wait: bool) -> Result<()> {
  let client = Daemon::connect_or_start()
    .await
    .context("Failed to connect to daemon")?;

  let before = client
    .call(RebuildStatusParams)
    .await
    .context("Failed to get rebuild status")?;
  let triggered = client
    .call(RebuildTriggerParams)
    .await
    .context("Failed to trigger rebuild")?;

  match triggered.outcome {
    TriggerOutcome::Queued => println!("Rebuild queued"),
    TriggerOutcome::Coalesced => println!("Rebuild already pending; merged with it"),
    TriggerOutcome::Stopped => bail!("Coordinator is not running"),
  }

  if !wait {
    return Ok(());
  }

  // A cycle running now finishes first; ours is the one after it
  let target = before.cycles_completed + if before.active.is_some() { 2 } else { 1 };
  loop {
    tokio::time::sleep(Duration::from_millis(500)).await;
    let status = client
      .call(RebuildStatusParams)
      .await
      .context("Failed to get rebuild status")?;
    if status.cycles_completed >= target {
      if let Some(report) = &status.last_cycle {
        println!();
        print_report(report);
        if matches!(report.outcome, CycleOutcome::Aborted { .. }) {
          std::process::exit(1);
        }
      }
      return Ok(());
    }
  }
}

/// Show daemon status, current generations and the last rebuild
pub async fn cmd_status(json: bool) -> Result<()> {
  let client = Daemon::connect_or_start()
    .await
    .context("Failed to connect to daemon")?;
  let status = client.call(StatusParams).await.context("Failed to get status")?;

  if json {
    println!("{}", serde_json::to_string_pretty(&status)?);
    return Ok(());
  }

  println!("encyclo Status");
  println!("==============\n");

  println!("--- Daemon ---");
  println!("Version:        {}", status.version);
  println!(
    "Mode:           {}",
    if status.foreground { "foreground" } else { "background" }
  );
  println!("Uptime:         {}", format_duration(status.uptime_seconds));
  println!("Requests:       {}", status.requests_total);
  println!("Search backend: {}", status.search_backend);

  println!("\n--- Generations ---");
  println!("Store:          {}", status.store_generation);
  println!("Search:         {}", status.search_generation);
  if let Some(note) = search_generation_note(&status.coordinator) {
    println!("                ({})", note);
  }

  print_coordinator(&status.coordinator);
  Ok(())
}

/// Why search serves a different generation than the store, if the last
/// cycle held it back.
fn search_generation_note(status: &CoordinatorStatus) -> Option<&'static str> {
  match status.last_cycle.as_ref().map(|report| &report.outcome) {
    Some(CycleOutcome::Degraded) => Some("search kept on previous generation after a degraded rebuild"),
    _ => None,
  }
}

fn print_coordinator(status: &CoordinatorStatus) {
  println!("\n--- Rebuilds ---");
  println!("Phase:          {:?}", status.phase);
  println!("Completed:      {}", status.cycles_completed);
  if let Some(active) = &status.active {
    println!(
      "Running:        {} ({}, since {})",
      active.id,
      active.reason.as_str(),
      active.started_at.with_timezone(&chrono::Local).format("%H:%M:%S")
    );
  }
  if let Some(report) = &status.last_cycle {
    println!("\nLast rebuild:");
    print_report(report);
  }
}

fn print_report(report: &CycleReport) {
  let outcome = match &report.outcome {
    CycleOutcome::Completed => "completed".to_string(),
    CycleOutcome::Degraded => "degraded".to_string(),
    CycleOutcome::Aborted { reason } => format!("aborted: {}", reason),
  };
  println!("  Cycle:        {}", report.id);
  println!("  Reason:       {}", report.reason.as_str());
  println!(
    "  Started:      {}",
    report
      .started_at
      .with_timezone(&chrono::Local)
      .format("%Y-%m-%d %H:%M:%S")
  );
  if let Some(ms) = report.elapsed_ms() {
    println!("  Duration:     {}", format_duration((ms / 1000).max(0) as u64));
  }
  println!("  Outcome:      {}", outcome);
  println!("  Records:      {}", report.records);
  println!("  Documents:    {}", report.documents);
  println!(
    "  Jobs:         {} submitted, {} failed",
    report.jobs_submitted, report.jobs_failed
  );
  if let Some(generation) = report.store_generation {
    println!("  Store now:    {}", generation);
  }
  if let Some(generation) = report.search_generation {
    println!("  Search now:   {}", generation);
  }
  if !report.failed_indices.is_empty() {
    println!("  Failed:       {}", report.failed_indices.join(", "));
  }
  if report.cleanup_failures > 0 {
    println!("  Cleanup:      {} steps failed", report.cleanup_failures);
  }
}

/// Format duration in human-readable form
fn format_duration(seconds: u64) -> String {
  if seconds < 60 {
    format!("{} seconds", seconds)
  } else if seconds < 3600 {
    let mins = seconds / 60;
    let secs = seconds % 60;
    if secs > 0 {
      format!("{} min {} sec", mins, secs)
    } else {
      format!("{} minutes", mins)
    }
  } else {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    if mins > 0 {
      format!("{} hr {} min", hours, mins)
    } else {
      format!("{} hours", hours)
    }
  }
}
