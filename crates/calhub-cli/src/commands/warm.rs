//! `calhub warm`: refresh every configured calendar.

use std::fmt::Write;

use calhub_server::{HubConfig, RefreshOutcome, WarmReport, Warmer, warm_all};
use tracing::info;

use crate::commands::build_aggregator;
use crate::error::{CliError, CliResult};

pub async fn run(config: &HubConfig, watch: bool) -> CliResult<()> {
    let aggregator = build_aggregator(config)?;

    if watch {
        let warmer = Warmer::new(aggregator, config.warmer_config());
        let handle = warmer.handle();
        let task = tokio::spawn(warmer.run());

        tokio::signal::ctrl_c().await?;
        info!("Interrupted, stopping warmer");
        // The warmer may already have exited if the channel closed.
        let _ = handle.stop().await;
        let _ = task.await;
        let state = handle.state().await;
        println!("{} round(s) completed", state.rounds);
        return Ok(());
    }

    let total = aggregator.directory().slugs().len();
    let report = warm_all(&aggregator).await;
    print!("{}", render(&report));

    if report.is_success() {
        Ok(())
    } else {
        Err(CliError::WarmFailed {
            failed: report.failed.len(),
            total,
        })
    }
}

fn outcome_label(outcome: RefreshOutcome) -> &'static str {
    match outcome {
        RefreshOutcome::Inserted => "inserted",
        RefreshOutcome::Replaced => "replaced",
        RefreshOutcome::Unchanged => "unchanged",
    }
}

/// One line per calendar.
pub fn render(report: &WarmReport) -> String {
    let mut out = String::new();
    for (slug, outcome) in &report.refreshed {
        let _ = writeln!(out, "{slug}: {}", outcome_label(*outcome));
    }
    for slug in &report.skipped {
        let _ = writeln!(out, "{slug}: skipped (backing off)");
    }
    for (slug, error) in &report.failed {
        let _ = writeln!(out, "{slug}: failed: {error}");
    }
    out
}
