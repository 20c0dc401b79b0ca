//! Dataset statistics for `harvest stats`.

use std::path::Path;

use anyhow::{Context, Result};

use crate::store::{Store, StoreStats};

/// Entry point for `harvest stats`. Resume-aware: reports on the
/// `_analyzed` sibling when one exists.
pub fn run_stats(path: &Path, json: bool) -> Result<()> {
    let store = Store::open(path)
        .with_context(|| format!("failed to open dataset {}", path.display()))?;
    let stats = store.statistics();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_table(&stats);
    }
    Ok(())
}

pub(crate) fn print_table(stats: &StoreStats) {
    println!("repositories   {}", stats.total);
    println!("  rapid        {}", stats.rapid);
    println!("  slow         {}", stats.slow);
    println!("  unclassified {}", stats.unclassified);
    println!("analyzed       {}", stats.analyzed);
    println!("pending        {}", stats.pending);
    if let (Some(interval), Some(contributors)) =
        (stats.rapid_avg_interval, stats.rapid_avg_contributors)
    {
        println!(
            "rapid avg      {:.1} days between releases, {:.1} contributors",
            interval, contributors
        );
    }
    if let (Some(interval), Some(contributors)) =
        (stats.slow_avg_interval, stats.slow_avg_contributors)
    {
        println!(
            "slow avg       {:.1} days between releases, {:.1} contributors",
            interval, contributors
        );
    }
    println!("created        {}", stats.created_at.to_rfc3339());
    println!("last updated   {}", stats.last_updated_at.to_rfc3339());
}
