//! Print the current aggregate totals from the counter store
//!
//! Recomputes the same snapshot the sentiment stage publishes, with
//! `total_reviews_processed` set to 0 since no invocation runs.
//!
//! Usage:
//!   review_totals [--banned]
//!
//! `--banned` prints the banned reviewers (NDJSON) instead.

use dotenv::dotenv;
use reviewflow::stages::compute_totals;
use reviewflow::store::{CounterStore, ScanFilter};
use reviewflow::{BanRecord, PipelineConfig, SqliteCounterStore};
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let banned_only = env::args().any(|arg| arg == "--banned");
    let config = PipelineConfig::from_env()?;
    let store = SqliteCounterStore::new(&config.db_path)?;

    if banned_only {
        for row in store.scan(&config.ban_table, ScanFilter::Flagged).await? {
            let record = BanRecord {
                reviewer_id: row.key,
                profane_count: row.count,
                banned: row.flag,
            };
            println!("{}", serde_json::to_string(&record)?);
        }
        return Ok(());
    }

    let totals = compute_totals(&store, &config.ban_table, &config.sentiment_table, 0).await?;
    println!("{}", serde_json::to_string_pretty(&totals)?);
    Ok(())
}
