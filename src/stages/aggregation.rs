//! Sentiment & aggregation stage
//!
//! Records are classified one by one into a local tally. Shared state is
//! only touched once per invocation, in `finish`: one atomic add per label
//! (always three, zero deltas included) followed by a fresh recomputation
//! of the aggregate snapshot from the authoritative counters.

use super::{ObjectWrite, Stage, StageError, StageOutput};
use crate::config::TOTALS_KEY;
use crate::framing::{decode_batch, encode_batch};
use crate::record::{AggregateTotals, ReviewRecord, Sentiment, SentimentCounts};
use crate::sentiment::SentimentClassifier;
use crate::store::{CounterStore, ScanFilter, StoreError};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Per-invocation label counts, merged into the store once
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SentimentTally {
    pub counts: SentimentCounts,
    /// Records classified in this invocation
    pub records: u64,
}

impl SentimentTally {
    pub fn record(&mut self, label: Sentiment) {
        self.counts.add(label, 1);
        self.records += 1;
    }
}

pub struct SentimentStage {
    classifier: SentimentClassifier,
    store: Arc<dyn CounterStore>,
    ban_table: String,
    sentiment_table: String,
    output_bucket: String,
}

impl SentimentStage {
    pub fn new(
        classifier: SentimentClassifier,
        store: Arc<dyn CounterStore>,
        ban_table: impl Into<String>,
        sentiment_table: impl Into<String>,
        output_bucket: impl Into<String>,
    ) -> Self {
        Self {
            classifier,
            store,
            ban_table: ban_table.into(),
            sentiment_table: sentiment_table.into(),
            output_bucket: output_bucket.into(),
        }
    }

    /// Classify one record and write its `sentiment` field
    pub fn annotate(&self, record: &mut ReviewRecord) -> Sentiment {
        let text = record.scoring_text();
        let label = self.classifier.classify(&text, record.rating());
        log::debug!("{} -> {} ({:?})", record.reviewer_id, label.as_str(), text);
        record.sentiment = Some(label);
        label
    }

    /// Add the local tally to the shared counters: one increment per label.
    pub async fn merge_tally(&self, tally: &SentimentTally) -> Result<SentimentCounts, StoreError> {
        let mut merged = SentimentCounts::default();
        for label in Sentiment::ALL {
            let row = self
                .store
                .increment(&self.sentiment_table, label.as_str(), tally.counts.get(label))
                .await?;
            merged.add(label, row.count);
        }
        Ok(merged)
    }

    pub async fn totals(&self, processed: u64) -> Result<AggregateTotals, StoreError> {
        compute_totals(self.store.as_ref(), &self.ban_table, &self.sentiment_table, processed).await
    }
}

/// Recompute the aggregate snapshot from the counter store.
///
/// `processed` is the record count of the current invocation only.
pub async fn compute_totals(
    store: &dyn CounterStore,
    ban_table: &str,
    sentiment_table: &str,
    processed: u64,
) -> Result<AggregateTotals, StoreError> {
    let ban_rows = store.scan(ban_table, ScanFilter::All).await?;
    let total_profane_reviews = ban_rows.iter().map(|row| row.count).sum();
    let total_banned_users = ban_rows.iter().filter(|row| row.flag).count() as i64;

    let mut sentiment_counts = SentimentCounts::default();
    for row in store.scan(sentiment_table, ScanFilter::All).await? {
        match row.key.parse::<Sentiment>() {
            Ok(label) => sentiment_counts.add(label, row.count),
            Err(_) => log::warn!("⚠️  Ignoring unknown sentiment label '{}' in {}", row.key, sentiment_table),
        }
    }

    Ok(AggregateTotals {
        total_profane_reviews,
        total_banned_users,
        sentiment_counts,
        total_reviews_processed: processed,
    })
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

#[async_trait]
impl Stage for SentimentStage {
    type Tally = SentimentTally;

    fn name(&self) -> &'static str {
        "sentiment"
    }

    fn output_bucket(&self) -> &str {
        &self.output_bucket
    }

    async fn process(&self, body: &str, tally: &mut SentimentTally) -> Result<StageOutput, StageError> {
        let mut batch = decode_batch(body);
        for record in &mut batch.records {
            let label = self.annotate(record);
            tally.record(label);
        }

        Ok(StageOutput {
            body: encode_batch(&batch.records)?,
            records: batch.records.len(),
            skipped: batch.skipped,
        })
    }

    async fn finish(&self, tally: SentimentTally) -> Result<Vec<ObjectWrite>, StageError> {
        let merged = self.merge_tally(&tally).await?;
        let totals = self.totals(tally.records).await?;

        log::info!(
            "📊 Sentiment: {} records (+{} pos, +{} neu, +{} neg) | totals pos={} neu={} neg={} | profane={} banned={}",
            tally.records,
            tally.counts.positive,
            tally.counts.neutral,
            tally.counts.negative,
            merged.positive,
            merged.neutral,
            merged.negative,
            totals.total_profane_reviews,
            totals.total_banned_users
        );

        Ok(vec![ObjectWrite {
            bucket: self.output_bucket.clone(),
            key: TOTALS_KEY.to_string(),
            body: to_pretty_json(&totals)?,
        }])
    }
}
