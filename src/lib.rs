//! # reviewflow
//!
//! Storage-triggered review moderation pipeline.
//!
//! ```text
//! raw bucket ──► Record Transform ──► cleaned bucket
//!                                         │
//!                                         ▼
//!                                    Moderation ──► presentiment bucket
//!                                    (ban_table)         │
//!                                                        ▼
//!                                      Sentiment & Aggregation ──► output bucket
//!                                      (sentiment_table)          + total_counts.json
//! ```
//!
//! Each stage is invoked independently when an object lands in the location it
//! watches. The only shared mutable state lives behind [`store::CounterStore`]:
//! per-reviewer ban counters and global sentiment totals.

pub mod config;
pub mod driver;
pub mod framing;
pub mod lexicon;
pub mod object_store;
pub mod record;
pub mod sentiment;
pub mod stages;
pub mod store;
pub mod tokenizer;

pub use config::PipelineConfig;
pub use driver::{Pipeline, TriggerEvent};
pub use record::{AggregateTotals, BanRecord, ReviewRecord, Sentiment};
pub use store::{CounterStore, SqliteCounterStore};
