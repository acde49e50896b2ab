//! Pipeline stages
//!
//! Each stage turns one object body into the body written to its output
//! location, accumulating a per-invocation tally on the way. After every
//! object in the invocation has been processed, `finish` runs once with the
//! tally and returns any snapshot objects to publish.
//!
//! | Stage | Input form | Shared state |
//! |---|---|---|
//! | [`TransformStage`] | raw strings | none |
//! | [`ModerationStage`] | token lists | ban counters |
//! | [`SentimentStage`] | token lists | sentiment counters (read: ban counters) |

pub mod aggregation;
pub mod moderation;
pub mod transform;

pub use aggregation::{compute_totals, SentimentStage, SentimentTally};
pub use moderation::{ModerationStage, ModerationTally, ScannedField};
pub use transform::TransformStage;

use crate::store::StoreError;
use async_trait::async_trait;

#[derive(Debug)]
pub enum StageError {
    /// Counter store unavailable or failed; the invocation must not succeed
    Store(StoreError),
    Serialization(serde_json::Error),
}

impl From<StoreError> for StageError {
    fn from(err: StoreError) -> Self {
        StageError::Store(err)
    }
}

impl From<serde_json::Error> for StageError {
    fn from(err: serde_json::Error) -> Self {
        StageError::Serialization(err)
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageError::Store(e) => write!(f, "{}", e),
            StageError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for StageError {}

/// Output of processing one object
#[derive(Debug, Clone)]
pub struct StageOutput {
    /// NDJSON body for the stage's output location
    pub body: String,
    /// Records parsed and written
    pub records: usize,
    /// Malformed lines dropped
    pub skipped: usize,
}

/// Snapshot object a stage publishes after an invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectWrite {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait Stage: Send + Sync {
    /// Per-invocation accumulator
    type Tally: Default + Send;

    fn name(&self) -> &'static str;

    /// Location the processed object is written to, under the same key
    fn output_bucket(&self) -> &str;

    async fn process(&self, body: &str, tally: &mut Self::Tally) -> Result<StageOutput, StageError>;

    async fn finish(&self, tally: Self::Tally) -> Result<Vec<ObjectWrite>, StageError>;
}
