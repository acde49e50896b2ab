//! Invocation driver
//!
//! Resolves each notified object to the stage watching its bucket, fetches
//! the object, runs the stage and writes the result to the stage's output
//! bucket under the same key. Every object in one trigger batch belongs to
//! the same invocation: a stage's tally spans all of its objects in the
//! batch and `finish` runs once per stage at the end.
//!
//! Any storage or counter-store failure aborts the invocation with a
//! [`PipelineError`] so the trigger source can redeliver. Objects already
//! written before the failure stay written.

pub mod event;
pub mod runtime;

pub use event::{ObjectRef, TriggerEvent};

use crate::config::{ConfigError, PipelineConfig};
use crate::lexicon::Lexicon;
use crate::object_store::{FsObjectStore, ObjectStore, StorageError};
use crate::sentiment::{self, SentimentClassifier, SentimentOracle};
use crate::stages::{ModerationStage, SentimentStage, Stage, StageError, TransformStage};
use crate::store::{CounterStore, SqliteCounterStore, StoreError};
use crate::tokenizer::Tokenizer;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;

#[derive(Debug)]
pub enum PipelineError {
    Config(ConfigError),
    /// Word list or sentiment lexicon could not be read
    Resource(std::io::Error),
    Store(StoreError),
    Storage { object: ObjectRef, source: StorageError },
    Stage { stage: &'static str, source: StageError },
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        PipelineError::Config(err)
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        PipelineError::Store(err)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Resource(err)
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Config(e) => write!(f, "{}", e),
            PipelineError::Resource(e) => write!(f, "Failed to load lexicon: {}", e),
            PipelineError::Store(e) => write!(f, "{}", e),
            PipelineError::Storage { object, source } => write!(f, "{} ({})", source, object),
            PipelineError::Stage { stage, source } => write!(f, "{} stage failed: {}", stage, source),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Which stage watches a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Transform,
    Moderation,
    Sentiment,
}

/// One processed object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedObject {
    pub stage: StageKind,
    pub source: ObjectRef,
    pub output: ObjectRef,
    pub records: usize,
    pub skipped: usize,
}

/// Response body returned to the trigger on success
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationResponse {
    pub status: &'static str,
}

impl InvocationResponse {
    pub const OK: InvocationResponse = InvocationResponse { status: "OK" };
}

/// What one invocation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationReport {
    pub processed: Vec<ProcessedObject>,
    /// Snapshot objects published by stage `finish` steps
    pub snapshots: Vec<ObjectRef>,
    /// Notified objects in buckets no stage watches
    pub ignored: Vec<ObjectRef>,
}

impl InvocationReport {
    pub fn response(&self) -> InvocationResponse {
        InvocationResponse::OK
    }

    pub fn records(&self) -> usize {
        self.processed.iter().map(|p| p.records).sum()
    }

    pub fn skipped(&self) -> usize {
        self.processed.iter().map(|p| p.skipped).sum()
    }

    /// Every object this invocation wrote, records first, then snapshots
    pub fn written(&self) -> impl Iterator<Item = &ObjectRef> {
        self.processed.iter().map(|p| &p.output).chain(self.snapshots.iter())
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    objects: Arc<dyn ObjectStore>,
    store: Arc<dyn CounterStore>,
    transform: TransformStage,
    moderation: ModerationStage,
    sentiment: SentimentStage,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        objects: Arc<dyn ObjectStore>,
        store: Arc<dyn CounterStore>,
        lexicon: Arc<Lexicon>,
        tokenizer: Arc<Tokenizer>,
        oracle: Arc<dyn SentimentOracle>,
    ) -> Self {
        let transform = TransformStage::new(tokenizer, config.cleaned_bucket.clone());
        let moderation = ModerationStage::new(
            lexicon,
            Arc::clone(&store),
            config.ban_table.clone(),
            config.presentiment_bucket.clone(),
            config.output_bucket.clone(),
        )
        .with_banned_users_snapshot(config.publish_banned_users);
        let sentiment = SentimentStage::new(
            SentimentClassifier::new(oracle),
            Arc::clone(&store),
            config.ban_table.clone(),
            config.sentiment_table.clone(),
            config.output_bucket.clone(),
        );

        Self {
            config,
            objects,
            store,
            transform,
            moderation,
            sentiment,
        }
    }

    /// Load word lists and open the filesystem object store and SQLite
    /// counter store named by the configuration.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let lexicon = Lexicon::load(config.bad_words_files.as_slice())?;
        let tokenizer = Tokenizer::load(config.stopwords_file.as_deref())?;
        let oracle = sentiment::load_oracle(config.sentiment_lexicon_file.as_deref())?;
        let store = SqliteCounterStore::new(&config.db_path)?;
        let objects = FsObjectStore::new(&config.data_dir);

        log::info!("✅ Pipeline resources loaded");
        log::info!("   ├─ Disallowed words: {}", lexicon.word_count());
        log::info!("   ├─ Objects: {} ({})", config.data_dir.display(), objects.backend_type());
        log::info!("   └─ Counters: {} ({})", config.db_path.display(), store.backend_type());

        Ok(Self::new(
            config,
            Arc::new(objects),
            Arc::new(store),
            Arc::new(lexicon),
            Arc::new(tokenizer),
            oracle,
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn counter_store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    pub fn moderation(&self) -> &ModerationStage {
        &self.moderation
    }

    pub fn sentiment(&self) -> &SentimentStage {
        &self.sentiment
    }

    /// Stage watching `bucket`, if any
    pub fn route(&self, bucket: &str) -> Option<StageKind> {
        if bucket == self.config.raw_bucket {
            Some(StageKind::Transform)
        } else if bucket == self.config.cleaned_bucket {
            Some(StageKind::Moderation)
        } else if bucket == self.config.presentiment_bucket {
            Some(StageKind::Sentiment)
        } else {
            None
        }
    }

    /// Run one invocation over every object named in `event`.
    pub async fn handle(&self, event: &TriggerEvent) -> Result<InvocationReport, PipelineError> {
        let mut report = InvocationReport::default();
        let mut transform = Vec::new();
        let mut moderation = Vec::new();
        let mut sentiment = Vec::new();

        for object in event.objects() {
            match self.route(&object.bucket) {
                Some(StageKind::Transform) => transform.push(object),
                Some(StageKind::Moderation) => moderation.push(object),
                Some(StageKind::Sentiment) => sentiment.push(object),
                None => {
                    log::warn!("⚠️  No stage watches bucket '{}', ignoring {}", object.bucket, object.key);
                    report.ignored.push(object);
                }
            }
        }

        if !transform.is_empty() {
            self.run_stage(StageKind::Transform, &self.transform, &transform, &mut report).await?;
        }
        if !moderation.is_empty() {
            self.run_stage(StageKind::Moderation, &self.moderation, &moderation, &mut report).await?;
        }
        if !sentiment.is_empty() {
            self.run_stage(StageKind::Sentiment, &self.sentiment, &sentiment, &mut report).await?;
        }

        log::info!(
            "✅ Invocation complete: {} objects, {} records, {} skipped lines",
            report.processed.len(),
            report.records(),
            report.skipped()
        );
        Ok(report)
    }

    async fn run_stage<S: Stage>(
        &self,
        kind: StageKind,
        stage: &S,
        sources: &[ObjectRef],
        report: &mut InvocationReport,
    ) -> Result<(), PipelineError> {
        let mut tally = S::Tally::default();

        for source in sources {
            let bytes = self.objects.get(&source.bucket, &source.key).await.map_err(|e| {
                PipelineError::Storage { object: source.clone(), source: e }
            })?;

            let body = String::from_utf8_lossy(&bytes);
            if let Cow::Owned(_) = body {
                log::warn!("⚠️  {} is not valid UTF-8, invalid bytes replaced", source);
            }

            let output = stage
                .process(&body, &mut tally)
                .await
                .map_err(|e| PipelineError::Stage { stage: stage.name(), source: e })?;

            let target = ObjectRef::new(stage.output_bucket(), &source.key);
            self.put(&target, output.body.as_bytes()).await?;

            log::debug!(
                "{} stage: {} -> {} ({} records, {} skipped)",
                stage.name(),
                source,
                target,
                output.records,
                output.skipped
            );
            report.processed.push(ProcessedObject {
                stage: kind,
                source: source.clone(),
                output: target,
                records: output.records,
                skipped: output.skipped,
            });
        }

        let writes = stage
            .finish(tally)
            .await
            .map_err(|e| PipelineError::Stage { stage: stage.name(), source: e })?;
        for write in writes {
            let target = ObjectRef::new(write.bucket, write.key);
            self.put(&target, &write.body).await?;
            report.snapshots.push(target);
        }

        Ok(())
    }

    async fn put(&self, target: &ObjectRef, body: &[u8]) -> Result<(), PipelineError> {
        self.objects
            .put(&target.bucket, &target.key, body)
            .await
            .map_err(|e| PipelineError::Storage { object: target.clone(), source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BANNED_USERS_KEY, TOTALS_KEY};
    use crate::record::ReviewRecord;
    use tempfile::{tempdir, TempDir};

    fn pipeline() -> (TempDir, Pipeline) {
        let dir = tempdir().unwrap();
        let config = PipelineConfig {
            data_dir: dir.path().join("buckets"),
            db_path: dir.path().join("counters.db"),
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::from_config(config).unwrap();
        (dir, pipeline)
    }

    #[test]
    fn test_route() {
        let (_dir, pipeline) = pipeline();
        assert_eq!(pipeline.route("reviews-bucket"), Some(StageKind::Transform));
        assert_eq!(pipeline.route("reviews-bucket-cleaned"), Some(StageKind::Moderation));
        assert_eq!(pipeline.route("reviews-bucket-presentiment"), Some(StageKind::Sentiment));
        assert_eq!(pipeline.route("reviews-bucket-output"), None);
    }

    #[tokio::test]
    async fn test_transform_writes_same_key() {
        let (_dir, pipeline) = pipeline();
        pipeline
            .objects()
            .put("reviews-bucket", "r1.json", br#"{"reviewerID":"A1","summary":"Great Value!"}"#)
            .await
            .unwrap();

        let report = pipeline
            .handle(&TriggerEvent::object_created("reviews-bucket", "r1.json"))
            .await
            .unwrap();

        assert_eq!(report.response(), InvocationResponse::OK);
        assert_eq!(report.processed[0].output, ObjectRef::new("reviews-bucket-cleaned", "r1.json"));
        assert!(report.snapshots.is_empty());

        let body = pipeline.objects().get("reviews-bucket-cleaned", "r1.json").await.unwrap();
        let record: ReviewRecord = serde_json::from_slice(&body).unwrap();
        assert_eq!(serde_json::to_value(&record.summary).unwrap(), serde_json::json!(["great", "value"]));
    }

    #[tokio::test]
    async fn test_missing_object_fails_invocation() {
        let (_dir, pipeline) = pipeline();
        let err = pipeline
            .handle(&TriggerEvent::object_created("reviews-bucket-cleaned", "nope.json"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Storage { source: StorageError::NotFound { .. }, .. }
        ));
    }

    #[tokio::test]
    async fn test_unwatched_bucket_ignored() {
        let (_dir, pipeline) = pipeline();
        let report = pipeline
            .handle(&TriggerEvent::object_created("somewhere-else", "x.json"))
            .await
            .unwrap();

        assert!(report.processed.is_empty());
        assert_eq!(report.ignored, vec![ObjectRef::new("somewhere-else", "x.json")]);
    }

    #[tokio::test]
    async fn test_batch_is_one_invocation() {
        let (_dir, pipeline) = pipeline();
        let objects = pipeline.objects();
        objects
            .put("reviews-bucket-presentiment", "a.json", br#"{"reviewerID":"A1","overall":5}"#)
            .await
            .unwrap();
        objects
            .put("reviews-bucket-presentiment", "b.json", b"{\"reviewerID\":\"A2\",\"overall\":1}\n{\"reviewerID\":\"A3\"}")
            .await
            .unwrap();

        let event = TriggerEvent::from_objects([
            ObjectRef::new("reviews-bucket-presentiment", "a.json"),
            ObjectRef::new("reviews-bucket-presentiment", "b.json"),
        ]);
        let report = pipeline.handle(&event).await.unwrap();

        assert_eq!(report.records(), 3);
        assert_eq!(report.snapshots, vec![ObjectRef::new("reviews-bucket-output", TOTALS_KEY)]);

        let totals: crate::record::AggregateTotals =
            serde_json::from_slice(&objects.get("reviews-bucket-output", TOTALS_KEY).await.unwrap()).unwrap();
        assert_eq!(totals.total_reviews_processed, 3);
        assert_eq!(totals.sentiment_counts.total(), 3);
    }

    #[tokio::test]
    async fn test_moderation_publishes_banned_users() {
        let (_dir, pipeline) = pipeline();
        pipeline
            .objects()
            .put("reviews-bucket-cleaned", "m.json", br#"{"reviewerID":"A1","reviewText":["fine"]}"#)
            .await
            .unwrap();

        let report = pipeline
            .handle(&TriggerEvent::object_created("reviews-bucket-cleaned", "m.json"))
            .await
            .unwrap();

        assert_eq!(report.snapshots, vec![ObjectRef::new("reviews-bucket-output", BANNED_USERS_KEY)]);
        let body = pipeline.objects().get("reviews-bucket-output", BANNED_USERS_KEY).await.unwrap();
        assert!(body.is_empty());
    }
}
