//! Moderation stage: profanity flagging and reviewer ban enforcement
//!
//! For each record the scanned fields are checked in a fixed order against
//! the lexicon. The first offending field flags the record and triggers
//! exactly one ban-counter increment for its author; later fields are not
//! checked, so a record is never counted twice.
//!
//! Ban update per flagged record (one counter-store call):
//! 1. add 1 to the author's `profane_count`, creating the row unbanned
//! 2. if the new count exceeds [`BAN_THRESHOLD`] and the author is not yet
//!    banned, set `banned = true`
//!
//! The SQLite store runs both steps in one transaction. Ban flags are never
//! cleared and counts never decrease.

use super::{ObjectWrite, Stage, StageError, StageOutput};
use crate::config::{BANNED_USERS_KEY, BAN_THRESHOLD};
use crate::framing::{decode_batch, encode_batch};
use crate::lexicon::Lexicon;
use crate::record::{BanRecord, ReviewRecord, TextField};
use crate::store::{CounterStore, FlagOutcome, ScanFilter};
use async_trait::async_trait;
use std::sync::Arc;

/// Text fields checked for profanity, in scan order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannedField {
    ReviewText,
    Summary,
}

impl ScannedField {
    pub const SCAN_ORDER: [ScannedField; 2] = [ScannedField::ReviewText, ScannedField::Summary];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScannedField::ReviewText => "reviewText",
            ScannedField::Summary => "summary",
        }
    }

    fn extract<'r>(&self, record: &'r ReviewRecord) -> Option<&'r TextField> {
        match self {
            ScannedField::ReviewText => record.review_text.as_ref(),
            ScannedField::Summary => record.summary.as_ref(),
        }
    }
}

/// Per-invocation moderation counts
#[derive(Debug, Default)]
pub struct ModerationTally {
    pub records: usize,
    pub flagged: usize,
    /// Reviewers whose ban flag was set during this invocation
    pub newly_banned: Vec<String>,
}

pub struct ModerationStage {
    lexicon: Arc<Lexicon>,
    store: Arc<dyn CounterStore>,
    ban_table: String,
    output_bucket: String,
    report_bucket: String,
    publish_banned_users: bool,
}

impl ModerationStage {
    pub fn new(
        lexicon: Arc<Lexicon>,
        store: Arc<dyn CounterStore>,
        ban_table: impl Into<String>,
        output_bucket: impl Into<String>,
        report_bucket: impl Into<String>,
    ) -> Self {
        Self {
            lexicon,
            store,
            ban_table: ban_table.into(),
            output_bucket: output_bucket.into(),
            report_bucket: report_bucket.into(),
            publish_banned_users: true,
        }
    }

    /// Enable or disable the `banned-users.json` snapshot
    pub fn with_banned_users_snapshot(mut self, enabled: bool) -> Self {
        self.publish_banned_users = enabled;
        self
    }

    /// First scanned field containing a disallowed token, if any.
    pub fn find_profanity(&self, record: &ReviewRecord) -> Option<ScannedField> {
        ScannedField::SCAN_ORDER.into_iter().find(|field| {
            field
                .extract(record)
                .map(|text| self.lexicon.contains_any(&text.words()))
                .unwrap_or(false)
        })
    }

    /// Annotate `hasProfanity` and apply the ban update for flagged records.
    ///
    /// Returns the author's ban state after the update, or `None` for clean
    /// records (which never touch shared state).
    pub async fn moderate(&self, record: &mut ReviewRecord) -> Result<Option<FlagOutcome>, StageError> {
        let Some(field) = self.find_profanity(record) else {
            record.has_profanity = Some(false);
            return Ok(None);
        };

        record.has_profanity = Some(true);
        let outcome = self
            .store
            .increment_and_flag_above(&self.ban_table, &record.reviewer_id, 1, BAN_THRESHOLD)
            .await?;

        log::debug!(
            "Flagged {} in {} (profane_count={})",
            record.reviewer_id,
            field.as_str(),
            outcome.row.count
        );
        if outcome.newly_flagged {
            log::info!(
                "🚫 Banning reviewer {} for excessive profanity ({} flagged reviews)",
                record.reviewer_id,
                outcome.row.count
            );
        }

        Ok(Some(outcome))
    }

    /// Current ban state of one reviewer
    pub async fn ban_record(&self, reviewer_id: &str) -> Result<Option<BanRecord>, StageError> {
        let row = self.store.get(&self.ban_table, reviewer_id).await?;
        Ok(row.map(|row| BanRecord {
            reviewer_id: row.key,
            profane_count: row.count,
            banned: row.flag,
        }))
    }

    /// All banned reviewers, ordered by id
    pub async fn banned_reviewers(&self) -> Result<Vec<BanRecord>, StageError> {
        let rows = self.store.scan(&self.ban_table, ScanFilter::Flagged).await?;
        Ok(rows
            .into_iter()
            .map(|row| BanRecord {
                reviewer_id: row.key,
                profane_count: row.count,
                banned: row.flag,
            })
            .collect())
    }
}

#[async_trait]
impl Stage for ModerationStage {
    type Tally = ModerationTally;

    fn name(&self) -> &'static str {
        "moderation"
    }

    fn output_bucket(&self) -> &str {
        &self.output_bucket
    }

    async fn process(&self, body: &str, tally: &mut ModerationTally) -> Result<StageOutput, StageError> {
        let mut batch = decode_batch(body);

        for record in &mut batch.records {
            if let Some(outcome) = self.moderate(record).await? {
                tally.flagged += 1;
                if outcome.newly_flagged {
                    tally.newly_banned.push(record.reviewer_id.clone());
                }
            }
        }
        tally.records += batch.records.len();

        Ok(StageOutput {
            body: encode_batch(&batch.records)?,
            records: batch.records.len(),
            skipped: batch.skipped,
        })
    }

    async fn finish(&self, tally: ModerationTally) -> Result<Vec<ObjectWrite>, StageError> {
        log::info!(
            "🛡️  Moderation: {} records, {} flagged, {} newly banned",
            tally.records,
            tally.flagged,
            tally.newly_banned.len()
        );

        if !self.publish_banned_users {
            return Ok(Vec::new());
        }

        let banned = self.banned_reviewers().await?;
        let lines = banned
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        log::info!("📝 Publishing {} with {} users", BANNED_USERS_KEY, banned.len());

        Ok(vec![ObjectWrite {
            bucket: self.report_bucket.clone(),
            key: BANNED_USERS_KEY.to_string(),
            body: lines.join("\n").into_bytes(),
        }])
    }
}
