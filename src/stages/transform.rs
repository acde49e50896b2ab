//! Record transform stage: raw review text into token lists.

use super::{ObjectWrite, Stage, StageError, StageOutput};
use crate::framing::{decode_batch, encode_batch};
use crate::record::{ReviewRecord, TextField};
use crate::tokenizer::Tokenizer;
use async_trait::async_trait;
use std::sync::Arc;

pub struct TransformStage {
    tokenizer: Arc<Tokenizer>,
    output_bucket: String,
}

impl TransformStage {
    pub fn new(tokenizer: Arc<Tokenizer>, output_bucket: impl Into<String>) -> Self {
        Self {
            tokenizer,
            output_bucket: output_bucket.into(),
        }
    }

    /// Tokenize `reviewText` and `summary` in place. Fields that are already
    /// token lists are left alone, so reprocessing is a no-op.
    pub fn transform_record(&self, record: &mut ReviewRecord) {
        for field in [&mut record.review_text, &mut record.summary] {
            if let Some(TextField::Raw(text)) = field.as_ref() {
                let tokens = self.tokenizer.tokenize(text);
                *field = Some(TextField::Tokens(tokens));
            }
        }
    }
}

#[async_trait]
impl Stage for TransformStage {
    type Tally = ();

    fn name(&self) -> &'static str {
        "transform"
    }

    fn output_bucket(&self) -> &str {
        &self.output_bucket
    }

    async fn process(&self, body: &str, _tally: &mut ()) -> Result<StageOutput, StageError> {
        let mut batch = decode_batch(body);
        for record in &mut batch.records {
            self.transform_record(record);
        }

        Ok(StageOutput {
            body: encode_batch(&batch.records)?,
            records: batch.records.len(),
            skipped: batch.skipped,
        })
    }

    async fn finish(&self, _tally: ()) -> Result<Vec<ObjectWrite>, StageError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn stage() -> TransformStage {
        TransformStage::new(Arc::new(Tokenizer::bundled()), "cleaned")
    }

    #[tokio::test]
    async fn test_tokenizes_text_fields_only() {
        let body = r#"{"reviewerID":"A123XYZ","reviewerName":"John Doe","reviewText":"What a freaking mess.","summary":"Total crap!","overall":1.0,"helpful":[2,3]}"#;

        let output = stage().process(body, &mut ()).await.unwrap();
        let record: Value = serde_json::from_str(&output.body).unwrap();

        assert_eq!(record["reviewText"], serde_json::json!(["freaking", "mess"]));
        assert_eq!(record["summary"], serde_json::json!(["total", "crap"]));
        assert_eq!(record["reviewerName"], "John Doe");
        assert_eq!(record["helpful"], serde_json::json!([2, 3]));
        assert_eq!(record["overall"], 1.0);
        assert_eq!(output.records, 1);
    }

    #[tokio::test]
    async fn test_already_tokenized_untouched() {
        let mut record = ReviewRecord::new("A1");
        record.review_text = Some(TextField::Tokens(vec!["The".into(), "it".into()]));

        stage().transform_record(&mut record);

        assert_eq!(
            record.review_text,
            Some(TextField::Tokens(vec!["The".into(), "it".into()]))
        );
        assert!(record.summary.is_none());
    }

    #[tokio::test]
    async fn test_bad_lines_skipped() {
        let body = "{\"reviewerID\":\"A1\",\"summary\":\"Great\"}\n{oops\n{\"reviewerID\":\"A2\"}";
        let output = stage().process(body, &mut ()).await.unwrap();

        assert_eq!(output.records, 2);
        assert_eq!(output.skipped, 1);
        assert_eq!(output.body.lines().count(), 2);
    }
}
