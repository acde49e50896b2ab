//! Newline-delimited JSON framing shared by every stage.
//!
//! Objects are always one record per line. A single-document object is just a
//! one-line batch, so there is exactly one decoder for all stages.

use crate::record::ReviewRecord;

/// Result of decoding one object body.
#[derive(Debug, Default)]
pub struct DecodedBatch {
    /// Parsed records in stored order
    pub records: Vec<ReviewRecord>,
    /// Non-blank lines that failed to parse
    pub skipped: usize,
}

/// Decode an object body into records, skipping blank and malformed lines.
///
/// Malformed lines are logged and counted; they never abort the batch.
pub fn decode_batch(body: &str) -> DecodedBatch {
    let mut batch = DecodedBatch::default();

    for (line_no, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<ReviewRecord>(line) {
            Ok(record) => batch.records.push(record),
            Err(e) => {
                log::warn!("⚠️  Skipping malformed record on line {}: {}", line_no + 1, e);
                batch.skipped += 1;
            }
        }
    }

    batch
}

/// Encode records as NDJSON (no trailing newline, matching the upstream writers).
pub fn encode_batch(records: &[ReviewRecord]) -> Result<String, serde_json::Error> {
    let lines = records
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_lines_skipped() {
        let body = concat!(
            r#"{"reviewerID":"A1","reviewText":["ok"]}"#,
            "\n",
            "{not json\n",
            "\n",
            r#"{"reviewerID":"A2","summary":["fine"]}"#,
            "\n",
            r#"{"reviewerID":"A3","overall":"five stars"}"#,
            "\n",
            r#"{"reviewerID":"A4"}"#,
        );

        let batch = decode_batch(body);

        let ids: Vec<_> = batch.records.iter().map(|r| r.reviewer_id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "A2", "A4"]);
        assert_eq!(batch.skipped, 2);
    }

    #[test]
    fn test_single_document_object() {
        let body = r#"{"reviewerID":"A1","reviewText":"Raw text here"}"#;
        let batch = decode_batch(body);

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.skipped, 0);
    }

    #[test]
    fn test_empty_body() {
        let batch = decode_batch("  \n\n");
        assert!(batch.records.is_empty());
        assert_eq!(batch.skipped, 0);
    }

    #[test]
    fn test_encode_preserves_order() {
        let records = vec![ReviewRecord::new("first"), ReviewRecord::new("second")];
        let body = encode_batch(&records).unwrap();

        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("first"));
        assert!(lines[1].contains("second"));
        assert!(!body.ends_with('\n'));
    }
}
