//! Trigger notification wire types
//!
//! Shape follows S3 object-created notifications, trimmed to the fields the
//! pipeline reads:
//!
//! ```json
//! {"Records":[{"s3":{"bucket":{"name":"reviews-bucket"},"object":{"key":"2024/a.json"}}}]}
//! ```
//!
//! Unknown fields (`eventName`, `awsRegion`, ...) are ignored on input.

use serde::{Deserialize, Serialize};

/// A batch of change notifications, handled as one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<TriggerRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Object {
    pub key: String,
}

/// Location of one object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

impl TriggerRecord {
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(&self.s3.bucket.name, &self.s3.object.key)
    }
}

impl From<ObjectRef> for TriggerRecord {
    fn from(object: ObjectRef) -> Self {
        TriggerRecord {
            s3: S3Entity {
                bucket: S3Bucket { name: object.bucket },
                object: S3Object { key: object.key },
            },
        }
    }
}

impl TriggerEvent {
    /// Notification for a single created object
    pub fn object_created(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::from_objects([ObjectRef::new(bucket, key)])
    }

    pub fn from_objects(objects: impl IntoIterator<Item = ObjectRef>) -> Self {
        Self {
            records: objects.into_iter().map(TriggerRecord::from).collect(),
        }
    }

    pub fn objects(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.records.iter().map(TriggerRecord::object_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3_notification() {
        let json = r#"{
            "Records": [{
                "eventVersion": "2.1",
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": "reviews-bucket", "arn": "arn:aws:s3:::reviews-bucket"},
                    "object": {"key": "batch-1.json", "size": 512}
                }
            }]
        }"#;

        let event: TriggerEvent = serde_json::from_str(json).unwrap();
        let objects: Vec<_> = event.objects().collect();
        assert_eq!(objects, vec![ObjectRef::new("reviews-bucket", "batch-1.json")]);
    }

    #[test]
    fn test_object_created_wire_shape() {
        let event = TriggerEvent::object_created("b", "k.json");
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"Records":[{"s3":{"bucket":{"name":"b"},"object":{"key":"k.json"}}}]}"#);
    }

    #[test]
    fn test_empty_event() {
        let event: TriggerEvent = serde_json::from_str("{}").unwrap();
        assert_eq!(event.objects().count(), 0);
    }
}
