use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Represents one unit of data flowing through a topic.
///
/// On the wire a message is a JSON object:
///
/// ```json
/// {"ID":"…","Body":"<base64>","Timestamp":"2025-01-01T00:00:00Z","Metadata":{"source":"scraper"}}
/// ```
///
/// # Fields
///
/// - `id` - Unique identifier. Assigned by the queue when empty at send time.
/// - `body` - Opaque payload, never interpreted by the queue.
/// - `timestamp` - Creation time. Set to the send time when absent.
/// - `metadata` - Producer tags such as `source` or `type`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "ID", default)]
    pub id: String,

    #[serde(rename = "Body", with = "body_base64", default)]
    pub body: Vec<u8>,

    #[serde(rename = "Timestamp", default)]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(rename = "Metadata", default, deserialize_with = "null_as_empty")]
    pub metadata: HashMap<String, String>,
}

impl Message {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Backfills a fresh UUID and the current time where the producer left
    /// them unset.
    pub fn fill_defaults(&mut self) {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<HashMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

mod body_base64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}
