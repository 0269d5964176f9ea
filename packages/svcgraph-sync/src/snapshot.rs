//! Registry snapshot schema and queue envelope
//!
//! Field names follow the discovery API payload (`Services`, `Name`,
//! `Instances`, `Id`, `Tags`, `Key`, `Value`). Fields the sync does not
//! use (ARNs, attributes, timestamps) are ignored on read.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// One point-in-time capture of the service registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "Services", default)]
    pub services: Vec<ServiceRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Instances", default)]
    pub instances: Vec<InstanceRecord>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    #[serde(rename = "Id")]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl Snapshot {
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }
}

impl ServiceRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instances: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn instance(mut self, id: impl Into<String>) -> Self {
        self.instances.push(InstanceRecord { id: id.into() });
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Value of `key` in this service's tag list. Last occurrence wins.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .rev()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}

// ============================================================================
// Queue envelope
// ============================================================================

/// Batch delivered by the message queue.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueRecord {
    /// Unique per message; reused as the transaction id so redelivery is idempotent
    #[serde(rename = "messageId")]
    pub message_id: String,
    /// Snapshot JSON
    pub body: String,
}

impl QueueEvent {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The one record this invocation may process.
    ///
    /// Batches with more than one record are rejected outright; nothing
    /// from them is applied.
    pub fn single_record(&self) -> Result<&QueueRecord> {
        match self.records.as_slice() {
            [record] => Ok(record),
            [] => Err(SyncError::EmptyBatch),
            records => Err(SyncError::MultiSnapshotRejected {
                count: records.len(),
            }),
        }
    }
}

impl QueueRecord {
    pub fn snapshot(&self) -> Result<Snapshot> {
        Snapshot::from_json(&self.body)
    }
}

#[cfg(test)]
mod snapshot_tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "Services": [
            {
                "Id": "srv-1",
                "Arn": "arn:aws:servicediscovery:eu-west-1:1:service/srv-1",
                "Name": "frontend",
                "Instances": [{"Id": "i-1", "Attributes": {"AWS_INSTANCE_IPV4": "10.0.0.1"}}],
                "Tags": [{"Key": "NEO4J_RELATIONSHIP_TO_SERVICE", "Value": "backend"}]
            },
            {"Name": "backend"}
        ],
        "ResponseMetadata": {"HTTPStatusCode": 200}
    }"#;

    #[test]
    fn test_parse_discovery_payload() {
        let snapshot = Snapshot::from_json(PAYLOAD).unwrap();
        assert_eq!(snapshot.services.len(), 2);

        let frontend = &snapshot.services[0];
        assert_eq!(frontend.name, "frontend");
        assert_eq!(frontend.instances, vec![InstanceRecord { id: "i-1".to_string() }]);
        assert_eq!(frontend.tag_value("NEO4J_RELATIONSHIP_TO_SERVICE"), Some("backend"));

        let backend = &snapshot.services[1];
        assert!(backend.instances.is_empty());
        assert!(backend.tags.is_empty());
    }

    #[test]
    fn test_tag_value_last_wins() {
        let service = ServiceRecord::new("a")
            .tag("dep", "b")
            .tag("team", "core")
            .tag("dep", "c");
        assert_eq!(service.tag_value("dep"), Some("c"));
        assert_eq!(service.tag_value("missing"), None);
    }

    #[test]
    fn test_invalid_payload() {
        let err = Snapshot::from_json("{\"Services\": 3}").unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYLOAD");
    }

    // ============================================================================
    // Envelope
    // ============================================================================

    fn event_with(records: usize) -> QueueEvent {
        let records: Vec<String> = (0..records)
            .map(|i| {
                format!(
                    r#"{{"messageId": "m-{}", "body": "{{\"Services\": []}}"}}"#,
                    i
                )
            })
            .collect();
        QueueEvent::from_json(&format!(r#"{{"Records": [{}]}}"#, records.join(","))).unwrap()
    }

    #[test]
    fn test_single_record() {
        let event = event_with(1);
        let record = event.single_record().unwrap();
        assert_eq!(record.message_id, "m-0");
        assert_eq!(record.snapshot().unwrap(), Snapshot::default());
    }

    #[test]
    fn test_multi_record_rejected() {
        let event = event_with(3);
        match event.single_record() {
            Err(SyncError::MultiSnapshotRejected { count }) => assert_eq!(count, 3),
            other => panic!("Expected MultiSnapshotRejected, got: {:?}", other),
        }
    }

    #[test]
    fn test_empty_batch_rejected() {
        let event = event_with(0);
        assert!(matches!(event.single_record(), Err(SyncError::EmptyBatch)));
    }
}
