//! Domain types shared by the store, cache, notifier and HTTP layer
//!
//! - [`QueueEntry`]: one student's question, pending or resolved
//! - [`QueueSnapshot`]: the live queue document kept in the cache
//! - [`NotificationEvent`]: message published once per resolution
//! - [`Class`]: a class and its topics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Field of a cached queue element holding the student identifier
pub const SNAPSHOT_ID_FIELD: &str = "id";

/// Event kind published when a question is resolved
pub const RESOLVED_EVENT: &str = "resolved";

/// One student's queued question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Join key across the store, the cache and inbound requests
    pub student_id: String,
    /// Student display name
    #[serde(default)]
    pub name: String,
    /// Class the question is about
    #[serde(default)]
    pub class_number: String,
    /// Topic within the class
    #[serde(default)]
    pub topic: String,
    /// Free-form problem description
    #[serde(default)]
    pub problem: String,
    /// When the question was enqueued
    pub created_at: DateTime<Utc>,
    /// When the question was resolved; set exactly once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Create a pending entry
    pub fn pending(student_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            student_id: student_id.into(),
            name: String::new(),
            class_number: String::new(),
            topic: String::new(),
            problem: String::new(),
            created_at,
            resolved_at: None,
        }
    }

    /// Returns true once the entry has a resolution timestamp
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// The live queue as stored in the cache:
///
/// ```json
/// { "queue": [ { "id": "S1", ... }, { "id": "S2", ... } ] }
/// ```
///
/// Elements are kept as raw JSON so fields owned by other services survive
/// a rewrite. Only [`SNAPSHOT_ID_FIELD`] is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub queue: Vec<Value>,

    /// Any other top-level fields, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueueSnapshot {
    /// Parse a snapshot document
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Serialize the snapshot document
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Student ids in queue order. Elements without a string id are skipped.
    pub fn student_ids(&self) -> Vec<&str> {
        self.queue.iter().filter_map(element_id).collect()
    }

    /// Remove every element for `student_id`, returning how many were removed
    pub fn remove_student(&mut self, student_id: &str) -> usize {
        let before = self.queue.len();
        self.queue.retain(|e| element_id(e) != Some(student_id));
        before - self.queue.len()
    }
}

fn element_id(element: &Value) -> Option<&str> {
    element.get(SNAPSHOT_ID_FIELD).and_then(Value::as_str)
}

/// Message published on the notification channel after a resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Unique per publish, lets subscribers drop duplicates
    pub event_id: Uuid,
    /// Always [`RESOLVED_EVENT`] for now
    pub kind: String,
    pub student_id: String,
    pub resolved_at: DateTime<Utc>,
}

impl NotificationEvent {
    /// Build a "resolved" event with a fresh id
    pub fn resolved(student_id: impl Into<String>, resolved_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind: RESOLVED_EVENT.to_string(),
            student_id: student_id.into(),
            resolved_at,
        }
    }

    /// Serialize the full event document
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Flat field list for stream entries; `payload` carries the full document
    pub fn stream_fields(&self) -> serde_json::Result<Vec<(&'static str, String)>> {
        Ok(vec![
            ("event_id", self.event_id.to_string()),
            ("kind", self.kind.clone()),
            ("student_id", self.student_id.clone()),
            ("resolved_at", self.resolved_at.to_rfc3339()),
            ("payload", self.to_json()?),
        ])
    }
}

/// A class and the topics students may ask about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub class_number: String,
    pub topics: Vec<String>,
}
