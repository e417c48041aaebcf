//! Entity store seam.
//!
//! Persistence is a collaborator: callers see `filter/get/create/update` over
//! typed records, plus a compare-and-swap update keyed on the record version.
//! `MemoryStore` is the in-process implementation used by the service and tests.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::DateTime;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::{Course, Enrollment};

pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: &'static str;
    fn id(&self) -> Uuid;
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
}

impl Entity for Course {
    const COLLECTION: &'static str = "courses";
    fn id(&self) -> Uuid { self.id }
    fn version(&self) -> u64 { self.version }
    fn set_version(&mut self, version: u64) { self.version = version; }
}

impl Entity for Enrollment {
    const COLLECTION: &'static str = "enrollments";
    fn id(&self) -> Uuid { self.id }
    fn version(&self) -> u64 { self.version }
    fn set_version(&mut self, version: u64) { self.version = version; }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection} record {id} not found")]
    NotFound { collection: &'static str, id: Uuid },
    #[error("{collection} record {id} changed (expected version {expected}, found {found})")]
    VersionConflict { collection: &'static str, id: Uuid, expected: u64, found: u64 },
    #[error("{collection} record {id} already exists")]
    Duplicate { collection: &'static str, id: Uuid },
    /// The backing store could not be reached or refused the write.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid patch: {0}")]
    InvalidPatch(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Field-equality filter. `{"course_id": "...", "student_email": "..."}`.
#[derive(Clone, Debug, Default)]
pub struct Query(Map<String, Value>);

impl Query {
    pub fn new() -> Self { Self::default() }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.0.iter().all(|(k, v)| record.get(k) == Some(v))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

impl SortSpec {
    /// `"-created_date"` sorts descending, `"title"` ascending.
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => Self { field: field.to_string(), descending: true },
            None => Self { field: spec.to_string(), descending: false },
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            // RFC 3339 text has a variable fraction width, so compare instants
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
pub trait EntityStore<T: Entity>: Send + Sync {
    async fn filter(&self, query: &Query, sort: Option<&SortSpec>) -> Result<Vec<T>, StoreError>;
    async fn get(&self, id: Uuid) -> Result<T, StoreError>;
    async fn create(&self, record: T) -> Result<T, StoreError>;
    /// Merge the top-level keys of `patch` into the record.
    async fn update(&self, id: Uuid, patch: Value) -> Result<T, StoreError>;
    /// Same as `update` but fails with `VersionConflict` when the stored
    /// version differs from `expected_version`.
    async fn update_if_version(&self, id: Uuid, expected_version: u64, patch: Value) -> Result<T, StoreError>;
}

#[derive(Clone)]
pub struct MemoryStore<T: Entity> {
    records: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T: Entity> Default for MemoryStore<T> {
    fn default() -> Self {
        Self { records: Arc::new(RwLock::new(HashMap::new())) }
    }
}

impl<T: Entity> MemoryStore<T> {
    pub fn new() -> Self { Self::default() }

    fn merge(current: &T, patch: Value) -> Result<T, StoreError> {
        let Value::Object(fields) = patch else {
            return Err(StoreError::InvalidPatch("patch must be a JSON object".into()));
        };
        if fields.contains_key("id") || fields.contains_key("version") {
            return Err(StoreError::InvalidPatch("id and version are managed by the store".into()));
        }
        let mut value = serde_json::to_value(current)?;
        if let Value::Object(obj) = &mut value {
            obj.extend(fields);
        }
        let mut next: T = serde_json::from_value(value)?;
        next.set_version(current.version() + 1);
        Ok(next)
    }

    async fn write(&self, id: Uuid, expected_version: Option<u64>, patch: Value) -> Result<T, StoreError> {
        let mut records = self.records.write().await;
        let current = records
            .get(&id)
            .ok_or(StoreError::NotFound { collection: T::COLLECTION, id })?;
        if let Some(expected) = expected_version {
            if current.version() != expected {
                return Err(StoreError::VersionConflict {
                    collection: T::COLLECTION,
                    id,
                    expected,
                    found: current.version(),
                });
            }
        }
        let next = Self::merge(current, patch)?;
        records.insert(id, next.clone());
        debug!(target: "coursespark", collection = T::COLLECTION, %id, version = next.version(), "record updated");
        Ok(next)
    }
}

#[async_trait]
impl<T: Entity> EntityStore<T> for MemoryStore<T> {
    #[instrument(level = "debug", skip(self, query), fields(collection = T::COLLECTION))]
    async fn filter(&self, query: &Query, sort: Option<&SortSpec>) -> Result<Vec<T>, StoreError> {
        let records = self.records.read().await;
        let mut hits: Vec<(Value, T)> = Vec::new();
        for r in records.values() {
            let v = serde_json::to_value(r)?;
            if query.matches(&v) {
                hits.push((v, r.clone()));
            }
        }
        if let Some(s) = sort {
            hits.sort_by(|(a, _), (b, _)| {
                let ord = compare_values(a.get(&s.field), b.get(&s.field));
                if s.descending { ord.reverse() } else { ord }
            });
        }
        Ok(hits.into_iter().map(|(_, r)| r).collect())
    }

    async fn get(&self, id: Uuid) -> Result<T, StoreError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { collection: T::COLLECTION, id })
    }

    async fn create(&self, mut record: T) -> Result<T, StoreError> {
        let mut records = self.records.write().await;
        let id = record.id();
        if records.contains_key(&id) {
            return Err(StoreError::Duplicate { collection: T::COLLECTION, id });
        }
        record.set_version(0);
        records.insert(id, record.clone());
        debug!(target: "coursespark", collection = T::COLLECTION, %id, "record created");
        Ok(record)
    }

    async fn update(&self, id: Uuid, patch: Value) -> Result<T, StoreError> {
        self.write(id, None, patch).await
    }

    async fn update_if_version(&self, id: Uuid, expected_version: u64, patch: Value) -> Result<T, StoreError> {
        self.write(id, Some(expected_version), patch).await
    }
}
