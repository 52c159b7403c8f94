use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use walkthrough_core::model::{ComponentId, TourError, TourProgress, UiStateBag};

/// Errors surfaced by persistence adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable key/value boundary.
///
/// Each key is atomic: a `load` never observes a half-written value.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Fetch the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Remove `key`. Clearing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn clear(&self, key: &str) -> Result<(), StorageError>;
}

/// Persisted shape of tour progress.
///
/// Mirrors `TourProgress` so adapters never see the domain type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub step_index: u32,
    pub total_steps: u32,
    pub active: bool,
    pub last_updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    #[must_use]
    pub fn from_progress(progress: &TourProgress) -> Self {
        Self {
            step_index: progress.step_index(),
            total_steps: progress.total_steps(),
            active: progress.is_active(),
            last_updated_at: progress.last_updated_at(),
        }
    }

    /// Convert the record back into domain progress.
    ///
    /// # Errors
    ///
    /// Returns `TourError::InvalidPersistedState` if the record breaks the
    /// step/total invariant.
    pub fn into_progress(self) -> Result<TourProgress, TourError> {
        TourProgress::from_persisted(
            self.step_index,
            self.total_steps,
            self.active,
            self.last_updated_at,
        )
    }

    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if `raw` is not a progress record.
    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// Persisted shape of every component's UI-state bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UiStateRecord {
    pub components: BTreeMap<ComponentId, UiStateBag>,
}

impl UiStateRecord {
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if a bag holds a value JSON cannot encode.
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if `raw` is not a component map.
    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// Simple in-memory adapter for tests and prototyping.
///
/// Clones share the same map, so two controllers built from clones behave
/// like two processes reading the same disk.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryStore {
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn clear(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

/// Persistence backend behind a trait object for easy swapping.
#[derive(Clone)]
pub struct Storage {
    pub records: Arc<dyn PersistenceAdapter>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_adapter(InMemoryStore::new())
    }

    #[must_use]
    pub fn from_adapter(adapter: impl PersistenceAdapter + 'static) -> Self {
        Self {
            records: Arc::new(adapter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walkthrough_core::time::fixed_now;

    #[tokio::test]
    async fn in_memory_clones_share_entries() {
        let store = InMemoryStore::new();
        let other = store.clone();
        store.save("tour/progress", "{}").await.unwrap();
        assert_eq!(
            other.load("tour/progress").await.unwrap().as_deref(),
            Some("{}")
        );

        other.clear("tour/progress").await.unwrap();
        assert!(store.load("tour/progress").await.unwrap().is_none());
        other.clear("never-written").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn missing_keys_are_absent_rather_than_errors() {
        let store = InMemoryStore::new();
        assert!(store.load("gas-laws/progress").await.unwrap().is_none());
        store.clear("gas-laws/ui-state").await.unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn progress_record_uses_camel_case_layout() {
        let progress = TourProgress::from_persisted(2, 5, true, fixed_now()).unwrap();
        let json = ProgressRecord::from_progress(&progress).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["stepIndex"], 2);
        assert_eq!(value["totalSteps"], 5);
        assert_eq!(value["active"], true);
        assert!(value["lastUpdatedAt"].is_string());

        let back = ProgressRecord::from_json(&json)
            .unwrap()
            .into_progress()
            .unwrap();
        assert_eq!(back, progress);
    }

    #[test]
    fn corrupt_progress_record_is_rejected() {
        assert!(matches!(
            ProgressRecord::from_json("{\"stepIndex\":1}"),
            Err(StorageError::Serialization(_))
        ));
        let bad = ProgressRecord {
            step_index: 9,
            total_steps: 3,
            active: true,
            last_updated_at: fixed_now(),
        };
        assert!(bad.into_progress().is_err());
    }

    #[test]
    fn ui_state_record_is_a_plain_component_map() {
        let mut record = UiStateRecord::default();
        record.components.insert(
            ComponentId::new("problems-slide"),
            UiStateBag::new().with("isExpanded", true),
        );
        let json = record.to_json().unwrap();
        assert_eq!(json, r#"{"problems-slide":{"isExpanded":true}}"#);
        assert_eq!(UiStateRecord::from_json(&json).unwrap(), record);
    }
}
