//! Single-slot draft persistence with staleness expiry
//!
//! One draft per install lives under a fixed key. Drafts older than the
//! staleness window are purged when read. Failures never reach the caller
//! of `load` or `clear`; they are logged and treated as "no draft".

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{KeyValueStore, StorageError};
use crate::form::FormState;

pub const DEFAULT_DRAFT_KEY: &str = "admission_draft";

/// Error types for draft persistence
#[derive(Error, Debug)]
pub enum DraftError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The persisted draft record
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub form_state: FormState,
    pub saved_at_timestamp: DateTime<Utc>,
}

impl Draft {
    /// Elapsed time exceeds `max_age`. Timestamps in the future count as fresh.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.saved_at_timestamp) > max_age
    }
}

/// Durable draft slot backed by a [`KeyValueStore`]
#[derive(Clone)]
pub struct DraftStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    max_age: Duration,
}

impl DraftStore {
    /// Draft store under the default key with a 24 hour staleness window
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            key: DEFAULT_DRAFT_KEY.to_string(),
            max_age: Duration::hours(24),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Persist `form_state` stamped with the current time
    pub async fn save(&self, form_state: &FormState) -> Result<(), DraftError> {
        self.save_at(form_state, Utc::now()).await
    }

    /// Persist `form_state` stamped with `saved_at`
    pub async fn save_at(
        &self,
        form_state: &FormState,
        saved_at: DateTime<Utc>,
    ) -> Result<(), DraftError> {
        let draft = Draft {
            form_state: form_state.clone(),
            saved_at_timestamp: saved_at,
        };
        let json = serde_json::to_string(&draft)?;
        self.store.set(&self.key, json).await?;
        log::debug!("Draft saved under {}", self.key);
        Ok(())
    }

    /// Load the draft if one exists and is still fresh
    pub async fn load(&self) -> Option<FormState> {
        self.load_at(Utc::now()).await
    }

    /// Load relative to an explicit `now`
    pub async fn load_at(&self, now: DateTime<Utc>) -> Option<FormState> {
        let raw = match self.store.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Failed to read draft {}: {}", self.key, e);
                return None;
            }
        };

        let draft: Draft = match serde_json::from_str(&raw) {
            Ok(draft) => draft,
            Err(e) => {
                log::warn!("Discarding unreadable draft {}: {}", self.key, e);
                self.clear().await;
                return None;
            }
        };

        if !draft.form_state.as_value().is_object() {
            log::warn!("Discarding draft {}: form state is not a mapping", self.key);
            self.clear().await;
            return None;
        }

        if draft.is_stale(now, self.max_age) {
            log::info!(
                "Discarding stale draft {} saved at {}",
                self.key,
                draft.saved_at_timestamp.to_rfc3339()
            );
            self.clear().await;
            return None;
        }

        Some(FormState::from_value(draft.form_state.into_value()))
    }

    /// Remove the draft. Best effort: failures are logged only.
    pub async fn clear(&self) {
        if let Err(e) = self.store.remove(&self.key).await {
            log::warn!("Failed to clear draft {}: {}", self.key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("offline".to_string()))
        }

        async fn set(&self, _key: &str, _value: String) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("offline".to_string()))
        }

        async fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("offline".to_string()))
        }
    }

    fn sample_state() -> FormState {
        FormState::template().with_field("studentInfo.fullName", json!("Asha Rao"))
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = Arc::new(MemoryStore::new());
        let drafts = DraftStore::new(store.clone());

        assert!(drafts.load().await.is_none());
        drafts.save(&sample_state()).await.unwrap();

        let loaded = drafts.load().await.unwrap();
        assert_eq!(loaded, sample_state());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_saved_shape() {
        let store = Arc::new(MemoryStore::new());
        let drafts = DraftStore::new(store.clone());
        drafts.save(&sample_state()).await.unwrap();

        let raw = store.get(DEFAULT_DRAFT_KEY).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["formState"]["studentInfo"]["fullName"], json!("Asha Rao"));
        assert!(value["savedAtTimestamp"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_non_mapping_form_state_is_purged() {
        let store = Arc::new(MemoryStore::new());
        let drafts = DraftStore::new(store.clone());

        for form_state in [json!("garbage"), json!([1, 2]), json!(null)] {
            let raw = json!({
                "formState": form_state,
                "savedAtTimestamp": Utc::now().to_rfc3339(),
            });
            store.set(DEFAULT_DRAFT_KEY, raw.to_string()).await.unwrap();

            assert!(drafts.load().await.is_none());
            assert!(store.is_empty());
        }
    }

    #[tokio::test]
    async fn test_stale_draft_is_purged() {
        let store = Arc::new(MemoryStore::new());
        let drafts = DraftStore::new(store.clone());
        let now = Utc::now();

        drafts
            .save_at(&sample_state(), now - Duration::hours(25))
            .await
            .unwrap();

        assert!(drafts.load_at(now).await.is_none());
        assert!(store.is_empty());
        assert!(drafts.load_at(now).await.is_none());
    }

    #[tokio::test]
    async fn test_draft_inside_window_survives() {
        let store = Arc::new(MemoryStore::new());
        let drafts = DraftStore::new(store.clone());
        let now = Utc::now();

        drafts
            .save_at(&sample_state(), now - Duration::hours(23))
            .await
            .unwrap();
        assert!(drafts.load_at(now).await.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_draft_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(DEFAULT_DRAFT_KEY, "not json".to_string())
            .await
            .unwrap();

        let drafts = DraftStore::new(store.clone());
        assert!(drafts.load().await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_restored_draft_fills_template_gaps() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                DEFAULT_DRAFT_KEY,
                json!({
                    "formState": { "parentInfo": { "firstName": "Vikram" } },
                    "savedAtTimestamp": Utc::now().to_rfc3339()
                })
                .to_string(),
            )
            .await
            .unwrap();

        let loaded = DraftStore::new(store).load().await.unwrap();
        assert_eq!(loaded.get("parentInfo.firstName"), Some(&json!("Vikram")));
        assert_eq!(loaded.get("studentInfo.address.city"), Some(&json!("")));
    }

    #[tokio::test]
    async fn test_failures_are_swallowed_on_read_paths() {
        let drafts = DraftStore::new(Arc::new(BrokenStore));
        assert!(drafts.load().await.is_none());
        drafts.clear().await;
        assert!(matches!(
            drafts.save(&sample_state()).await,
            Err(DraftError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_custom_key() {
        let store = Arc::new(MemoryStore::new());
        let drafts = DraftStore::new(store.clone()).with_key("other_draft");
        drafts.save(&sample_state()).await.unwrap();
        assert!(store.get("other_draft").await.unwrap().is_some());
        assert!(store.get(DEFAULT_DRAFT_KEY).await.unwrap().is_none());
    }
}
