//! Recording catalog.
//!
//! The recording actions only query and flag recordings; importing and
//! serving recordings happens elsewhere.

use crate::errors::LbError;
use crate::models::{Recording, RecordingFilter};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

/// A single metadata edit. `value: None` removes the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataChange {
    pub key: String,
    pub value: Option<String>,
}

#[async_trait]
pub trait RecordingCatalog: Send + Sync {
    /// Recordings matching `filter`, ordered by start time.
    async fn find(&self, filter: &RecordingFilter) -> Result<Vec<Recording>, LbError>;

    /// Set the published flag. Returns the number of recordings touched.
    async fn set_published(&self, record_ids: &[String], published: bool)
        -> Result<usize, LbError>;

    async fn update_metadata(
        &self,
        record_ids: &[String],
        changes: &[MetadataChange],
    ) -> Result<usize, LbError>;

    /// Mark recordings deleted. They stay in the catalog but only match
    /// filters that ask for the `deleted` state.
    async fn soft_delete(&self, record_ids: &[String]) -> Result<usize, LbError>;
}

/// Catalog held in process memory.
#[derive(Clone, Default)]
pub struct InMemoryRecordingCatalog {
    recordings: Arc<Mutex<Vec<Recording>>>,
}

impl InMemoryRecordingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recordings(recordings: impl IntoIterator<Item = Recording>) -> Self {
        Self {
            recordings: Arc::new(Mutex::new(recordings.into_iter().collect())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Recording>>, LbError> {
        self.recordings
            .lock()
            .map_err(|_| LbError::Store("recording catalog lock poisoned".to_string()))
    }

    fn update<F>(&self, record_ids: &[String], mut apply: F) -> Result<usize, LbError>
    where
        F: FnMut(&mut Recording),
    {
        let mut recordings = self.lock()?;
        let mut touched = 0;
        for recording in recordings
            .iter_mut()
            .filter(|r| record_ids.contains(&r.record_id))
        {
            apply(recording);
            touched += 1;
        }
        Ok(touched)
    }
}

#[async_trait]
impl RecordingCatalog for InMemoryRecordingCatalog {
    async fn find(&self, filter: &RecordingFilter) -> Result<Vec<Recording>, LbError> {
        let mut found: Vec<Recording> = self
            .lock()?
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.start_time);
        Ok(found)
    }

    async fn set_published(
        &self,
        record_ids: &[String],
        published: bool,
    ) -> Result<usize, LbError> {
        self.update(record_ids, |recording| {
            if recording.state == "deleted" {
                return;
            }
            recording.published = published;
            recording.state = if published { "published" } else { "unpublished" }.to_string();
        })
    }

    async fn update_metadata(
        &self,
        record_ids: &[String],
        changes: &[MetadataChange],
    ) -> Result<usize, LbError> {
        self.update(record_ids, |recording| {
            for change in changes {
                match &change.value {
                    Some(value) => {
                        recording
                            .metadata
                            .insert(change.key.clone(), value.clone());
                    }
                    None => {
                        recording.metadata.remove(&change.key);
                    }
                }
            }
        })
    }

    async fn soft_delete(&self, record_ids: &[String]) -> Result<usize, LbError> {
        self.update(record_ids, |recording| {
            recording.published = false;
            recording.state = "deleted".to_string();
        })
    }
}
