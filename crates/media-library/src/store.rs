//! Media Store
//!
//! Persistence port for media records.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use media_core::traits::Id;
use tokio::sync::RwLock;

use crate::error::MediaResult;
use crate::model::{Media, NewMedia};

/// Media store trait
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Create a media record, assigning its id
    async fn create(&self, media: NewMedia) -> MediaResult<Media>;

    /// Get a media record by ID
    async fn get(&self, id: Id) -> MediaResult<Option<Media>>;

    /// Get the records that exist among `ids`, in the order given
    async fn get_many(&self, ids: &[Id]) -> MediaResult<Vec<Media>>;

    /// Delete a media record
    async fn delete(&self, id: Id) -> MediaResult<()>;
}

/// In-memory media store for testing
pub struct MemoryMediaStore {
    media: RwLock<Vec<Media>>,
    next_id: AtomicI64,
}

impl Default for MemoryMediaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self {
            media: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn create(&self, new: NewMedia) -> MediaResult<Media> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let media = Media {
            id,
            name: new.name,
            file_name: new.file_name,
            mime_type: new.mime_type,
            size: new.size,
            disk: new.disk,
            created_at: now,
            updated_at: now,
        };

        let mut records = self.media.write().await;
        records.push(media.clone());

        Ok(media)
    }

    async fn get(&self, id: Id) -> MediaResult<Option<Media>> {
        let records = self.media.read().await;
        Ok(records.iter().find(|m| m.id == id).cloned())
    }

    async fn get_many(&self, ids: &[Id]) -> MediaResult<Vec<Media>> {
        let records = self.media.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| records.iter().find(|m| m.id == *id).cloned())
            .collect())
    }

    async fn delete(&self, id: Id) -> MediaResult<()> {
        let mut records = self.media.write().await;
        records.retain(|m| m.id != id);
        Ok(())
    }
}
