//! Owner to media associations
//!
//! Rows are `(owner_type, owner_id, media_id, group)` with at most one row per
//! owner, media and group.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use media_core::traits::Id;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::AttachResult;

/// Stable identity of the entity owning media
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub owner_type: String,
    pub owner_id: Id,
}

impl Owner {
    pub fn new(owner_type: impl Into<String>, owner_id: Id) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id,
        }
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.owner_type, self.owner_id)
    }
}

/// Association row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub owner: Owner,
    pub media_id: Id,
    pub group: String,
    pub created_at: DateTime<Utc>,
}

impl Association {
    pub fn new(owner: Owner, media_id: Id, group: impl Into<String>) -> Self {
        Self {
            owner,
            media_id,
            group: group.into(),
            created_at: Utc::now(),
        }
    }

    fn matches(&self, owner: &Owner, media_id: Id, group: &str) -> bool {
        self.media_id == media_id && self.group == group && self.owner == *owner
    }
}

/// Membership changes applied to one group by [`AssociationStore::sync_group`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDiff {
    /// Ids that joined the group, in target order
    pub added: Vec<Id>,
    /// Ids that left the group, in their previous order
    pub removed: Vec<Id>,
}

impl GroupDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Association persistence port
#[async_trait]
pub trait AssociationStore: Send + Sync {
    /// All associations of an owner, in insertion order
    async fn list(&self, owner: &Owner) -> AttachResult<Vec<Association>>;

    /// Associate media with a group; existing rows are left alone
    ///
    /// Returns the number of rows created.
    async fn insert(&self, owner: &Owner, media_ids: &[Id], group: &str) -> AttachResult<usize>;

    /// Remove the owner's rows for `media_ids` in every group, or all rows when `None`
    async fn remove(&self, owner: &Owner, media_ids: Option<&[Id]>) -> AttachResult<usize>;

    /// Remove the owner's rows in one group
    async fn remove_group(&self, owner: &Owner, group: &str) -> AttachResult<usize>;

    /// Apply a group diff as a single unit: either every change lands or none does
    async fn replace_group(
        &self,
        owner: &Owner,
        group: &str,
        insert: &[Id],
        remove: &[Id],
    ) -> AttachResult<()>;

    /// Make the group hold `target`, reading and writing it as a single unit
    ///
    /// Members missing from `target` are removed only when `detach_existing` is set.
    async fn sync_group(
        &self,
        owner: &Owner,
        group: &str,
        target: &[Id],
        detach_existing: bool,
    ) -> AttachResult<GroupDiff>;
}

/// In-memory association store for testing
pub struct MemoryAssociationStore {
    rows: RwLock<Vec<Association>>,
}

impl Default for MemoryAssociationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAssociationStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }

    fn insert_rows(
        rows: &mut Vec<Association>,
        owner: &Owner,
        media_ids: &[Id],
        group: &str,
    ) -> usize {
        let mut created = 0;
        for &media_id in media_ids {
            if rows.iter().any(|row| row.matches(owner, media_id, group)) {
                continue;
            }
            rows.push(Association::new(owner.clone(), media_id, group));
            created += 1;
        }
        created
    }

    fn retain_rows<F>(rows: &mut Vec<Association>, mut keep: F) -> usize
    where
        F: FnMut(&Association) -> bool,
    {
        let before = rows.len();
        rows.retain(|row| keep(row));
        before - rows.len()
    }
}

#[async_trait]
impl AssociationStore for MemoryAssociationStore {
    async fn list(&self, owner: &Owner) -> AttachResult<Vec<Association>> {
        let rows = self.rows.read().await;
        Ok(rows.iter().filter(|row| row.owner == *owner).cloned().collect())
    }

    async fn insert(&self, owner: &Owner, media_ids: &[Id], group: &str) -> AttachResult<usize> {
        let mut rows = self.rows.write().await;
        Ok(Self::insert_rows(&mut rows, owner, media_ids, group))
    }

    async fn remove(&self, owner: &Owner, media_ids: Option<&[Id]>) -> AttachResult<usize> {
        let mut rows = self.rows.write().await;
        Ok(Self::retain_rows(&mut rows, |row| {
            row.owner != *owner || media_ids.map_or(false, |ids| !ids.contains(&row.media_id))
        }))
    }

    async fn remove_group(&self, owner: &Owner, group: &str) -> AttachResult<usize> {
        let mut rows = self.rows.write().await;
        Ok(Self::retain_rows(&mut rows, |row| {
            row.owner != *owner || row.group != group
        }))
    }

    async fn replace_group(
        &self,
        owner: &Owner,
        group: &str,
        insert: &[Id],
        remove: &[Id],
    ) -> AttachResult<()> {
        // One write guard for the whole diff
        let mut rows = self.rows.write().await;

        let removed: HashSet<Id> = remove.iter().copied().collect();
        Self::retain_rows(&mut rows, |row| {
            row.owner != *owner || row.group != group || !removed.contains(&row.media_id)
        });
        Self::insert_rows(&mut rows, owner, insert, group);

        Ok(())
    }

    async fn sync_group(
        &self,
        owner: &Owner,
        group: &str,
        target: &[Id],
        detach_existing: bool,
    ) -> AttachResult<GroupDiff> {
        let mut rows = self.rows.write().await;

        let current: Vec<Id> = rows
            .iter()
            .filter(|row| row.owner == *owner && row.group == group)
            .map(|row| row.media_id)
            .collect();
        let wanted: HashSet<Id> = target.iter().copied().collect();

        let mut seen = HashSet::new();
        let added: Vec<Id> = target
            .iter()
            .copied()
            .filter(|id| !current.contains(id) && seen.insert(*id))
            .collect();
        let removed: Vec<Id> = if detach_existing {
            current.into_iter().filter(|id| !wanted.contains(id)).collect()
        } else {
            Vec::new()
        };

        Self::retain_rows(&mut rows, |row| {
            row.owner != *owner || row.group != group || !removed.contains(&row.media_id)
        });
        Self::insert_rows(&mut rows, owner, &added, group);

        Ok(GroupDiff { added, removed })
    }
}
