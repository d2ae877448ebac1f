//! Attachment Coordinator
//!
//! Attach, sync, and detach media for one owner. Conversion tasks are dispatched
//! for media entering a group that declares conversions; there is no ordering
//! between an association becoming visible and its conversions running.

use std::collections::HashSet;
use std::sync::Arc;

use media_core::traits::Id;
use media_jobs::{ConversionDispatcher, ConversionTask};
use media_library::{
    Media, MediaError, MediaGroups, MediaPaths, MediaStore, RegistersMediaGroups,
};
use media_storage::DiskManager;
use tracing::{debug, info, instrument, warn};

use crate::association::{AssociationStore, Owner};
use crate::error::{AttachError, AttachResult};

/// Group used when the caller does not name one
pub const DEFAULT_GROUP: &str = "default";

/// One or more media items, by id or by record
///
/// Normalised to a list of ids without repeats, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaRef {
    ids: Vec<Id>,
}

impl MediaRef {
    pub fn ids(&self) -> &[Id] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<Id> for MediaRef {
    fn from_iter<I: IntoIterator<Item = Id>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        Self {
            ids: iter.into_iter().filter(|id| seen.insert(*id)).collect(),
        }
    }
}

impl From<Id> for MediaRef {
    fn from(id: Id) -> Self {
        Self { ids: vec![id] }
    }
}

impl From<&Media> for MediaRef {
    fn from(media: &Media) -> Self {
        media.id.into()
    }
}

impl From<Media> for MediaRef {
    fn from(media: Media) -> Self {
        media.id.into()
    }
}

impl From<&[Id]> for MediaRef {
    fn from(ids: &[Id]) -> Self {
        ids.iter().copied().collect()
    }
}

impl<const N: usize> From<[Id; N]> for MediaRef {
    fn from(ids: [Id; N]) -> Self {
        ids.into_iter().collect()
    }
}

impl From<Vec<Id>> for MediaRef {
    fn from(ids: Vec<Id>) -> Self {
        ids.into_iter().collect()
    }
}

impl From<&[Media]> for MediaRef {
    fn from(media: &[Media]) -> Self {
        media.iter().map(|m| m.id).collect()
    }
}

impl From<Vec<Media>> for MediaRef {
    fn from(media: Vec<Media>) -> Self {
        media.iter().map(|m| m.id).collect()
    }
}

/// Shared collaborators, built once at startup and cloned into every coordinator
#[derive(Clone)]
pub struct MediaContext {
    pub media: Arc<dyn MediaStore>,
    pub associations: Arc<dyn AssociationStore>,
    pub dispatcher: Arc<dyn ConversionDispatcher>,
    pub disks: Arc<DiskManager>,
    pub paths: MediaPaths,
}

/// Media attachment behavior for one owner
pub struct AttachmentCoordinator {
    owner: Owner,
    groups: Arc<dyn RegistersMediaGroups>,
    context: MediaContext,
}

impl AttachmentCoordinator {
    pub fn new(owner: Owner, groups: Arc<dyn RegistersMediaGroups>, context: MediaContext) -> Self {
        Self {
            owner,
            groups,
            context,
        }
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Attach media to a group, dispatching the group's conversions plus `extra`
    ///
    /// Media already in the group is kept and converted again.
    #[instrument(skip(self, media, extra), fields(owner = %self.owner))]
    pub async fn attach(
        &self,
        media: impl Into<MediaRef>,
        group: &str,
        extra: &[&str],
    ) -> AttachResult<Vec<Id>> {
        let media = media.into();
        self.validate(&media).await?;

        let conversions = self.conversions_for(group, extra)?;
        self.dispatch(media.ids(), &conversions).await?;

        let created = self
            .context
            .associations
            .insert(&self.owner, media.ids(), group)
            .await?;

        info!(group = %group, media = ?media.ids(), created, "Media attached");
        Ok(media.ids().to_vec())
    }

    /// Make the group hold exactly `media`
    ///
    /// Existing members missing from `media` are removed only when `detach_existing`
    /// is set. Conversions are dispatched for media new to the group only. When
    /// dispatch fails the membership change is reverted, so a retry treats the
    /// same media as new again.
    #[instrument(skip(self, media, extra), fields(owner = %self.owner))]
    pub async fn sync(
        &self,
        media: impl Into<MediaRef>,
        group: &str,
        extra: &[&str],
        detach_existing: bool,
    ) -> AttachResult<Vec<Id>> {
        let target = media.into();
        self.validate(&target).await?;
        let conversions = self.conversions_for(group, extra)?;

        let diff = self
            .context
            .associations
            .sync_group(&self.owner, group, target.ids(), detach_existing)
            .await?;

        if let Err(err) = self.dispatch(&diff.added, &conversions).await {
            warn!(
                group = %group,
                added = ?diff.added,
                error = %err,
                "Dispatch failed, reverting sync"
            );
            self.context
                .associations
                .replace_group(&self.owner, group, &diff.removed, &diff.added)
                .await?;
            return Err(err);
        }

        info!(
            group = %group,
            added = ?diff.added,
            removed = ?diff.removed,
            "Media group synced"
        );
        self.group_ids(group).await
    }

    /// Remove associations for `media` in every group, or all of them when `None`
    #[instrument(skip(self, media), fields(owner = %self.owner))]
    pub async fn detach(&self, media: Option<MediaRef>) -> AttachResult<usize> {
        let removed = self
            .context
            .associations
            .remove(&self.owner, media.as_ref().map(MediaRef::ids))
            .await?;

        debug!(removed, "Media detached");
        Ok(removed)
    }

    /// Remove every association in one group
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn clear_group(&self, group: &str) -> AttachResult<usize> {
        let removed = self
            .context
            .associations
            .remove_group(&self.owner, group)
            .await?;

        debug!(removed, "Media group cleared");
        Ok(removed)
    }

    /// Media in a group, in attach order
    pub async fn get_media(&self, group: &str) -> AttachResult<Vec<Media>> {
        let ids = self.group_ids(group).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.context.media.get_many(&ids).await?)
    }

    pub async fn first_media(&self, group: &str) -> AttachResult<Option<Media>> {
        Ok(self.get_media(group).await?.into_iter().next())
    }

    pub async fn has_media(&self, group: &str) -> AttachResult<bool> {
        Ok(!self.group_ids(group).await?.is_empty())
    }

    /// URL of the first media in a group, optionally of one of its conversions
    pub async fn first_media_url(
        &self,
        group: &str,
        conversion: Option<&str>,
    ) -> AttachResult<Option<String>> {
        match self.first_media(group).await? {
            Some(media) => Ok(Some(self.context.paths.url(
                &self.context.disks,
                &media,
                conversion,
            )?)),
            None => Ok(None),
        }
    }

    async fn group_ids(&self, group: &str) -> AttachResult<Vec<Id>> {
        Ok(self
            .context
            .associations
            .list(&self.owner)
            .await?
            .into_iter()
            .filter(|row| row.group == group)
            .map(|row| row.media_id)
            .collect())
    }

    /// Every id must resolve to an existing media record
    async fn validate(&self, media: &MediaRef) -> AttachResult<()> {
        let found: HashSet<Id> = self
            .context
            .media
            .get_many(media.ids())
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();

        match media.ids().iter().find(|id| !found.contains(id)) {
            Some(&missing) => Err(AttachError::InvalidMediaReference(missing)),
            None => Ok(()),
        }
    }

    /// Group conversions followed by `extra`, without repeats
    ///
    /// Every name must be registered, so nothing is dispatched for a task the
    /// worker could never run.
    fn conversions_for(&self, group: &str, extra: &[&str]) -> AttachResult<Vec<String>> {
        let mut groups = MediaGroups::new();
        self.groups.register_media_groups(&mut groups);

        let mut seen = HashSet::new();
        let conversions: Vec<String> = groups
            .conversions_for(group)
            .iter()
            .map(String::as_str)
            .chain(extra.iter().copied())
            .filter(|name| seen.insert(*name))
            .map(str::to_string)
            .collect();

        let registry = self.context.paths.registry();
        match conversions.iter().find(|name| !registry.exists(name)) {
            Some(unknown) => Err(MediaError::UnknownConversion(unknown.clone()).into()),
            None => Ok(conversions),
        }
    }

    async fn dispatch(&self, ids: &[Id], conversions: &[String]) -> AttachResult<()> {
        if conversions.is_empty() {
            return Ok(());
        }

        for &media_id in ids {
            self.context
                .dispatcher
                .dispatch(ConversionTask::new(media_id, conversions.iter().cloned()))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use media_jobs::{JobError, JobResult};
    use media_library::{
        ConverterRegistry, DefaultPathGenerator, ImageConverter, MemoryMediaStore, NewMedia,
    };
    use media_storage::MemoryStorage;

    use super::*;
    use crate::association::MemoryAssociationStore;

    #[derive(Default)]
    struct RecordingDispatcher {
        tasks: Mutex<Vec<ConversionTask>>,
        unavailable: AtomicBool,
    }

    impl RecordingDispatcher {
        fn tasks(&self) -> Vec<ConversionTask> {
            self.tasks.lock().unwrap().clone()
        }

        fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ConversionDispatcher for RecordingDispatcher {
        async fn dispatch(&self, task: ConversionTask) -> JobResult<()> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(JobError::QueueError("queue unavailable".to_string()));
            }
            self.tasks.lock().unwrap().push(task);
            Ok(())
        }
    }

    /// Owner declaring `default` with a resize and `gallery` without conversions
    #[derive(Default)]
    struct Post {
        registrations: AtomicUsize,
    }

    impl RegistersMediaGroups for Post {
        fn register_media_groups(&self, groups: &mut MediaGroups) {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            groups.add(DEFAULT_GROUP).perform_conversions(["resize"]);
            groups.add("gallery");
        }
    }

    struct Fixture {
        post: Arc<Post>,
        dispatcher: Arc<RecordingDispatcher>,
        coordinator: AttachmentCoordinator,
        media: Vec<Media>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryMediaStore::new());
        let mut media = Vec::new();
        for file_name in ["one.png", "two.png", "three.png"] {
            let created = store
                .create(NewMedia {
                    name: file_name.to_string(),
                    file_name: file_name.to_string(),
                    mime_type: "image/png".to_string(),
                    size: 10,
                    disk: "public".to_string(),
                })
                .await
                .unwrap();
            media.push(created);
        }

        let mut registry = ConverterRegistry::new();
        registry
            .register("resize", ImageConverter::thumbnail(100, 100))
            .unwrap();
        registry
            .register("thumb", ImageConverter::thumbnail(32, 32))
            .unwrap();

        let dispatcher = Arc::new(RecordingDispatcher::default());
        let context = MediaContext {
            media: store,
            associations: Arc::new(MemoryAssociationStore::new()),
            dispatcher: dispatcher.clone(),
            disks: Arc::new(
                DiskManager::new()
                    .with_disk("public", Arc::new(MemoryStorage::with_base_url("/media"))),
            ),
            paths: MediaPaths::new(Arc::new(DefaultPathGenerator), Arc::new(registry)),
        };

        let post = Arc::new(Post::default());
        let coordinator = AttachmentCoordinator::new(Owner::new("Post", 1), post.clone(), context);

        Fixture {
            post,
            dispatcher,
            coordinator,
            media,
        }
    }

    fn ids(media: &[Media]) -> Vec<Id> {
        media.iter().map(|m| m.id).collect()
    }

    #[test]
    fn test_media_ref_normalises() {
        let media = Media::new(5, "a", "a.png", "image/png", 1, "public");

        assert_eq!(MediaRef::from(3_i64).ids(), &[3]);
        assert_eq!(MediaRef::from(&media).ids(), &[5]);
        assert_eq!(MediaRef::from(vec![2, 1, 2, 3, 1]).ids(), &[2, 1, 3]);
        assert_eq!(MediaRef::from(vec![media.clone(), media]).ids(), &[5]);
        assert!(MediaRef::from(Vec::<Id>::new()).is_empty());
    }

    #[tokio::test]
    async fn test_attach_dispatches_one_task_per_media() {
        let f = fixture().await;
        let (m1, m2) = (&f.media[0], &f.media[1]);

        let attached = f
            .coordinator
            .attach(vec![m1.clone(), m2.clone()], DEFAULT_GROUP, &[])
            .await
            .unwrap();

        assert_eq!(attached, vec![m1.id, m2.id]);
        assert_eq!(
            f.dispatcher.tasks(),
            vec![
                ConversionTask::new(m1.id, ["resize"]),
                ConversionTask::new(m2.id, ["resize"]),
            ]
        );
        assert_eq!(f.post.registrations.load(Ordering::SeqCst), 1);
        assert_eq!(ids(&f.coordinator.get_media(DEFAULT_GROUP).await.unwrap()), attached);
    }

    #[tokio::test]
    async fn test_attach_merges_extra_conversions() {
        let f = fixture().await;

        f.coordinator
            .attach(f.media[0].id, DEFAULT_GROUP, &["thumb", "resize"])
            .await
            .unwrap();
        f.coordinator
            .attach(f.media[1].id, "gallery", &["thumb"])
            .await
            .unwrap();

        assert_eq!(
            f.dispatcher.tasks(),
            vec![
                ConversionTask::new(f.media[0].id, ["resize", "thumb"]),
                ConversionTask::new(f.media[1].id, ["thumb"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_attach_rejects_unregistered_conversion() {
        let f = fixture().await;

        let result = f
            .coordinator
            .attach(f.media[0].id, "gallery", &["thumb", "sepia"])
            .await;

        assert!(matches!(
            result,
            Err(AttachError::Media(MediaError::UnknownConversion(name))) if name == "sepia"
        ));
        assert!(f.dispatcher.tasks().is_empty());
        assert!(!f.coordinator.has_media("gallery").await.unwrap());
    }

    #[tokio::test]
    async fn test_attach_without_conversions_dispatches_nothing() {
        let f = fixture().await;

        f.coordinator
            .attach([f.media[0].id, f.media[1].id], "gallery", &[])
            .await
            .unwrap();

        assert!(f.dispatcher.tasks().is_empty());
        assert_eq!(f.coordinator.get_media("gallery").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_attach_twice_keeps_one_association() {
        let f = fixture().await;

        f.coordinator.attach(f.media[0].id, "gallery", &[]).await.unwrap();
        f.coordinator.attach(f.media[0].id, "gallery", &[]).await.unwrap();

        assert_eq!(f.coordinator.get_media("gallery").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_attach_rejects_unknown_media() {
        let f = fixture().await;

        let result = f
            .coordinator
            .attach([f.media[0].id, 99], DEFAULT_GROUP, &[])
            .await;

        assert!(matches!(result, Err(AttachError::InvalidMediaReference(99))));
        assert!(f.dispatcher.tasks().is_empty());
        assert!(!f.coordinator.has_media(DEFAULT_GROUP).await.unwrap());
    }

    #[tokio::test]
    async fn test_sync_dispatches_only_for_new_media() {
        let f = fixture().await;
        let (m1, m2, m3) = (f.media[0].id, f.media[1].id, f.media[2].id);

        f.coordinator.attach([m1, m2], DEFAULT_GROUP, &[]).await.unwrap();
        let before = f.dispatcher.tasks().len();

        let synced = f
            .coordinator
            .sync([m2, m3], DEFAULT_GROUP, &[], true)
            .await
            .unwrap();

        assert_eq!(synced, vec![m2, m3]);
        assert_eq!(
            f.dispatcher.tasks()[before..].to_vec(),
            vec![ConversionTask::new(m3, ["resize"])]
        );
    }

    #[tokio::test]
    async fn test_sync_reverts_when_dispatch_fails() {
        let f = fixture().await;
        let (m1, m2, m3) = (f.media[0].id, f.media[1].id, f.media[2].id);

        f.coordinator.attach([m1, m2], DEFAULT_GROUP, &[]).await.unwrap();
        let before = f.dispatcher.tasks().len();

        f.dispatcher.set_unavailable(true);
        let result = f.coordinator.sync([m2, m3], DEFAULT_GROUP, &[], true).await;
        assert!(matches!(result, Err(AttachError::Dispatch(_))));

        let mut members = ids(&f.coordinator.get_media(DEFAULT_GROUP).await.unwrap());
        members.sort();
        assert_eq!(members, vec![m1, m2]);

        f.dispatcher.set_unavailable(false);
        let synced = f
            .coordinator
            .sync([m2, m3], DEFAULT_GROUP, &[], true)
            .await
            .unwrap();

        assert_eq!(synced, vec![m2, m3]);
        assert_eq!(
            f.dispatcher.tasks()[before..].to_vec(),
            vec![ConversionTask::new(m3, ["resize"])]
        );
    }

    #[tokio::test]
    async fn test_sync_rejects_unregistered_conversion() {
        let f = fixture().await;
        let m1 = f.media[0].id;

        let result = f.coordinator.sync(m1, "gallery", &["sepia"], true).await;

        assert!(matches!(
            result,
            Err(AttachError::Media(MediaError::UnknownConversion(_)))
        ));
        assert!(!f.coordinator.has_media("gallery").await.unwrap());
    }

    #[tokio::test]
    async fn test_sync_without_detach_keeps_existing() {
        let f = fixture().await;
        let (m1, m2, m3) = (f.media[0].id, f.media[1].id, f.media[2].id);

        f.coordinator.attach([m1, m2], "gallery", &[]).await.unwrap();
        let synced = f
            .coordinator
            .sync([m2, m3], "gallery", &[], false)
            .await
            .unwrap();

        assert_eq!(synced, vec![m1, m2, m3]);
    }

    #[tokio::test]
    async fn test_sync_only_touches_its_group() {
        let f = fixture().await;
        let (m1, m2) = (f.media[0].id, f.media[1].id);

        f.coordinator.attach(m1, "gallery", &[]).await.unwrap();
        f.coordinator.sync(m2, DEFAULT_GROUP, &[], true).await.unwrap();

        assert_eq!(ids(&f.coordinator.get_media("gallery").await.unwrap()), vec![m1]);
        assert_eq!(ids(&f.coordinator.get_media(DEFAULT_GROUP).await.unwrap()), vec![m2]);
    }

    #[tokio::test]
    async fn test_empty_group_reads() {
        let f = fixture().await;

        assert!(f.coordinator.get_media("gallery").await.unwrap().is_empty());
        assert!(f.coordinator.first_media("gallery").await.unwrap().is_none());
        assert!(!f.coordinator.has_media("gallery").await.unwrap());
        assert!(f
            .coordinator
            .first_media_url("gallery", None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_detach_one() {
        let f = fixture().await;
        let (m1, m2) = (f.media[0].id, f.media[1].id);

        f.coordinator.attach([m1, m2], DEFAULT_GROUP, &[]).await.unwrap();
        f.coordinator.detach(Some(m1.into())).await.unwrap();

        assert_eq!(ids(&f.coordinator.get_media(DEFAULT_GROUP).await.unwrap()), vec![m2]);
    }

    #[tokio::test]
    async fn test_detach_all_and_clear_group() {
        let f = fixture().await;
        let (m1, m2, m3) = (f.media[0].id, f.media[1].id, f.media[2].id);

        f.coordinator.attach([m1, m2], "gallery", &[]).await.unwrap();
        f.coordinator.attach(m3, DEFAULT_GROUP, &[]).await.unwrap();

        assert_eq!(f.coordinator.clear_group("gallery").await.unwrap(), 2);
        assert!(f.coordinator.has_media(DEFAULT_GROUP).await.unwrap());

        assert_eq!(f.coordinator.detach(None).await.unwrap(), 1);
        assert!(!f.coordinator.has_media(DEFAULT_GROUP).await.unwrap());
    }

    #[tokio::test]
    async fn test_first_media_url() {
        let f = fixture().await;
        let (m1, m2) = (f.media[0].id, f.media[1].id);

        f.coordinator.attach([m2, m1], "gallery", &[]).await.unwrap();

        assert_eq!(
            f.coordinator.first_media_url("gallery", None).await.unwrap(),
            Some("/media/2/two.png".to_string())
        );
        assert_eq!(
            f.coordinator
                .first_media_url("gallery", Some("resize"))
                .await
                .unwrap(),
            Some("/media/2/resize/two.png".to_string())
        );
        assert!(f
            .coordinator
            .first_media_url("gallery", Some("missing"))
            .await
            .is_err());
    }
}
