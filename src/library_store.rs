use chrono::Utc;

use crate::errors::StudyError;
use crate::models::{LibraryItem, LibraryItemUpdate};
use crate::review_scheduler::ReviewScheduler;
use crate::storage::StudyStore;
use crate::{log_service_error, log_service_start, log_service_success};

/// The persisted collection of tracked videos.
///
/// Every mutation reloads the whole collection, changes it and writes it
/// back while holding the store's write lock.
#[derive(Clone)]
pub struct LibraryStore {
    store: StudyStore,
    scheduler: ReviewScheduler,
}

impl LibraryStore {
    pub fn new(store: StudyStore, scheduler: ReviewScheduler) -> Self {
        Self { store, scheduler }
    }

    /// Insert a new item or merge the given fields into the stored one.
    pub async fn upsert(&self, update: LibraryItemUpdate) -> Result<LibraryItem, StudyError> {
        if update.item_id.trim().is_empty() {
            return Err(StudyError::InvalidInput("item id must not be empty".to_string()));
        }
        log_service_start!("library_store", "upsert", item_id = update.item_id);

        let guard = self.store.write_lock().await;
        let mut items = self.store.load_library().await?;

        let stored = match items.iter_mut().find(|item| item.item_id == update.item_id) {
            Some(existing) => {
                let merged = existing.merged_with(update);
                *existing = merged.clone();
                merged
            }
            None => {
                let item = LibraryItem::from_update(update, Utc::now());
                items.push(item.clone());
                item
            }
        };

        self.store.save_library(&guard, &items).await?;

        log_service_success!("library_store", "upsert", item_id = stored.item_id, "item stored");
        Ok(stored)
    }

    pub async fn get(&self, item_id: &str) -> Result<Option<LibraryItem>, StudyError> {
        Ok(self
            .store
            .load_library()
            .await?
            .into_iter()
            .find(|item| item.item_id == item_id))
    }

    /// Delete the item and cancel its review. Returns whether the item existed.
    pub async fn remove(&self, item_id: &str) -> Result<bool, StudyError> {
        log_service_start!("library_store", "remove", item_id = item_id);

        let guard = self.store.write_lock().await;
        let mut items = self.store.load_library().await?;
        let before = items.len();
        items.retain(|item| item.item_id != item_id);
        let removed = items.len() != before;

        if removed {
            self.store.save_library(&guard, &items).await?;
        }
        self.scheduler
            .cancel_review_locked(&guard, item_id)
            .await
            .inspect_err(|e| {
                log_service_error!("library_store", "remove", item_id = item_id, error = e);
            })?;

        log_service_success!(
            "library_store",
            "remove",
            item_id = item_id,
            if removed { "item removed" } else { "item was not in library" }
        );
        Ok(removed)
    }

    pub async fn record_study_session(&self, item_id: &str) -> Result<LibraryItem, StudyError> {
        let guard = self.store.write_lock().await;
        let mut items = self.store.load_library().await?;

        let item = items
            .iter_mut()
            .find(|item| item.item_id == item_id)
            .ok_or_else(|| StudyError::NotFound(format!("library item '{}'", item_id)))?;

        item.study_count += 1;
        item.last_studied_at = Some(Utc::now());
        let updated = item.clone();

        self.store.save_library(&guard, &items).await?;

        log_service_success!(
            "library_store",
            "record_study_session",
            item_id = item_id,
            format!("study count now {}", updated.study_count)
        );
        Ok(updated)
    }

    /// All items in insertion order
    pub async fn list_all(&self) -> Result<Vec<LibraryItem>, StudyError> {
        self.store.load_library().await
    }

    pub async fn list_by_tag(&self, tag: &str) -> Result<Vec<LibraryItem>, StudyError> {
        let tag = tag.trim();
        Ok(self
            .store
            .load_library()
            .await?
            .into_iter()
            .filter(|item| item.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Difficulty;
    use crate::review_scheduler::tests::RecordingTrigger;
    use std::sync::Arc;

    fn create_test_store() -> (LibraryStore, ReviewScheduler, Arc<RecordingTrigger>) {
        let store = StudyStore::in_memory();
        let trigger = Arc::new(RecordingTrigger::default());
        let scheduler = ReviewScheduler::new(store.clone(), trigger.clone());
        (LibraryStore::new(store, scheduler.clone()), scheduler, trigger)
    }

    #[tokio::test]
    async fn test_upsert_new_item_has_defaults() {
        let (library, _, _) = create_test_store();

        library
            .upsert(LibraryItemUpdate::new("vid-1").with_title("Lifetimes explained"))
            .await
            .unwrap();

        let item = library.get("vid-1").await.unwrap().unwrap();
        assert_eq!(item.title, "Lifetimes explained");
        assert_eq!(item.study_count, 0);
        assert!(item.last_studied_at.is_none());
        assert_eq!(item.difficulty, Difficulty::Medium);
        assert!(item.tags.is_empty());
        assert_eq!(item.notes, "");
    }

    #[tokio::test]
    async fn test_partial_upsert_preserves_other_fields() {
        let (library, _, _) = create_test_store();

        library
            .upsert(
                LibraryItemUpdate::new("vid-1")
                    .with_title("Original")
                    .with_channel("Crab Talks")
                    .with_difficulty(Difficulty::Hard)
                    .with_tags(vec!["rust".to_string()]),
            )
            .await
            .unwrap();
        library.record_study_session("vid-1").await.unwrap();

        let merged = library
            .upsert(LibraryItemUpdate::new("vid-1").with_notes("rewatch the end"))
            .await
            .unwrap();

        assert_eq!(merged.title, "Original");
        assert_eq!(merged.channel, "Crab Talks");
        assert_eq!(merged.difficulty, Difficulty::Hard);
        assert_eq!(merged.tags, vec!["rust".to_string()]);
        assert_eq!(merged.notes, "rewatch the end");
        assert_eq!(merged.study_count, 1);
        assert_eq!(library.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_study_session() {
        let (library, _, _) = create_test_store();
        library.upsert(LibraryItemUpdate::new("vid-1")).await.unwrap();

        library.record_study_session("vid-1").await.unwrap();
        let item = library.record_study_session("vid-1").await.unwrap();

        assert_eq!(item.study_count, 2);
        assert!(item.last_studied_at.is_some());
    }

    #[tokio::test]
    async fn test_record_study_session_missing_item() {
        let (library, _, _) = create_test_store();
        assert!(matches!(
            library.record_study_session("ghost").await,
            Err(StudyError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_cancels_review() {
        let (library, scheduler, trigger) = create_test_store();
        library.upsert(LibraryItemUpdate::new("vid-1")).await.unwrap();
        scheduler.schedule_review("vid-1", Utc::now()).await.unwrap();

        assert!(library.remove("vid-1").await.unwrap());

        assert!(library.get("vid-1").await.unwrap().is_none());
        assert!(scheduler.get_schedule("vid-1").await.unwrap().is_none());
        assert!(trigger.armed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_missing_item_is_not_an_error() {
        let (library, _, trigger) = create_test_store();
        assert!(!library.remove("ghost").await.unwrap());
        assert_eq!(*trigger.events.lock().unwrap(), vec!["disarm:ghost".to_string()]);
    }

    #[tokio::test]
    async fn test_list_all_keeps_insertion_order() {
        let (library, _, _) = create_test_store();
        for id in ["c", "a", "b"] {
            library.upsert(LibraryItemUpdate::new(id)).await.unwrap();
        }
        library.upsert(LibraryItemUpdate::new("a").with_title("updated")).await.unwrap();

        let ids: Vec<String> = library
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.item_id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_list_by_tag() {
        let (library, _, _) = create_test_store();
        library
            .upsert(LibraryItemUpdate::new("a").with_tags(vec!["Rust".to_string()]))
            .await
            .unwrap();
        library
            .upsert(LibraryItemUpdate::new("b").with_tags(vec!["go".to_string()]))
            .await
            .unwrap();

        let tagged = library.list_by_tag("rust").await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].item_id, "a");
    }

    #[tokio::test]
    async fn test_empty_item_id_rejected() {
        let (library, _, _) = create_test_store();
        assert!(matches!(
            library.upsert(LibraryItemUpdate::new("")).await,
            Err(StudyError::InvalidInput(_))
        ));
    }
}
