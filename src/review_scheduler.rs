use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::StudyError;
use crate::models::{DueReview, ReviewSchedule};
use crate::storage::{StudyStore, WriteGuard};
use crate::{log_service_start, log_service_success};

pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
pub const MAX_INTERVAL_DAYS: u32 = 30;

/// Days until the next review given the interval that was last stored.
///
/// Classic SM-2 uses 1 day, then 6 days, then doubling. Here the 6-day
/// step is never taken: an interval of 1 stays at 1 and every other
/// interval doubles up to [`MAX_INTERVAL_DAYS`]. Changing that is a
/// product decision, so the observed behaviour is kept.
pub fn next_interval(previous_days: u32) -> u32 {
    let previous_days = previous_days.max(1);
    if previous_days == 1 {
        return 1;
    }
    previous_days.saturating_mul(2).min(MAX_INTERVAL_DAYS)
}

/// Platform timer used to wake the host when a review falls due.
pub trait ReviewTrigger: Send + Sync {
    fn arm(&self, item_id: &str, when: DateTime<Utc>);

    fn disarm(&self, item_id: &str);
}

/// Trigger that does nothing, for hosts that poll `due_reviews` instead
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTrigger;

impl ReviewTrigger for NoopTrigger {
    fn arm(&self, _item_id: &str, _when: DateTime<Utc>) {}

    fn disarm(&self, _item_id: &str) {}
}

/// One tokio task per armed item. When a timer fires the item id is sent on
/// the channel returned by [`TimerTrigger::new`]. Must be used inside a
/// tokio runtime; dropping the trigger aborts every pending timer.
pub struct TimerTrigger {
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    fired_tx: mpsc::UnboundedSender<String>,
}

impl TimerTrigger {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let trigger = Self {
            timers: Mutex::new(HashMap::new()),
            fired_tx,
        };
        (trigger, fired_rx)
    }

    pub fn armed_count(&self) -> usize {
        self.timers
            .lock()
            .map(|timers| timers.values().filter(|handle| !handle.is_finished()).count())
            .unwrap_or(0)
    }
}

impl ReviewTrigger for TimerTrigger {
    fn arm(&self, item_id: &str, when: DateTime<Utc>) {
        let delay = (when - Utc::now()).to_std().unwrap_or_default();
        let fired_tx = self.fired_tx.clone();
        let id = item_id.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(item_id = %id, "Review trigger fired");
            // Receiver gone means the host is shutting down
            let _ = fired_tx.send(id);
        });

        if let Ok(mut timers) = self.timers.lock() {
            timers.retain(|_, handle| !handle.is_finished());
            if let Some(previous) = timers.insert(item_id.to_string(), handle) {
                previous.abort();
            }
        }
    }

    fn disarm(&self, item_id: &str) {
        if let Ok(mut timers) = self.timers.lock() {
            if let Some(handle) = timers.remove(item_id) {
                handle.abort();
            }
        }
    }
}

impl Drop for TimerTrigger {
    fn drop(&mut self) {
        if let Ok(timers) = self.timers.get_mut() {
            for (_, handle) in timers.drain() {
                handle.abort();
            }
        }
    }
}

/// Spaced-review scheduling over the persisted schedule map
#[derive(Clone)]
pub struct ReviewScheduler {
    store: StudyStore,
    trigger: Arc<dyn ReviewTrigger>,
}

impl ReviewScheduler {
    pub fn new(store: StudyStore, trigger: Arc<dyn ReviewTrigger>) -> Self {
        Self { store, trigger }
    }

    pub fn next_interval(previous_days: u32) -> u32 {
        next_interval(previous_days)
    }

    /// Overwrite the schedule for `item_id` so it falls due at `when`.
    pub async fn schedule_review(
        &self,
        item_id: &str,
        when: DateTime<Utc>,
    ) -> Result<ReviewSchedule, StudyError> {
        if item_id.trim().is_empty() {
            return Err(StudyError::InvalidInput("item id must not be empty".to_string()));
        }
        log_service_start!("review_scheduler", "schedule_review", item_id = item_id);

        let guard = self.store.write_lock().await;
        let schedule = self.schedule_review_locked(&guard, item_id, when).await?;

        log_service_success!(
            "review_scheduler",
            "schedule_review",
            item_id = item_id,
            format!(
                "due {} (interval {} days, repetition {})",
                schedule.next_review_at.to_rfc3339(),
                schedule.interval_days,
                schedule.repetitions
            )
        );
        Ok(schedule)
    }

    pub(crate) async fn schedule_review_locked(
        &self,
        guard: &WriteGuard<'_>,
        item_id: &str,
        when: DateTime<Utc>,
    ) -> Result<ReviewSchedule, StudyError> {
        let mut schedules = self.store.load_schedules().await?;
        let existing = schedules.get(item_id);

        let schedule = ReviewSchedule {
            next_review_at: when,
            interval_days: next_interval(existing.map(|s| s.interval_days).unwrap_or(1)),
            ease_factor: existing.map(|s| s.ease_factor).unwrap_or(DEFAULT_EASE_FACTOR),
            repetitions: existing.map(|s| s.repetitions + 1).unwrap_or(1),
        };

        schedules.insert(item_id.to_string(), schedule.clone());
        self.store.save_schedules(guard, &schedules).await?;

        self.trigger.disarm(item_id);
        self.trigger.arm(item_id, when);

        Ok(schedule)
    }

    /// Remove the schedule and its timer. Returns whether an entry existed;
    /// cancelling an unscheduled item is not an error.
    pub async fn cancel_review(&self, item_id: &str) -> Result<bool, StudyError> {
        let guard = self.store.write_lock().await;
        self.cancel_review_locked(&guard, item_id).await
    }

    pub(crate) async fn cancel_review_locked(
        &self,
        guard: &WriteGuard<'_>,
        item_id: &str,
    ) -> Result<bool, StudyError> {
        let mut schedules = self.store.load_schedules().await?;
        let removed = schedules.remove(item_id).is_some();
        if removed {
            self.store.save_schedules(guard, &schedules).await?;
        }
        self.trigger.disarm(item_id);

        debug!(item_id = %item_id, removed, "Review cancelled");
        Ok(removed)
    }

    pub async fn get_schedule(&self, item_id: &str) -> Result<Option<ReviewSchedule>, StudyError> {
        Ok(self.store.load_schedules().await?.remove(item_id))
    }

    /// Reviews whose due time is at or before `now`, soonest first
    pub async fn due_reviews(&self, now: DateTime<Utc>) -> Result<Vec<DueReview>, StudyError> {
        let mut due: Vec<DueReview> = self
            .store
            .load_schedules()
            .await?
            .into_iter()
            .filter(|(_, schedule)| schedule.next_review_at <= now)
            .map(|(item_id, schedule)| DueReview { item_id, schedule })
            .collect();

        due.sort_by_key(|review| review.schedule.next_review_at);
        Ok(due)
    }

    /// When the next review should land if the item is rescheduled at `now`
    pub async fn next_review_time(
        &self,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, StudyError> {
        let previous = self
            .get_schedule(item_id)
            .await?
            .map(|schedule| schedule.interval_days)
            .unwrap_or(1);
        Ok(now + Duration::days(i64::from(next_interval(previous))))
    }

    /// Re-arm timers for every persisted schedule, e.g. after a restart
    pub async fn restore_triggers(&self) -> Result<usize, StudyError> {
        let schedules = self.store.load_schedules().await?;
        for (item_id, schedule) in &schedules {
            self.trigger.disarm(item_id);
            self.trigger.arm(item_id, schedule.next_review_at);
        }
        info!(count = schedules.len(), "Restored review triggers");
        Ok(schedules.len())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records arm/disarm calls so tests can assert on trigger side effects
    #[derive(Default)]
    pub(crate) struct RecordingTrigger {
        pub(crate) events: Mutex<Vec<String>>,
        pub(crate) armed: Mutex<HashMap<String, DateTime<Utc>>>,
    }

    impl ReviewTrigger for RecordingTrigger {
        fn arm(&self, item_id: &str, when: DateTime<Utc>) {
            self.events.lock().unwrap().push(format!("arm:{}", item_id));
            self.armed.lock().unwrap().insert(item_id.to_string(), when);
        }

        fn disarm(&self, item_id: &str) {
            self.events.lock().unwrap().push(format!("disarm:{}", item_id));
            self.armed.lock().unwrap().remove(item_id);
        }
    }

    fn scheduler() -> (ReviewScheduler, Arc<RecordingTrigger>) {
        let trigger = Arc::new(RecordingTrigger::default());
        let scheduler = ReviewScheduler::new(StudyStore::in_memory(), trigger.clone());
        (scheduler, trigger)
    }

    #[test]
    fn test_next_interval_table() {
        assert_eq!(next_interval(1), 1);
        assert_eq!(next_interval(2), 4);
        assert_eq!(next_interval(3), 6);
        assert_eq!(next_interval(15), 30);
        assert_eq!(next_interval(16), 30);
        assert_eq!(next_interval(20), 30);
        assert_eq!(next_interval(30), 30);
        assert_eq!(next_interval(0), 1);
        assert_eq!(next_interval(u32::MAX), 30);
    }

    #[test]
    fn test_interval_never_reaches_six_from_one() {
        // Repeated scheduling from the default interval stays at one day
        let mut interval = 1;
        for _ in 0..10 {
            interval = next_interval(interval);
        }
        assert_eq!(interval, 1);
    }

    #[tokio::test]
    async fn test_first_schedule_defaults() {
        let (scheduler, trigger) = scheduler();
        let when = Utc::now() + Duration::days(1);

        let schedule = scheduler.schedule_review("vid-1", when).await.unwrap();

        assert_eq!(schedule.next_review_at, when);
        assert_eq!(schedule.interval_days, 1);
        assert_eq!(schedule.repetitions, 1);
        assert_eq!(schedule.ease_factor, DEFAULT_EASE_FACTOR);
        assert_eq!(trigger.armed.lock().unwrap().get("vid-1"), Some(&when));
        assert_eq!(
            *trigger.events.lock().unwrap(),
            vec!["disarm:vid-1".to_string(), "arm:vid-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reschedule_increments_repetitions_and_keeps_ease() {
        let (scheduler, _trigger) = scheduler();
        let now = Utc::now();

        scheduler.schedule_review("vid-1", now).await.unwrap();
        let second = scheduler
            .schedule_review("vid-1", now + Duration::days(3))
            .await
            .unwrap();

        assert_eq!(second.repetitions, 2);
        assert_eq!(second.interval_days, 1);
        assert_eq!(second.ease_factor, DEFAULT_EASE_FACTOR);
        assert_eq!(second.next_review_at, now + Duration::days(3));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (scheduler, trigger) = scheduler();
        scheduler.schedule_review("vid-1", Utc::now()).await.unwrap();

        assert!(scheduler.cancel_review("vid-1").await.unwrap());
        assert!(!scheduler.cancel_review("vid-1").await.unwrap());
        assert!(!scheduler.cancel_review("never-scheduled").await.unwrap());

        assert!(scheduler.get_schedule("vid-1").await.unwrap().is_none());
        assert!(trigger.armed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_due_reviews_sorted_and_filtered() {
        let (scheduler, _trigger) = scheduler();
        let now = Utc::now();

        scheduler.schedule_review("later", now + Duration::days(2)).await.unwrap();
        scheduler.schedule_review("old", now - Duration::days(3)).await.unwrap();
        scheduler.schedule_review("recent", now - Duration::hours(1)).await.unwrap();

        let due = scheduler.due_reviews(now).await.unwrap();
        let ids: Vec<&str> = due.iter().map(|review| review.item_id.as_str()).collect();
        assert_eq!(ids, vec!["old", "recent"]);
    }

    #[tokio::test]
    async fn test_next_review_time_uses_next_interval() {
        let (scheduler, _trigger) = scheduler();
        let now = Utc::now();

        assert_eq!(
            scheduler.next_review_time("unscheduled", now).await.unwrap(),
            now + Duration::days(1)
        );
    }

    #[tokio::test]
    async fn test_empty_item_id_rejected() {
        let (scheduler, _trigger) = scheduler();
        assert!(matches!(
            scheduler.schedule_review("  ", Utc::now()).await,
            Err(StudyError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_triggers_rearms_everything() {
        let store = StudyStore::in_memory();
        let first = ReviewScheduler::new(store.clone(), Arc::new(NoopTrigger));
        first.schedule_review("a", Utc::now()).await.unwrap();
        first.schedule_review("b", Utc::now()).await.unwrap();

        let trigger = Arc::new(RecordingTrigger::default());
        let restarted = ReviewScheduler::new(store, trigger.clone());
        assert_eq!(restarted.restore_triggers().await.unwrap(), 2);
        assert_eq!(trigger.armed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_timer_trigger_fires_and_disarms() {
        let (trigger, mut fired) = TimerTrigger::new();

        trigger.arm("soon", Utc::now());
        trigger.arm("later", Utc::now() + Duration::days(1));
        trigger.disarm("later");

        let id = tokio::time::timeout(std::time::Duration::from_secs(5), fired.recv())
            .await
            .unwrap();
        assert_eq!(id.as_deref(), Some("soon"));
        assert!(fired.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_timer_trigger_counts_pending_timers() {
        let (trigger, _fired) = TimerTrigger::new();
        trigger.arm("a", Utc::now() + Duration::days(1));
        trigger.arm("b", Utc::now() + Duration::days(2));
        assert_eq!(trigger.armed_count(), 2);

        trigger.disarm("a");
        trigger.disarm("missing");
        assert_eq!(trigger.armed_count(), 1);
    }

    #[tokio::test]
    async fn test_timer_trigger_rearm_replaces_previous_timer() {
        let (trigger, mut fired) = TimerTrigger::new();

        trigger.arm("vid", Utc::now() + Duration::days(1));
        trigger.arm("vid", Utc::now());

        let id = tokio::time::timeout(std::time::Duration::from_secs(5), fired.recv())
            .await
            .unwrap();
        assert_eq!(id.as_deref(), Some("vid"));
        assert!(fired.try_recv().is_err());
    }
}
