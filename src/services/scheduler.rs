//! In-process timer scheduler
//!
//! A `SchedulerPort` backed by tokio sleep tasks, for hosts without an OS
//! alarm service and for end-to-end tests. Each armed timer is one spawned
//! task that delivers a `FireEvent` over an mpsc channel when it elapses;
//! the receiving half is normally wired to `AlarmService::spawn_dispatcher`.

use crate::clock::Clock;
use crate::config::FIRE_CHANNEL_CAPACITY;
use crate::error::Result;
use crate::ports::{FireKind, SchedulerPort};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// A timer elapsing for an alarm id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireEvent {
    pub id: i64,
    pub kind: FireKind,
}

/// Tokio-backed one-shot timer scheduler.
pub struct TokioScheduler {
    clock: Arc<dyn Clock>,
    tx: mpsc::Sender<FireEvent>,
    armed: Mutex<HashMap<(i64, FireKind), JoinHandle<()>>>,
}

impl TokioScheduler {
    /// Create a scheduler and the receiving half of its fire channel.
    pub fn new(clock: Arc<dyn Clock>) -> (Arc<Self>, mpsc::Receiver<FireEvent>) {
        let (tx, rx) = mpsc::channel(FIRE_CHANNEL_CAPACITY);
        (
            Arc::new(Self {
                clock,
                tx,
                armed: Mutex::new(HashMap::new()),
            }),
            rx,
        )
    }

    async fn abort_timer(&self, id: i64, kind: FireKind) {
        let mut armed = self.armed.lock().await;
        if let Some(handle) = armed.remove(&(id, kind)) {
            handle.abort();
            tracing::debug!("Cancelled {:?} timer for alarm {}", kind, id);
        }
    }
}

#[async_trait]
impl SchedulerPort for TokioScheduler {
    async fn arm(&self, id: i64, kind: FireKind, at_epoch_ms: i64) -> Result<()> {
        // Replace any timer already armed for this id/kind pair so a fire is
        // never delivered twice.
        self.abort_timer(id, kind).await;

        let delay_ms = (at_epoch_ms - self.clock.now_utc().timestamp_millis()).max(0) as u64;
        let tx = self.tx.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            if tx.send(FireEvent { id, kind }).await.is_err() {
                tracing::warn!("Fire channel closed; dropping fire for alarm {}", id);
            }
        });

        let mut armed = self.armed.lock().await;
        if let Some(old) = armed.insert((id, kind), handle) {
            // Two arms raced for the same pair; the newest wins.
            old.abort();
        }

        tracing::debug!(
            "Armed {:?} timer for alarm {} in {}ms",
            kind,
            id,
            delay_ms
        );
        Ok(())
    }

    async fn cancel(&self, id: i64) -> Result<()> {
        self.abort_timer(id, FireKind::Main).await;
        self.abort_timer(id, FireKind::Reminder).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, ZoneOffsets};
    use std::time::Duration;

    fn scheduler() -> (Arc<TokioScheduler>, mpsc::Receiver<FireEvent>) {
        let clock = Arc::new(FixedClock::at("2024-03-16T08:00:00Z", ZoneOffsets::default()));
        TokioScheduler::new(clock)
    }

    #[tokio::test]
    async fn due_timer_delivers_a_fire_event() {
        let (scheduler, mut rx) = scheduler();

        // At time is already past relative to the fixed clock.
        scheduler
            .arm(7, FireKind::Main, 0)
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("fire should be delivered")
            .unwrap();
        assert_eq!(
            event,
            FireEvent {
                id: 7,
                kind: FireKind::Main
            }
        );
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_prevents_delivery() {
        let (scheduler, mut rx) = scheduler();

        scheduler.arm(3, FireKind::Main, 0).await.unwrap();
        scheduler.cancel(3).await.unwrap();
        scheduler.cancel(3).await.unwrap(); // second cancel is a no-op

        let outcome = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(outcome.is_err(), "cancelled timer must not fire");
    }

    #[tokio::test]
    async fn rearming_replaces_the_previous_timer() {
        let (scheduler, mut rx) = scheduler();
        let far_future = i64::MAX / 2;

        scheduler.arm(5, FireKind::Main, 0).await.unwrap();
        scheduler.arm(5, FireKind::Main, far_future).await.unwrap();

        let outcome = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(outcome.is_err(), "replaced timer must not deliver");
    }

    #[tokio::test]
    async fn main_and_reminder_timers_are_independent() {
        let (scheduler, mut rx) = scheduler();

        scheduler.arm(9, FireKind::Reminder, 0).await.unwrap();
        scheduler.arm(9, FireKind::Main, 0).await.unwrap();

        let mut kinds = vec![
            rx.recv().await.unwrap().kind,
            rx.recv().await.unwrap().kind,
        ];
        kinds.sort_by_key(|k| *k == FireKind::Reminder);
        assert_eq!(kinds, vec![FireKind::Main, FireKind::Reminder]);
    }
}
