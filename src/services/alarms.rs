//! Alarm state machine
//!
//! Owns the per-alarm lifecycle (Scheduled → Ringing → Snoozed/Stopped),
//! applies fire/stop/snooze/timeout events, and issues persistence,
//! scheduling, and notification commands. Transitions for one alarm id are
//! serialized through a per-id lock; the "currently ringing" slot is
//! process-wide and holds at most one session.

use crate::clock::Clock;
use crate::config::{DEFAULT_RING_DURATION_MS, EVENT_CHANNEL_CAPACITY};
use crate::database::models::{Alarm, AlarmPatch};
use crate::database::Repository;
use crate::error::{AlarmError, Result};
use crate::events::AlarmSignal;
use crate::ports::{
    FireKind, NotificationKind, NotifierPort, PermissionKind, PermissionPort, PlayerPort,
    SchedulerPort, SoundSpec,
};
use crate::services::calculator::{self, FireOptions};
use crate::services::notifications;
use crate::services::scheduler::FireEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

/// The single playback session. At most one alarm rings at a time; a fire
/// for another id while this is occupied is dropped (its timer is simply
/// not redelivered — a known limitation, not a fairness guarantee).
struct RingingSession {
    alarm_id: i64,
    /// Aborted when the user resolves the ring before the sound runs out.
    timeout: JoinHandle<()>,
}

/// How a ringing session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RingOutcome {
    /// User stopped the alarm.
    Stopped,
    /// User snoozed the alarm.
    Snoozed,
    /// The sound duration elapsed with no user action.
    TimedOut,
}

/// Alarm lifecycle service
#[derive(Clone)]
pub struct AlarmService {
    repo: Repository,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn SchedulerPort>,
    player: Arc<dyn PlayerPort>,
    notifier: Arc<dyn NotifierPort>,
    permissions: Arc<dyn PermissionPort>,
    ringing: Arc<Mutex<Option<RingingSession>>>,
    locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
    events: broadcast::Sender<AlarmSignal>,
}

impl AlarmService {
    pub fn new(
        repo: Repository,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn SchedulerPort>,
        player: Arc<dyn PlayerPort>,
        notifier: Arc<dyn NotifierPort>,
        permissions: Arc<dyn PermissionPort>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            repo,
            clock,
            scheduler,
            player,
            notifier,
            permissions,
            ringing: Arc::new(Mutex::new(None)),
            locks: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Subscribe to engine signals (ringing changes, missed alarms).
    pub fn subscribe(&self) -> broadcast::Receiver<AlarmSignal> {
        self.events.subscribe()
    }

    /// Drive fire events from an in-process scheduler channel.
    pub fn spawn_dispatcher(&self, mut rx: mpsc::Receiver<FireEvent>) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            tracing::info!("Starting alarm fire dispatcher");
            while let Some(event) = rx.recv().await {
                let result = match event.kind {
                    FireKind::Main => service.handle_fire(event.id).await,
                    FireKind::Reminder => service.handle_reminder_fire(event.id).await,
                };
                if let Err(e) = result {
                    tracing::warn!("Fire for alarm {} not handled: {}", event.id, e);
                }
            }
        })
    }

    /// Insert or replace an alarm. Returns the next fire time, or `None`
    /// when the alarm is disabled and therefore not scheduled.
    pub async fn set_alarm(&self, mut alarm: Alarm) -> Result<Option<i64>> {
        alarm.validate()?;

        // Capture the zone snapshot at creation time; drift compensation
        // compares against it later.
        let zone = self.clock.zone_offsets();
        alarm.timezone_offset_ms = zone.timezone_offset_ms;
        alarm.daylight_savings_offset_ms = zone.daylight_savings_offset_ms;

        let lock = self.id_lock(alarm.id).await;
        let _guard = lock.lock().await;

        self.scheduler.cancel(alarm.id).await?;
        self.repo.save_alarm(&alarm).await?;

        if !alarm.enabled {
            tracing::info!("Alarm {} saved disabled; not scheduling", alarm.id);
            return Ok(None);
        }

        let next = self.reschedule(&alarm, FireOptions::default(), true).await?;
        tracing::info!("Alarm {} set; next fire at {}", alarm.id, next);
        Ok(Some(next))
    }

    /// Merge a partial update over an existing alarm and reschedule it.
    pub async fn update_alarm(&self, id: i64, patch: AlarmPatch) -> Result<Option<i64>> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;

        let mut alarm = self
            .repo
            .get_alarm(id)
            .await?
            .ok_or(AlarmError::AlarmNotFound(id))?;

        alarm.apply_patch(patch);
        alarm.validate()?;

        self.scheduler.cancel(id).await?;
        self.repo.save_alarm(&alarm).await?;

        if !alarm.enabled {
            return Ok(None);
        }

        let next = self.reschedule(&alarm, FireOptions::default(), true).await?;
        Ok(Some(next))
    }

    /// Stop a ringing alarm, or reschedule a non-ringing one.
    ///
    /// With `turn_off_for_today`, the next occurrence is skipped even when
    /// it has not fired yet. Calling this while nothing rings is a success
    /// (the alarm is rescheduled with its snooze count cleared) rather than
    /// an error; see DESIGN.md.
    ///
    /// Returns the next fire time, or `None` when a one-shot alarm has
    /// exhausted itself or the alarm is disabled.
    pub async fn turn_off_alarm(&self, id: i64, turn_off_for_today: bool) -> Result<Option<i64>> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;

        let mut alarm = self
            .repo
            .get_alarm(id)
            .await?
            .ok_or(AlarmError::AlarmNotFound(id))?;

        if let Some(session) = self.take_session(id).await {
            return self.resolve_ring(session, RingOutcome::Stopped).await;
        }

        alarm.snooze_count = 0;
        self.scheduler.cancel(id).await?;
        self.repo.save_alarm(&alarm).await?;
        self.notifier.remove(id).await?;

        if !alarm.enabled {
            return Ok(None);
        }

        let next = self
            .reschedule(
                &alarm,
                FireOptions {
                    skip_today: turn_off_for_today,
                    ..FireOptions::default()
                },
                true,
            )
            .await?;
        tracing::info!(
            "Alarm {} turned off (for today: {}); next fire at {}",
            id,
            turn_off_for_today,
            next
        );
        Ok(Some(next))
    }

    /// Snooze the currently ringing alarm. Fails when `id` is unknown or
    /// not the one ringing.
    pub async fn snooze_alarm(&self, id: i64) -> Result<i64> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;

        self.repo
            .get_alarm(id)
            .await?
            .ok_or(AlarmError::AlarmNotFound(id))?;

        let session = self
            .take_session(id)
            .await
            .ok_or(AlarmError::NotCurrentlyRinging(id))?;

        self.resolve_ring(session, RingOutcome::Snoozed)
            .await?
            .ok_or(AlarmError::AlarmNotFound(id))
    }

    /// Delete an alarm: stop its playback if ringing, cancel its timers,
    /// remove its notification, and drop the record. Idempotent.
    pub async fn delete_alarm(&self, id: i64) -> Result<()> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;

        if let Some(session) = self.take_session(id).await {
            session.timeout.abort();
            self.player.stop().await?;
            let _ = self.events.send(AlarmSignal::PlayingChanged(None));
        }

        self.scheduler.cancel(id).await?;
        self.notifier.remove(id).await?;
        self.repo.delete_alarm(id).await?;

        // Release our handle, then prune the lock entry so the map does not
        // grow with every id ever touched. A concurrent waiter still holds a
        // clone; in that case the entry stays until the next delete.
        drop(_guard);
        drop(lock);
        let mut locks = self.locks.lock().await;
        if locks.get(&id).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(&id);
        }

        tracing::info!("Alarm {} deleted", id);
        Ok(())
    }

    pub async fn get_alarm(&self, id: i64) -> Result<Option<Alarm>> {
        self.repo.get_alarm(id).await
    }

    pub async fn get_all_alarms(&self) -> Result<Vec<Alarm>> {
        self.repo.list_alarms().await
    }

    /// The next fire time for `id`, reflecting any snooze chain in
    /// progress. `None` for unknown or disabled alarms.
    pub async fn get_next_fire_time(&self, id: i64) -> Result<Option<i64>> {
        let Some(alarm) = self.repo.get_alarm(id).await? else {
            return Ok(None);
        };
        if !alarm.enabled {
            return Ok(None);
        }

        let next = calculator::next_fire_at(
            &alarm,
            self.clock.now_utc(),
            &self.clock.zone_offsets(),
            FireOptions {
                snooze_cycles: alarm.snooze_count,
                ..FireOptions::default()
            },
        )?;
        Ok(Some(next))
    }

    /// The alarm currently ringing, if any.
    pub async fn currently_ringing_alarm(&self) -> Result<Option<Alarm>> {
        let id = {
            let ringing = self.ringing.lock().await;
            ringing.as_ref().map(|s| s.alarm_id)
        };
        match id {
            Some(id) => self.repo.get_alarm(id).await,
            None => Ok(None),
        }
    }

    /// Re-arm every enabled stored alarm. Bootstrap path after process
    /// restart or device reboot; failures are logged per alarm so one bad
    /// record cannot block the rest. Returns the number of alarms armed.
    pub async fn restore_alarms(&self) -> Result<usize> {
        let alarms = self.repo.list_alarms().await?;
        let mut armed = 0;

        for alarm in alarms.into_iter().filter(|a| a.enabled) {
            let lock = self.id_lock(alarm.id).await;
            let _guard = lock.lock().await;

            self.scheduler.cancel(alarm.id).await?;
            let opts = FireOptions {
                snooze_cycles: alarm.snooze_count,
                ..FireOptions::default()
            };
            match self.reschedule(&alarm, opts, alarm.snooze_count == 0).await {
                Ok(next) => {
                    tracing::info!("Restored alarm {}; next fire at {}", alarm.id, next);
                    armed += 1;
                }
                Err(e) => {
                    tracing::error!("Could not restore alarm {}: {}", alarm.id, e);
                }
            }
        }

        Ok(armed)
    }

    /// Entry point for a main fire event delivered by the scheduler.
    pub async fn handle_fire(&self, id: i64) -> Result<()> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;

        let Some(alarm) = self.repo.get_alarm(id).await? else {
            tracing::warn!("Fire for alarm {} but no record exists; cancelling", id);
            self.scheduler.cancel(id).await?;
            return Ok(());
        };

        {
            let mut ringing = self.ringing.lock().await;
            if let Some(session) = ringing.as_ref() {
                return Err(AlarmError::AlreadyRinging {
                    ringing: session.alarm_id,
                    requested: id,
                });
            }

            self.player.start(SoundSpec::for_alarm(&alarm)).await?;

            let duration_ms = alarm.sound.duration_ms.unwrap_or(DEFAULT_RING_DURATION_MS);
            let service = self.clone();
            let timeout = tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(duration_ms as u64)).await;
                if let Err(e) = service.handle_ring_timeout(id).await {
                    tracing::error!("Ring timeout for alarm {} failed: {}", id, e);
                }
            });

            *ringing = Some(RingingSession {
                alarm_id: id,
                timeout,
            });
        }

        if alarm.notifications.show_main {
            self.show_notification(&alarm, NotificationKind::Main).await?;
        }

        let _ = self
            .events
            .send(AlarmSignal::PlayingChanged(Some(alarm.clone())));
        tracing::info!("Alarm {} is ringing", id);
        Ok(())
    }

    /// Entry point for a reminder fire event: chirp, show the reminder
    /// notification, and arm the main fire.
    pub async fn handle_reminder_fire(&self, id: i64) -> Result<()> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;

        let Some(alarm) = self.repo.get_alarm(id).await? else {
            tracing::warn!("Reminder for alarm {} but no record exists; cancelling", id);
            self.scheduler.cancel(id).await?;
            return Ok(());
        };

        {
            let ringing = self.ringing.lock().await;
            if let Some(session) = ringing.as_ref() {
                tracing::warn!(
                    "Skipping reminder for alarm {}; alarm {} is ringing",
                    id,
                    session.alarm_id
                );
                return Ok(());
            }
        }

        let next = calculator::next_fire_at(
            &alarm,
            self.clock.now_utc(),
            &self.clock.zone_offsets(),
            FireOptions::default(),
        )?;
        self.scheduler.arm(id, FireKind::Main, next).await?;

        self.player.play_once(SoundSpec::for_reminder(&alarm)).await?;
        self.show_notification(&alarm, NotificationKind::Reminder)
            .await?;

        tracing::info!("Reminder shown for alarm {}; main fire armed at {}", id, next);
        Ok(())
    }

    /// Resolution path for the sound-duration timeout. Clearing an already
    /// cleared session is a no-op, so a late timeout racing a user action
    /// does nothing.
    async fn handle_ring_timeout(&self, id: i64) -> Result<()> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;

        let Some(session) = self.take_session(id).await else {
            return Ok(());
        };
        self.resolve_ring(session, RingOutcome::TimedOut).await?;
        Ok(())
    }

    /// Take the ringing session if it belongs to `id`. Idempotent: a second
    /// caller gets `None`.
    async fn take_session(&self, id: i64) -> Option<RingingSession> {
        let mut ringing = self.ringing.lock().await;
        match ringing.as_ref() {
            Some(session) if session.alarm_id == id => ringing.take(),
            _ => None,
        }
    }

    /// Interpret how a ringing session ended and apply the transition.
    /// Caller must hold the per-id lock and have taken the session.
    async fn resolve_ring(
        &self,
        session: RingingSession,
        outcome: RingOutcome,
    ) -> Result<Option<i64>> {
        let id = session.alarm_id;
        if outcome != RingOutcome::TimedOut {
            // A timed-out session resolves from inside the timeout task;
            // aborting it then would cancel this very transition.
            session.timeout.abort();
        }

        self.player.stop().await?;
        let _ = self.events.send(AlarmSignal::PlayingChanged(None));

        let Some(mut alarm) = self.repo.get_alarm(id).await? else {
            // Deleted while ringing; playback is stopped and nothing is left
            // to reschedule.
            return Ok(None);
        };

        match outcome {
            RingOutcome::Stopped => self.finish_cycle(&mut alarm).await,
            RingOutcome::Snoozed => self.apply_snooze(&mut alarm).await,
            RingOutcome::TimedOut => {
                if alarm.snooze.auto_snooze_enabled
                    && alarm.snooze_count < alarm.snooze.max_auto_snooze_count
                {
                    tracing::info!("Alarm {} timed out; auto-snoozing", id);
                    self.apply_snooze(&mut alarm).await
                } else {
                    tracing::info!("Alarm {} timed out unanswered; marking missed", id);
                    let next = self.finish_cycle(&mut alarm).await?;
                    if alarm.notifications.show_missed {
                        self.show_notification(&alarm, NotificationKind::Missed)
                            .await?;
                    }
                    let _ = self.events.send(AlarmSignal::Missed(alarm.clone()));
                    Ok(next)
                }
            }
        }
    }

    /// Close out the current cycle after a stop (user or missed): clear the
    /// snooze chain and either re-arm for the next day or, for a one-shot
    /// alarm, disable it.
    async fn finish_cycle(&self, alarm: &mut Alarm) -> Result<Option<i64>> {
        alarm.snooze_count = 0;

        if alarm.is_one_shot() {
            alarm.enabled = false;
            self.repo.save_alarm(alarm).await?;
            self.scheduler.cancel(alarm.id).await?;
            self.notifier.remove(alarm.id).await?;
            tracing::info!("One-shot alarm {} exhausted; disabled", alarm.id);
            return Ok(None);
        }

        self.repo.save_alarm(alarm).await?;
        self.scheduler.cancel(alarm.id).await?;
        self.notifier.remove(alarm.id).await?;

        // The occurrence that just rang belongs to today; skip it.
        let next = self
            .reschedule(
                alarm,
                FireOptions {
                    skip_today: true,
                    ..FireOptions::default()
                },
                true,
            )
            .await?;
        Ok(Some(next))
    }

    /// Postpone the current cycle by one snooze step.
    async fn apply_snooze(&self, alarm: &mut Alarm) -> Result<Option<i64>> {
        alarm.snooze_count += 1;
        self.repo.save_alarm(alarm).await?;
        self.scheduler.cancel(alarm.id).await?;

        let next = self
            .reschedule(
                alarm,
                FireOptions {
                    snooze_cycles: alarm.snooze_count,
                    ..FireOptions::default()
                },
                false,
            )
            .await?;

        if alarm.notifications.show_snooze {
            self.show_notification(alarm, NotificationKind::Snooze)
                .await?;
        }

        tracing::info!(
            "Alarm {} snoozed (count {}); next fire at {}",
            alarm.id,
            alarm.snooze_count,
            next
        );
        Ok(Some(next))
    }

    /// Compute the next fire and arm the scheduler. When the reminder is
    /// enabled and its lead instant is still ahead, the reminder timer is
    /// armed instead; its handler arms the main fire in turn.
    ///
    /// Persistence always happens before this is called, so a failed save
    /// never leaves a timer armed against a stale record.
    async fn reschedule(
        &self,
        alarm: &Alarm,
        opts: FireOptions,
        with_reminder: bool,
    ) -> Result<i64> {
        let now = self.clock.now_utc();
        let next = calculator::next_fire_at(alarm, now, &self.clock.zone_offsets(), opts)?;

        if with_reminder && alarm.reminder.enabled {
            let remind_at = next - alarm.reminder.time_before_ms as i64;
            if remind_at > now.timestamp_millis() {
                self.scheduler
                    .arm(alarm.id, FireKind::Reminder, remind_at)
                    .await?;
                return Ok(next);
            }
        }

        self.scheduler.arm(alarm.id, FireKind::Main, next).await?;
        Ok(next)
    }

    async fn show_notification(&self, alarm: &Alarm, kind: NotificationKind) -> Result<()> {
        if !self.permissions.has(PermissionKind::Notifications).await {
            tracing::warn!(
                "Notification permission missing; skipping {:?} notification for alarm {}",
                kind,
                alarm.id
            );
            return Ok(());
        }
        self.notifier
            .show(alarm.id, kind, notifications::render(alarm, kind))
            .await
    }

    async fn id_lock(&self, id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
