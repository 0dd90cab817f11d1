//! Next-fire calculator
//!
//! Pure function from `(alarm, now, options)` to the next firing instant in
//! epoch milliseconds. Deterministic for fixed inputs, never suspends, never
//! mutates the alarm. All wall-clock arithmetic happens in the local offset
//! supplied by the caller's `ZoneOffsets` snapshot.

use crate::clock::ZoneOffsets;
use crate::config::MAX_WEEKDAY_SEARCH_STEPS;
use crate::database::models::Alarm;
use crate::error::{AlarmError, Result};
use chrono::{DateTime, Datelike, Duration, FixedOffset, TimeZone, Utc};

/// Calculation options.
#[derive(Debug, Clone, Copy, Default)]
pub struct FireOptions {
    /// Skip today's occurrence even if it has not happened yet
    /// ("turn off for today").
    pub skip_today: bool,
    /// Number of snooze cycles to add onto the original alarm time.
    /// Snooze chains are anchored to the alarm time, not to "now", so
    /// repeated snoozes accumulate deterministically.
    pub snooze_cycles: u32,
}

/// Compute the next firing instant for `alarm`, in epoch milliseconds.
///
/// A candidate equal to `now` counts as already passed and advances, so a
/// query at exactly the fire instant never returns a stale time.
pub fn next_fire_at(
    alarm: &Alarm,
    now: DateTime<Utc>,
    zone: &ZoneOffsets,
    opts: FireOptions,
) -> Result<i64> {
    let offset = local_offset(zone)?;
    let now_local = now.with_timezone(&offset);

    // Today's date at the alarm's time of day, in local wall-clock time.
    let base = now_local
        .date_naive()
        .and_hms_opt(alarm.hour as u32, alarm.minute as u32, alarm.second as u32)
        .ok_or_else(|| {
            AlarmError::Validation(format!(
                "invalid time of day {:02}:{:02}:{:02}",
                alarm.hour, alarm.minute, alarm.second
            ))
        })?;
    let mut candidate = offset
        .from_local_datetime(&base)
        .single()
        .ok_or_else(|| AlarmError::Validation("ambiguous local time".to_string()))?;

    let epoch = if opts.snooze_cycles > 0 {
        // Snoozed fire: original alarm time plus the accumulated snooze
        // offset. The weekday walk does not apply to a snooze chain.
        let snoozed = candidate
            + Duration::milliseconds(
                opts.snooze_cycles as i64 * alarm.snooze.snooze_time_ms as i64,
            );
        if snoozed <= now_local {
            tracing::debug!("snoozed fire time for alarm {} is already past", alarm.id);
        }
        snoozed.timestamp_millis()
    } else {
        if candidate <= now_local {
            candidate += Duration::days(1);
            while candidate <= now_local {
                candidate += Duration::days(1);
            }
        } else if opts.skip_today {
            candidate += Duration::days(1);
        }

        if !alarm.repeat_on_days.is_empty() {
            let mut steps = 0;
            while !alarm.repeats_on(candidate.weekday().number_from_monday()) {
                candidate += Duration::days(1);
                steps += 1;
                if steps >= MAX_WEEKDAY_SEARCH_STEPS {
                    return Err(AlarmError::InvalidRecurrence(alarm.id));
                }
            }
        }

        candidate.timestamp_millis()
    };

    Ok(apply_offset_drift(alarm, zone, epoch))
}

/// Compensate for zone drift since the alarm was created.
///
/// When an adjust flag is off, the alarm's absolute UTC instant is pinned:
/// the result is shifted by the offset delta between the stored snapshot and
/// the current zone. When the flag is on, the wall clock floats naturally
/// and no compensation applies.
fn apply_offset_drift(alarm: &Alarm, zone: &ZoneOffsets, mut epoch: i64) -> i64 {
    if !alarm.adjust_with_timezone {
        epoch += zone.timezone_offset_ms - alarm.timezone_offset_ms;
    }
    if !alarm.adjust_with_daylight_savings {
        epoch += zone.daylight_savings_offset_ms - alarm.daylight_savings_offset_ms;
    }
    epoch
}

fn local_offset(zone: &ZoneOffsets) -> Result<FixedOffset> {
    FixedOffset::east_opt((zone.total_ms() / 1000) as i32)
        .ok_or_else(|| AlarmError::Validation(format!("invalid zone offset {:?}", zone)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const UTC_ZONE: ZoneOffsets = ZoneOffsets {
        timezone_offset_ms: 0,
        daylight_savings_offset_ms: 0,
    };

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn ms(t: DateTime<Utc>) -> i64 {
        t.timestamp_millis()
    }

    fn weekday_alarm() -> Alarm {
        // 07:00 on Monday through Friday, created at UTC with no drift
        Alarm {
            id: 1,
            hour: 7,
            repeat_on_days: "12345".to_string(),
            ..Alarm::default()
        }
    }

    // 2024-03-16 is a Saturday.
    #[test]
    fn weekday_alarm_on_saturday_fires_monday() {
        let now = at(2024, 3, 16, 8, 0, 0);

        let next = next_fire_at(&weekday_alarm(), now, &UTC_ZONE, FireOptions::default()).unwrap();

        assert_eq!(next, ms(at(2024, 3, 18, 7, 0, 0)));
    }

    #[test]
    fn is_deterministic_for_fixed_inputs() {
        let now = at(2024, 3, 16, 8, 0, 0);
        let alarm = weekday_alarm();

        let a = next_fire_at(&alarm, now, &UTC_ZONE, FireOptions::default()).unwrap();
        let b = next_fire_at(&alarm, now, &UTC_ZONE, FireOptions::default()).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn result_is_strictly_in_the_future() {
        let alarm = weekday_alarm();
        for now in [
            at(2024, 3, 16, 8, 0, 0),
            at(2024, 3, 18, 6, 59, 59),
            at(2024, 3, 18, 7, 0, 0), // exactly at the fire instant
            at(2024, 3, 18, 7, 0, 1),
        ] {
            let next = next_fire_at(&alarm, now, &UTC_ZONE, FireOptions::default()).unwrap();
            assert!(next > ms(now), "result must advance past {}", now);
        }
    }

    #[test]
    fn tie_with_now_counts_as_passed() {
        let alarm = Alarm {
            hour: 8,
            ..Alarm::default()
        };
        let now = at(2024, 3, 16, 8, 0, 0);

        let next = next_fire_at(&alarm, now, &UTC_ZONE, FireOptions::default()).unwrap();

        assert_eq!(next, ms(at(2024, 3, 17, 8, 0, 0)));
    }

    #[test]
    fn returned_weekday_is_a_member_of_the_repeat_set() {
        let alarm = Alarm {
            hour: 7,
            repeat_on_days: "67".to_string(),
            ..Alarm::default()
        };
        let now = at(2024, 3, 18, 12, 0, 0); // Monday noon

        let next = next_fire_at(&alarm, now, &UTC_ZONE, FireOptions::default()).unwrap();

        let when = DateTime::from_timestamp_millis(next).unwrap();
        assert!(alarm.repeats_on(when.weekday().number_from_monday()));
        assert_eq!(next, ms(at(2024, 3, 23, 7, 0, 0))); // Saturday
    }

    #[test]
    fn snooze_cycles_accumulate_from_the_alarm_time() {
        // Alarm at 7:00, snoozed twice with 5 minutes each, asked at 7:06:
        // the answer is 7:10, not now + 5 minutes.
        let alarm = Alarm {
            hour: 7,
            ..Alarm::default()
        };
        let now = at(2024, 3, 16, 7, 6, 0);

        let next = next_fire_at(
            &alarm,
            now,
            &UTC_ZONE,
            FireOptions {
                snooze_cycles: 2,
                ..FireOptions::default()
            },
        )
        .unwrap();

        assert_eq!(next, ms(at(2024, 3, 16, 7, 10, 0)));
        assert_eq!(next, ms(at(2024, 3, 16, 7, 0, 0)) + 2 * 300_000);
    }

    #[test]
    fn snooze_is_independent_of_now() {
        let alarm = Alarm {
            hour: 7,
            ..Alarm::default()
        };
        let opts = FireOptions {
            snooze_cycles: 1,
            ..FireOptions::default()
        };

        let early = next_fire_at(&alarm, at(2024, 3, 16, 7, 0, 30), &UTC_ZONE, opts).unwrap();
        let late = next_fire_at(&alarm, at(2024, 3, 16, 7, 4, 59), &UTC_ZONE, opts).unwrap();

        assert_eq!(early, late);
        assert_eq!(early, ms(at(2024, 3, 16, 7, 5, 0)));
    }

    #[test]
    fn skip_today_advances_an_upcoming_occurrence() {
        let alarm = Alarm {
            hour: 7,
            repeat_on_days: "1234567".to_string(),
            ..Alarm::default()
        };
        let now = at(2024, 3, 16, 6, 0, 0); // Saturday, before the alarm

        let next = next_fire_at(
            &alarm,
            now,
            &UTC_ZONE,
            FireOptions {
                skip_today: true,
                ..FireOptions::default()
            },
        )
        .unwrap();

        assert_eq!(next, ms(at(2024, 3, 17, 7, 0, 0))); // Sunday
    }

    #[test]
    fn unmatchable_repeat_set_is_invalid_recurrence() {
        // Validation rejects this string upstream; the calculator still
        // refuses to loop forever when handed one.
        let alarm = Alarm {
            id: 9,
            repeat_on_days: "0".to_string(),
            ..Alarm::default()
        };

        let err = next_fire_at(
            &alarm,
            at(2024, 3, 16, 8, 0, 0),
            &UTC_ZONE,
            FireOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(err, AlarmError::InvalidRecurrence(9)));
    }

    #[test]
    fn timezone_drift_pins_the_utc_instant_when_adjust_is_off() {
        // Created at UTC-5 for 13:00 local, i.e. 18:00 UTC. Device now at
        // UTC+0: the fire must stay at 18:00 UTC.
        let alarm = Alarm {
            hour: 13,
            adjust_with_timezone: false,
            timezone_offset_ms: -5 * 3_600_000,
            ..Alarm::default()
        };
        let now = at(2024, 3, 16, 8, 0, 0);

        let next = next_fire_at(&alarm, now, &UTC_ZONE, FireOptions::default()).unwrap();

        assert_eq!(next, ms(at(2024, 3, 16, 18, 0, 0)));
    }

    #[test]
    fn timezone_drift_floats_the_wall_clock_when_adjust_is_on() {
        let alarm = Alarm {
            hour: 13,
            adjust_with_timezone: true,
            adjust_with_daylight_savings: true,
            timezone_offset_ms: -5 * 3_600_000,
            ..Alarm::default()
        };
        let now = at(2024, 3, 16, 8, 0, 0);

        let next = next_fire_at(&alarm, now, &UTC_ZONE, FireOptions::default()).unwrap();

        // Still 13:00 on the current wall clock.
        assert_eq!(next, ms(at(2024, 3, 16, 13, 0, 0)));
    }

    #[test]
    fn dst_drift_pins_the_utc_instant_when_adjust_is_off() {
        // Created with no DST for 07:00 local; DST (+1h) has since begun.
        let alarm = Alarm {
            hour: 7,
            adjust_with_daylight_savings: false,
            daylight_savings_offset_ms: 0,
            ..Alarm::default()
        };
        let zone = ZoneOffsets::new(0, 3_600_000);
        let now = at(2024, 3, 16, 1, 0, 0);

        let next = next_fire_at(&alarm, now, &zone, FireOptions::default()).unwrap();

        // 07:00 at UTC+1 is 06:00 UTC; compensation restores 07:00 UTC.
        assert_eq!(next, ms(at(2024, 3, 16, 7, 0, 0)));
    }

    #[test]
    fn candidate_builds_in_the_local_zone() {
        // 22:00 alarm at UTC+11: "today" on the local calendar is already
        // 2024-03-17 when UTC still reads 2024-03-16 13:30.
        let alarm = Alarm {
            hour: 22,
            adjust_with_timezone: true,
            adjust_with_daylight_savings: true,
            ..Alarm::default()
        };
        let zone = ZoneOffsets::new(11 * 3_600_000, 0);
        let now = at(2024, 3, 16, 13, 30, 0); // 2024-03-17 00:30 local

        let next = next_fire_at(&alarm, now, &zone, FireOptions::default()).unwrap();

        // 2024-03-17 22:00 local = 2024-03-17 11:00 UTC
        assert_eq!(next, ms(at(2024, 3, 17, 11, 0, 0)));
    }
}
