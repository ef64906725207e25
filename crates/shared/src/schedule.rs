use chrono::{DateTime, Days, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::timezone::parse_time_zone_or_default;

const MAX_DST_FORWARD_SHIFT_MINUTES: i64 = 180;

pub fn parse_local_time_hhmm(value: &str) -> Option<u16> {
    let trimmed = value.trim();
    let (hour, minute) = trimmed.split_once(':')?;
    if hour.len() != 2 || minute.len() != 2 {
        return None;
    }

    let hour: u16 = hour.parse().ok()?;
    let minute: u16 = minute.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }

    Some((hour * 60) + minute)
}

pub fn format_local_time_hhmm(minutes: u16) -> String {
    let hour = minutes / 60;
    let minute = minutes % 60;
    format!("{hour:02}:{minute:02}")
}

/// Next daily wall-clock trigger strictly after `reference_utc`, at
/// `local_time_minutes` past local midnight in `time_zone`. The reference
/// time is a parameter so the trigger logic is testable without waiting for
/// wall-clock time.
pub fn next_daily_run_after(
    reference_utc: DateTime<Utc>,
    time_zone: &str,
    local_time_minutes: u16,
) -> Option<DateTime<Utc>> {
    let tz = parse_time_zone_or_default(time_zone);
    let local_time = local_time_from_minutes(local_time_minutes)?;

    let mut cursor_utc = reference_utc;
    for _ in 0..4 {
        let local_reference = cursor_utc.with_timezone(&tz).naive_local();

        let mut candidate_date = local_reference.date();
        let mut candidate = candidate_date.and_time(local_time);
        if candidate <= local_reference {
            candidate_date = candidate_date.checked_add_days(Days::new(1))?;
            candidate = candidate_date.and_time(local_time);
        }

        let candidate_utc = resolve_local_datetime_to_utc(&tz, candidate)?;
        if candidate_utc > reference_utc {
            return Some(candidate_utc);
        }
        cursor_utc += Duration::minutes(1);
    }

    None
}

fn local_time_from_minutes(minutes: u16) -> Option<NaiveTime> {
    if minutes > 1_439 {
        return None;
    }

    let hour = u32::from(minutes / 60);
    let minute = u32::from(minutes % 60);
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn resolve_local_datetime_to_utc(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(value) => Some(value.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            for minute_offset in 1..=MAX_DST_FORWARD_SHIFT_MINUTES {
                let shifted = local.checked_add_signed(Duration::minutes(minute_offset))?;
                match tz.from_local_datetime(&shifted) {
                    LocalResult::Single(value) => return Some(value.with_timezone(&Utc)),
                    LocalResult::Ambiguous(earliest, _) => {
                        return Some(earliest.with_timezone(&Utc));
                    }
                    LocalResult::None => continue,
                }
            }
            None
        }
    }
}
