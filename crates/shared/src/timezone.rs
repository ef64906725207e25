use chrono::{DateTime, Utc};
use chrono_tz::Tz;

pub const DEFAULT_DISPLAY_TIME_ZONE: &str = "UTC";

pub fn normalize_time_zone(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    trimmed.parse::<Tz>().ok().map(|tz| tz.name().to_string())
}

pub fn parse_time_zone_or_default(value: &str) -> Tz {
    normalize_time_zone(value)
        .and_then(|normalized| normalized.parse::<Tz>().ok())
        .unwrap_or(chrono_tz::UTC)
}

/// Formats an event timestamp for user-facing messages, in the configured
/// display timezone, at the minute precision events carry.
pub fn format_event_time(value: DateTime<Utc>, time_zone: &str) -> String {
    let tz = parse_time_zone_or_default(time_zone);
    value.with_timezone(&tz).format("%Y/%m/%d %H:%M").to_string()
}

pub fn format_event_clock(value: DateTime<Utc>, time_zone: &str) -> String {
    let tz = parse_time_zone_or_default(time_zone);
    value.with_timezone(&tz).format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{format_event_time, normalize_time_zone, parse_time_zone_or_default};

    #[test]
    fn normalize_time_zone_accepts_valid_iana_name() {
        assert_eq!(
            normalize_time_zone("Asia/Taipei"),
            Some("Asia/Taipei".to_string())
        );
    }

    #[test]
    fn normalize_time_zone_rejects_invalid_values() {
        assert_eq!(normalize_time_zone(""), None);
        assert_eq!(normalize_time_zone("Mars/Olympus"), None);
    }

    #[test]
    fn invalid_display_zone_falls_back_to_utc() {
        assert_eq!(parse_time_zone_or_default("not-a-zone"), chrono_tz::UTC);
    }

    #[test]
    fn event_time_formats_in_the_display_zone() {
        let value = Utc
            .with_ymd_and_hms(2025, 6, 2, 6, 0, 0)
            .single()
            .expect("valid datetime");

        assert_eq!(format_event_time(value, "UTC"), "2025/06/02 06:00");
        assert_eq!(format_event_time(value, "Asia/Taipei"), "2025/06/02 14:00");
    }
}
