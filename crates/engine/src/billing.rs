//! Billing period calculator.
//!
//! Computes when the next billing period starts after one is skipped. Pure
//! functions over the delivery schedule's free text ("Every 2 weeks",
//! "Monthly delivery"); everything unrecognized falls back to 14 days, the
//! store's most common cadence.

use chrono::{DateTime, Days, Months, Utc};

const DEFAULT_WEEKS: u64 = 2;
const DEFAULT_MONTHS: u32 = 1;
const FALLBACK_DAYS: u64 = 14;

/// When the period after `current_period_end` begins, per the schedule text.
///
/// A schedule mentioning weeks advances by its leading integer of weeks
/// (default 2); months likewise (default 1, calendar-aware); anything else,
/// including no schedule at all, advances 14 days.
#[must_use]
pub fn next_period_timestamp(
    current_period_end: DateTime<Utc>,
    schedule: Option<&str>,
) -> DateTime<Utc> {
    let Some(schedule) = schedule else {
        return fallback(current_period_end);
    };
    let lower = schedule.to_lowercase();

    if lower.contains("week") {
        let weeks = leading_int(&lower).unwrap_or(DEFAULT_WEEKS);
        return current_period_end
            .checked_add_days(Days::new(weeks.saturating_mul(7)))
            .unwrap_or(current_period_end);
    }

    if lower.contains("month") {
        #[allow(clippy::cast_possible_truncation)]
        let months = leading_int(&lower)
            .map_or(DEFAULT_MONTHS, |n| n.min(u64::from(u32::MAX)) as u32);
        return current_period_end
            .checked_add_months(Months::new(months))
            .unwrap_or(current_period_end);
    }

    fallback(current_period_end)
}

fn fallback(from: DateTime<Utc>) -> DateTime<Utc> {
    from.checked_add_days(Days::new(FALLBACK_DAYS)).unwrap_or(from)
}

/// First run of digits anywhere in the text.
fn leading_int(text: &str) -> Option<u64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text
        .get(start..)?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_weekly_schedule_with_count() {
        let next = next_period_timestamp(end(), Some("Every 3 weeks"));
        assert_eq!(next, end() + chrono::Duration::days(21));
    }

    #[test]
    fn test_weekly_schedule_defaults_to_two() {
        let next = next_period_timestamp(end(), Some("weekly delivery"));
        assert_eq!(next, end() + chrono::Duration::days(14));
    }

    #[test]
    fn test_monthly_schedule_is_calendar_aware() {
        // Jan 31 + 1 month clamps to Feb 28.
        let next = next_period_timestamp(end(), Some("Every month"));
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 28, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_monthly_schedule_with_count() {
        let next = next_period_timestamp(end(), Some("Every 2 months"));
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 31, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_unrecognized_schedule_falls_back_to_fourteen_days() {
        let next = next_period_timestamp(end(), Some("whenever"));
        assert_eq!(next, end() + chrono::Duration::days(14));
    }

    #[test]
    fn test_absent_schedule_falls_back_to_fourteen_days() {
        let next = next_period_timestamp(end(), None);
        assert_eq!(next, end() + chrono::Duration::days(14));
    }

    #[test]
    fn test_count_found_mid_text() {
        let next = next_period_timestamp(end(), Some("ships every 4 weeks, roasted fresh"));
        assert_eq!(next, end() + chrono::Duration::days(28));
    }

    #[test]
    fn test_deterministic() {
        let a = next_period_timestamp(end(), Some("Every 2 weeks"));
        let b = next_period_timestamp(end(), Some("Every 2 weeks"));
        assert_eq!(a, b);
    }
}
