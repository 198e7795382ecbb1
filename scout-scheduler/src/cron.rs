//! Cron schedule parsing, hour offsetting and next-run computation.

use chrono::{DateTime, FixedOffset, Utc};
use croner::Cron;
use regex::Regex;
use scout_core::{ConfigError, ScoutError, ScoutResult};

/// Parse a five-field cron expression.
pub fn parse_cron(expression: &str) -> ScoutResult<Cron> {
    let fields = expression.split_whitespace().count();
    if fields != 5 {
        return Err(invalid_cron(
            expression,
            format!("expected 5 fields, found {}", fields),
        ));
    }
    expression
        .parse::<Cron>()
        .map_err(|e| invalid_cron(expression, e.to_string()))
}

/// Shift the hour field of `expression` by `hours`.
///
/// Only a single numeric hour can be shifted, and the result must stay within
/// the same day: `"0 9 1 */3 *"` shifted by 1 is `"0 10 1 */3 *"`.
pub fn offset_cron_hours(expression: &str, hours: u32) -> ScoutResult<String> {
    let mut fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(invalid_cron(
            expression,
            format!("expected 5 fields, found {}", fields.len()),
        ));
    }

    let hour: u32 = fields[1].parse().map_err(|_| {
        invalid_cron(
            expression,
            format!("hour field '{}' is not a single number and cannot be offset", fields[1]),
        )
    })?;
    let shifted = hour + hours;
    if shifted > 23 {
        return Err(invalid_cron(
            expression,
            format!("offsetting hour {} by {} passes 23", hour, hours),
        ));
    }

    let shifted = shifted.to_string();
    fields[1] = &shifted;
    let offset = fields.join(" ");
    parse_cron(&offset)?;
    Ok(offset)
}

/// Resolve a timezone name to a fixed UTC offset.
///
/// Accepts `UTC`, `GMT`, `Z`, the US abbreviations (`EST`, `EDT`, `CST`,
/// `CDT`, `MST`, `MDT`, `PST`, `PDT`) and numeric offsets such as `+05:30`
/// or `-0800`.
pub fn parse_timezone(timezone: &str) -> ScoutResult<FixedOffset> {
    let unknown = || {
        ScoutError::Config(ConfigError::UnknownTimezone {
            timezone: timezone.to_string(),
        })
    };

    let upper = timezone.trim().to_ascii_uppercase();
    let hours_west = match upper.as_str() {
        "UTC" | "GMT" | "Z" => Some(0),
        "EST" => Some(5),
        "EDT" => Some(4),
        "CST" => Some(6),
        "CDT" => Some(5),
        "MST" => Some(7),
        "MDT" => Some(6),
        "PST" => Some(8),
        "PDT" => Some(7),
        _ => None,
    };
    if let Some(h) = hours_west {
        return FixedOffset::west_opt(h * 3600).ok_or_else(unknown);
    }

    let re = Regex::new(r"^([+-])(\d{2}):?(\d{2})$").map_err(|_| unknown())?;
    let caps = re.captures(&upper).ok_or_else(unknown)?;
    let hours: i32 = caps[2].parse().map_err(|_| unknown())?;
    let minutes: i32 = caps[3].parse().map_err(|_| unknown())?;
    if hours > 23 || minutes > 59 {
        return Err(unknown());
    }
    let seconds = hours * 3600 + minutes * 60;
    if &caps[1] == "+" {
        FixedOffset::east_opt(seconds).ok_or_else(unknown)
    } else {
        FixedOffset::west_opt(seconds).ok_or_else(unknown)
    }
}

/// A cron expression bound to the timezone it is evaluated in.
pub struct CronSchedule {
    expression: String,
    cron: Cron,
    timezone: FixedOffset,
}

impl CronSchedule {
    pub fn new(expression: &str, timezone: FixedOffset) -> ScoutResult<Self> {
        Ok(Self {
            expression: expression.to_string(),
            cron: parse_cron(expression)?,
            timezone,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    /// First occurrence strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> ScoutResult<DateTime<Utc>> {
        let local = after.with_timezone(&self.timezone);
        self.cron
            .find_next_occurrence(&local, false)
            .map(|next| next.with_timezone(&Utc))
            .map_err(|e| invalid_cron(&self.expression, format!("no next occurrence: {}", e)))
    }
}

impl std::fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronSchedule")
            .field("expression", &self.expression)
            .field("timezone", &self.timezone)
            .finish()
    }
}

fn invalid_cron(expression: &str, reason: impl Into<String>) -> ScoutError {
    ScoutError::Config(ConfigError::InvalidCron {
        expression: expression.to_string(),
        reason: reason.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_quarterly_meta_runs_one_hour_after_context() {
        let meta = offset_cron_hours("0 9 1 */3 *", 1).unwrap();
        assert_eq!(meta, "0 10 1 */3 *");

        let tz = parse_timezone("UTC").unwrap();
        let context = CronSchedule::new("0 9 1 */3 *", tz).unwrap();
        let meta = CronSchedule::new(&meta, tz).unwrap();

        let from = utc(2025, 1, 15, 0);
        let context_next = context.next_after(from).unwrap();
        let meta_next = meta.next_after(from).unwrap();
        assert_eq!(context_next, utc(2025, 4, 1, 9));
        assert_eq!(meta_next - context_next, chrono::Duration::hours(1));
    }

    #[test]
    fn test_offset_rejects_non_numeric_hour() {
        for expression in ["0 */2 * * *", "0 9-17 * * *", "0 9,12 * * *", "0 * * * *"] {
            assert!(matches!(
                offset_cron_hours(expression, 1),
                Err(ScoutError::Config(ConfigError::InvalidCron { .. }))
            ));
        }
    }

    #[test]
    fn test_offset_rejects_past_midnight() {
        assert!(offset_cron_hours("0 23 1 */3 *", 1).is_err());
        assert_eq!(offset_cron_hours("0 22 1 */3 *", 1).unwrap(), "0 23 1 */3 *");
    }

    #[test]
    fn test_offset_zero_is_identity() {
        assert_eq!(offset_cron_hours("30 6 * * 1", 0).unwrap(), "30 6 * * 1");
    }

    #[test]
    fn test_parse_cron_field_count() {
        assert!(parse_cron("0 9 1 */3 *").is_ok());
        assert!(parse_cron("0 9 1 */3").is_err());
        assert!(parse_cron("0 0 9 1 */3 *").is_err());
        assert!(parse_cron("0 99 1 * *").is_err());
    }

    #[test]
    fn test_timezone_abbreviations_and_offsets() {
        assert_eq!(parse_timezone("utc").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_timezone("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_timezone("EST").unwrap().local_minus_utc(), -5 * 3600);
        assert_eq!(parse_timezone("PDT").unwrap().local_minus_utc(), -7 * 3600);
        assert_eq!(parse_timezone("+05:30").unwrap().local_minus_utc(), 5 * 3600 + 1800);
        assert_eq!(parse_timezone("-0800").unwrap().local_minus_utc(), -8 * 3600);
    }

    #[test]
    fn test_unknown_timezone() {
        for tz in ["Mars/Olympus", "+25:00", "+05:75", ""] {
            assert!(matches!(
                parse_timezone(tz),
                Err(ScoutError::Config(ConfigError::UnknownTimezone { .. }))
            ));
        }
    }

    #[test]
    fn test_schedule_evaluates_in_timezone() {
        let est = parse_timezone("EST").unwrap();
        let schedule = CronSchedule::new("0 9 * * *", est).unwrap();
        let next = schedule.next_after(utc(2025, 3, 1, 0)).unwrap();
        // 09:00 EST is 14:00 UTC
        assert_eq!(next.hour(), 14);
    }

    #[test]
    fn test_next_after_is_exclusive() {
        let schedule = CronSchedule::new("0 9 1 */3 *", parse_timezone("UTC").unwrap()).unwrap();
        let fire = utc(2025, 4, 1, 9);
        assert_eq!(schedule.next_after(fire).unwrap(), utc(2025, 7, 1, 9));
    }
}
