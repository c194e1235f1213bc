//! Trading-session calendar: trading days, the RTH window and the bucket grid.
//!
//! Every instant handed in or out of this module is UTC. Exchange-local time
//! only exists inside it, converted through the exchange [`Tz`] so daylight
//! saving shifts come from the tz database rather than a fixed offset.
//!
//! The holiday set is a conservative approximation of the US equity calendar:
//! three fixed-date holidays with weekend observance plus five floating ones.
//! Good Friday, Juneteenth and early-close days are not modelled.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Default bucket width in minutes.
pub const DEFAULT_BUCKET_MINUTES: i64 = 5;

/// Default exchange timezone.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::New_York;

/// Errors raised while building a calendar.
#[derive(Debug, Error, PartialEq)]
pub enum CalendarError {
    #[error("bucket width must be positive (got {0} minutes)")]
    NonPositiveBucket(i64),

    #[error("bucket width of {minutes} minutes exceeds the {session_minutes}-minute session")]
    BucketWiderThanSession { minutes: i64, session_minutes: i64 },

    #[error("session open {open} must be before close {close}")]
    InvertedSession { open: NaiveTime, close: NaiveTime },

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("invalid session time '{0}' (expected HH:MM)")]
    InvalidTime(String),
}

/// Session calendar for one exchange.
///
/// Stateless apart from a lazily filled per-year holiday cache, so a single
/// instance can be shared (behind an `Arc`) by any number of engines.
#[derive(Debug)]
pub struct SessionCalendar {
    tz: Tz,
    rth_open: NaiveTime,
    rth_close: NaiveTime,
    bucket_minutes: i64,
    holidays: Mutex<HashMap<i32, Arc<BTreeSet<NaiveDate>>>>,
}

impl SessionCalendar {
    pub fn new(
        tz: Tz,
        rth_open: NaiveTime,
        rth_close: NaiveTime,
        bucket_minutes: i64,
    ) -> Result<Self, CalendarError> {
        if bucket_minutes <= 0 {
            return Err(CalendarError::NonPositiveBucket(bucket_minutes));
        }
        if rth_open >= rth_close {
            return Err(CalendarError::InvertedSession {
                open: rth_open,
                close: rth_close,
            });
        }
        let session_minutes = (rth_close - rth_open).num_minutes();
        if bucket_minutes > session_minutes {
            return Err(CalendarError::BucketWiderThanSession {
                minutes: bucket_minutes,
                session_minutes,
            });
        }
        Ok(Self {
            tz,
            rth_open,
            rth_close,
            bucket_minutes,
            holidays: Mutex::new(HashMap::new()),
        })
    }

    /// Build a calendar from textual settings (`"America/New_York"`, `"09:30"`, ...).
    pub fn from_settings(
        timezone: &str,
        rth_open: &str,
        rth_close: &str,
        bucket_minutes: i64,
    ) -> Result<Self, CalendarError> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| CalendarError::UnknownTimezone(timezone.to_string()))?;
        Self::new(
            tz,
            parse_session_time(rth_open)?,
            parse_session_time(rth_close)?,
            bucket_minutes,
        )
    }

    /// US equities: 09:30–16:00 New York time, 5-minute buckets.
    pub fn us_equities() -> Self {
        Self {
            tz: DEFAULT_TIMEZONE,
            rth_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            rth_close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN),
            bucket_minutes: DEFAULT_BUCKET_MINUTES,
            holidays: Mutex::new(HashMap::new()),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn rth_open(&self) -> NaiveTime {
        self.rth_open
    }

    pub fn rth_close(&self) -> NaiveTime {
        self.rth_close
    }

    pub fn bucket_minutes(&self) -> i64 {
        self.bucket_minutes
    }

    pub fn bucket_width(&self) -> Duration {
        Duration::minutes(self.bucket_minutes)
    }

    /// Weekdays that are not in the approximate holiday set.
    pub fn is_trading_day(&self, day: NaiveDate) -> bool {
        if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        !self.holidays_for(day.year()).contains(&day)
    }

    /// Observed holidays for `year`, computed once and cached.
    pub fn holidays_for(&self, year: i32) -> Arc<BTreeSet<NaiveDate>> {
        let mut cache = self.holidays.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            cache
                .entry(year)
                .or_insert_with(|| Arc::new(approximate_us_holidays(year))),
        )
    }

    pub fn session_open(&self, day: NaiveDate) -> DateTime<Utc> {
        self.local_to_utc(day, self.rth_open)
    }

    pub fn session_close(&self, day: NaiveDate) -> DateTime<Utc> {
        self.local_to_utc(day, self.rth_close)
    }

    /// Every bucket start from open (inclusive) to close (exclusive).
    ///
    /// Derived from the date alone, so a replay can always be restarted.
    pub fn buckets(&self, day: NaiveDate) -> Vec<DateTime<Utc>> {
        let open = self.session_open(day);
        let close = self.session_close(day);
        let step = self.bucket_width();
        let mut buckets = Vec::new();
        let mut current = open;
        while current < close {
            buckets.push(current);
            current += step;
        }
        buckets
    }

    /// Floor `ts` onto the bucket grid anchored at its session's open.
    ///
    /// Timestamps that belong to no session come back unchanged; callers that
    /// care must check [`in_rth`](Self::in_rth) first.
    pub fn bucketize(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let Some(session) = self.session_date_from_ts(ts) else {
            return ts;
        };
        let open = self.session_open(session);
        let width = self.bucket_width().num_seconds();
        let steps = (ts - open).num_seconds().div_euclid(width);
        open + Duration::seconds(steps * width)
    }

    /// True iff the local date is a trading day and local time is in `[open, close)`.
    pub fn in_rth(&self, ts: DateTime<Utc>) -> bool {
        let local = ts.with_timezone(&self.tz);
        if !self.is_trading_day(local.date_naive()) {
            return false;
        }
        let time = local.time();
        self.rth_open <= time && time < self.rth_close
    }

    /// The trading session an instant belongs to.
    ///
    /// From open until local midnight it is the same day (when that day
    /// trades); before the open it is the previous trading day. Anything else
    /// (a non-trading day after its would-be open) has no session.
    pub fn session_date_from_ts(&self, ts: DateTime<Utc>) -> Option<NaiveDate> {
        let local = ts.with_timezone(&self.tz);
        let day = local.date_naive();
        let time = local.time();
        if time >= self.rth_open {
            return self.is_trading_day(day).then_some(day);
        }
        let mut previous = day.pred_opt()?;
        while !self.is_trading_day(previous) {
            previous = previous.pred_opt()?;
        }
        Some(previous)
    }

    fn local_to_utc(&self, day: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let naive = day.and_time(time);
        if let Some(local) = self.tz.from_local_datetime(&naive).earliest() {
            return local.with_timezone(&Utc);
        }
        // Wall-clock time skipped by a DST jump: use the first instant after the gap.
        self.tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
    }
}

impl Default for SessionCalendar {
    fn default() -> Self {
        Self::us_equities()
    }
}

impl Clone for SessionCalendar {
    fn clone(&self) -> Self {
        Self {
            tz: self.tz,
            rth_open: self.rth_open,
            rth_close: self.rth_close,
            bucket_minutes: self.bucket_minutes,
            holidays: Mutex::new(HashMap::new()),
        }
    }
}

/// Parse `"HH:MM"` (or `"HH:MM:SS"`).
pub fn parse_session_time(text: &str) -> Result<NaiveTime, CalendarError> {
    NaiveTime::parse_from_str(text, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
        .map_err(|_| CalendarError::InvalidTime(text.to_string()))
}

// ── Holidays ─────────────────────────────────────────────────────────

fn approximate_us_holidays(year: i32) -> BTreeSet<NaiveDate> {
    let mut days: BTreeSet<NaiveDate> = [(1, 1), (7, 4), (12, 25)]
        .into_iter()
        .filter_map(|(month, day)| NaiveDate::from_ymd_opt(year, month, day))
        .map(observed)
        .collect();

    days.extend(
        [
            NaiveDate::from_weekday_of_month_opt(year, 1, Weekday::Mon, 3), // MLK Day
            NaiveDate::from_weekday_of_month_opt(year, 2, Weekday::Mon, 3), // Presidents' Day
            last_weekday_of_month(year, 5, Weekday::Mon),                   // Memorial Day
            NaiveDate::from_weekday_of_month_opt(year, 9, Weekday::Mon, 1), // Labor Day
            NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Thu, 4), // Thanksgiving
        ]
        .into_iter()
        .flatten(),
    );
    days
}

/// Saturday holidays are observed on Friday, Sunday ones on Monday.
fn observed(day: NaiveDate) -> NaiveDate {
    match day.weekday() {
        Weekday::Sat => day.pred_opt().unwrap_or(day),
        Weekday::Sun => day.succ_opt().unwrap_or(day),
        _ => day,
    }
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let mut day = first_of_next.pred_opt()?;
    while day.weekday() != weekday {
        day = day.pred_opt()?;
    }
    Some(day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn weekends_are_not_trading_days() {
        let cal = SessionCalendar::default();
        assert!(!cal.is_trading_day(date(2024, 1, 6)));
        assert!(!cal.is_trading_day(date(2024, 1, 7)));
        assert!(cal.is_trading_day(date(2024, 1, 3)));
    }

    #[test]
    fn fixed_and_floating_holidays_are_closed() {
        let cal = SessionCalendar::default();
        assert!(!cal.is_trading_day(date(2024, 1, 1))); // New Year
        assert!(!cal.is_trading_day(date(2024, 1, 15))); // MLK
        assert!(!cal.is_trading_day(date(2024, 2, 19))); // Presidents'
        assert!(!cal.is_trading_day(date(2024, 5, 27))); // Memorial
        assert!(!cal.is_trading_day(date(2024, 7, 4)));
        assert!(!cal.is_trading_day(date(2024, 9, 2))); // Labor
        assert!(!cal.is_trading_day(date(2024, 11, 28))); // Thanksgiving
        assert!(!cal.is_trading_day(date(2024, 12, 25)));
    }

    #[test]
    fn weekend_holidays_shift_to_observed_weekday() {
        let cal = SessionCalendar::default();
        // Christmas 2022 fell on a Sunday
        assert!(!cal.is_trading_day(date(2022, 12, 26)));
        // Christmas 2021 fell on a Saturday
        assert!(!cal.is_trading_day(date(2021, 12, 24)));
        // Independence Day 2026 falls on a Saturday
        assert!(!cal.is_trading_day(date(2026, 7, 3)));
    }

    #[test]
    fn approximation_keeps_unmodelled_holidays_open() {
        let cal = SessionCalendar::default();
        assert!(cal.is_trading_day(date(2024, 3, 29))); // Good Friday
        assert!(cal.is_trading_day(date(2024, 6, 19))); // Juneteenth
    }

    #[test]
    fn holiday_cache_is_reused() {
        let cal = SessionCalendar::default();
        let first = cal.holidays_for(2024);
        let second = cal.holidays_for(2024);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 8);
    }

    #[test]
    fn session_window_follows_daylight_saving() {
        let cal = SessionCalendar::default();
        // EST (UTC-5)
        assert_eq!(cal.session_open(date(2024, 1, 3)), utc("2024-01-03T14:30:00Z"));
        assert_eq!(cal.session_close(date(2024, 1, 3)), utc("2024-01-03T21:00:00Z"));
        // EDT (UTC-4), DST started 2024-03-10
        assert_eq!(cal.session_open(date(2024, 3, 11)), utc("2024-03-11T13:30:00Z"));
        assert_eq!(cal.session_close(date(2024, 3, 11)), utc("2024-03-11T20:00:00Z"));
    }

    #[test]
    fn full_session_has_78_five_minute_buckets() {
        let cal = SessionCalendar::default();
        let buckets = cal.buckets(date(2024, 1, 3));
        assert_eq!(buckets.len(), 78);
        assert_eq!(buckets[0], utc("2024-01-03T14:30:00Z"));
        assert_eq!(buckets[77], utc("2024-01-03T20:55:00Z"));
        assert!(buckets.windows(2).all(|w| w[1] - w[0] == Duration::minutes(5)));
    }

    #[test]
    fn bucket_width_changes_grid() {
        let cal = SessionCalendar::new(
            DEFAULT_TIMEZONE,
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            15,
        )
        .unwrap();
        assert_eq!(cal.buckets(date(2024, 1, 3)).len(), 26);
    }

    #[test]
    fn invalid_calendars_are_rejected() {
        let open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let close = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
        assert_eq!(
            SessionCalendar::new(DEFAULT_TIMEZONE, open, close, 0).unwrap_err(),
            CalendarError::NonPositiveBucket(0)
        );
        assert!(matches!(
            SessionCalendar::new(DEFAULT_TIMEZONE, close, open, 5),
            Err(CalendarError::InvertedSession { .. })
        ));
        assert!(matches!(
            SessionCalendar::from_settings("Mars/Olympus", "09:30", "16:00", 5),
            Err(CalendarError::UnknownTimezone(_))
        ));
        assert!(matches!(
            SessionCalendar::from_settings("America/New_York", "9h30", "16:00", 5),
            Err(CalendarError::InvalidTime(_))
        ));
    }

    #[test]
    fn bucket_wider_than_session_is_rejected() {
        let err = SessionCalendar::from_settings("America/New_York", "09:30", "16:00", 1_000_000_000_000)
            .unwrap_err();
        assert_eq!(
            err,
            CalendarError::BucketWiderThanSession {
                minutes: 1_000_000_000_000,
                session_minutes: 390,
            }
        );

        let single = SessionCalendar::from_settings("America/New_York", "09:30", "16:00", 390).unwrap();
        assert_eq!(single.buckets(date(2024, 1, 3)).len(), 1);
    }

    #[test]
    fn bucketize_floors_to_grid() {
        let cal = SessionCalendar::default();
        assert_eq!(
            cal.bucketize(utc("2024-01-03T14:37:12Z")),
            utc("2024-01-03T14:35:00Z")
        );
        assert_eq!(
            cal.bucketize(utc("2024-01-03T14:30:00Z")),
            utc("2024-01-03T14:30:00Z")
        );
    }

    #[test]
    fn bucketize_outside_any_session_is_identity() {
        let cal = SessionCalendar::default();
        let saturday_noon = utc("2024-01-06T17:00:00Z");
        assert_eq!(cal.bucketize(saturday_noon), saturday_noon);
    }

    #[test]
    fn rth_window_is_half_open() {
        let cal = SessionCalendar::default();
        assert!(!cal.in_rth(utc("2024-01-03T14:29:59Z")));
        assert!(cal.in_rth(utc("2024-01-03T14:30:00Z")));
        assert!(cal.in_rth(utc("2024-01-03T20:59:59Z")));
        assert!(!cal.in_rth(utc("2024-01-03T21:00:00Z")));
        assert!(!cal.in_rth(utc("2024-01-01T15:00:00Z"))); // holiday
    }

    #[test]
    fn session_date_resolution() {
        let cal = SessionCalendar::default();
        // During RTH
        assert_eq!(cal.session_date_from_ts(utc("2024-01-03T15:00:00Z")), Some(date(2024, 1, 3)));
        // After close, same evening
        assert_eq!(cal.session_date_from_ts(utc("2024-01-03T23:30:00Z")), Some(date(2024, 1, 3)));
        // Before next open belongs to the prior session
        assert_eq!(cal.session_date_from_ts(utc("2024-01-04T13:00:00Z")), Some(date(2024, 1, 3)));
        // Monday pre-open rolls back over the weekend
        assert_eq!(cal.session_date_from_ts(utc("2024-01-08T12:00:00Z")), Some(date(2024, 1, 5)));
        // Tuesday after MLK Day rolls back past the holiday
        assert_eq!(cal.session_date_from_ts(utc("2024-01-16T12:00:00Z")), Some(date(2024, 1, 12)));
        // Saturday afternoon has no session
        assert_eq!(cal.session_date_from_ts(utc("2024-01-06T18:00:00Z")), None);
    }

    proptest! {
        /// Any RTH instant floors to a grid point no later than itself and less than one width earlier.
        #[test]
        fn bucketize_is_a_floor(offset_secs in 0i64..(390 * 60)) {
            let cal = SessionCalendar::default();
            let open = cal.session_open(date(2024, 1, 3));
            let ts = open + Duration::seconds(offset_secs);
            let bucket = cal.bucketize(ts);
            prop_assert!(bucket <= ts);
            prop_assert!(ts - bucket < cal.bucket_width());
            prop_assert!(cal.buckets(date(2024, 1, 3)).contains(&bucket));
        }

        /// Bucketizing twice changes nothing.
        #[test]
        fn bucketize_is_idempotent(offset_secs in 0i64..(390 * 60)) {
            let cal = SessionCalendar::default();
            let ts = cal.session_open(date(2024, 7, 10)) + Duration::seconds(offset_secs);
            let once = cal.bucketize(ts);
            prop_assert_eq!(cal.bucketize(once), once);
        }
    }
}
