//! Calendar date/time conversions using O(1) algorithms
//!
//! Implements Howard Hinnant's civil_from_days and days_from_civil algorithms.
//! Reference: http://howardhinnant.github.io/date_algorithms.html
//!
//! Both directions work on signed 64-bit seconds, so times before 1970 and
//! far after 2106 convert correctly. UTC only, no leap seconds.

use hal_abstractions::CanonicalTime;

const SECONDS_PER_DAY: i64 = 86_400;

/// Days from 0000-03-01 to 1970-01-01
const EPOCH_SHIFT_DAYS: i64 = 719_468;

/// Check if year is a leap year (Gregorian calendar)
pub fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in `month` (1-12) of `year`
pub fn days_in_month(year: i64, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Convert a Unix timestamp to broken-down UTC time (`gmtime`)
///
/// Returns `None` unless both the Gregorian year and the `struct tm` year
/// field fit an `i32`.
pub fn to_canonical(unix_secs: i64) -> Option<CanonicalTime> {
    let days_since_epoch = unix_secs.div_euclid(SECONDS_PER_DAY);
    let secs_today = unix_secs.rem_euclid(SECONDS_PER_DAY);

    let (year, month, day) = civil_from_days(days_since_epoch);
    let year = i32::try_from(year).ok()?;
    let year = year.checked_sub(CanonicalTime::YEAR_BASE)?;

    Some(CanonicalTime {
        seconds: (secs_today % 60) as u8,
        minutes: ((secs_today % 3600) / 60) as u8,
        hours: (secs_today / 3600) as u8,
        day,
        month: month - 1,
        year,
    })
}

/// Convert broken-down UTC time to a Unix timestamp (`timegm`)
///
/// Fields are not range checked; use [`is_valid`] first when the input is
/// untrusted.
pub fn to_unix(time: &CanonicalTime) -> i64 {
    let days_since_epoch = days_from_civil(time.full_year(), time.month_number(), time.day);

    days_since_epoch * SECONDS_PER_DAY
        + (time.hours as i64) * 3600
        + (time.minutes as i64) * 60
        + (time.seconds as i64)
}

/// Check that every field of `time` is within its calendar range
pub fn is_valid(time: &CanonicalTime) -> bool {
    let year = time.full_year();
    time.month <= 11
        && time.day >= 1
        && time.day <= days_in_month(year, time.month_number())
        && time.hours < 24
        && time.minutes < 60
        && time.seconds <= 60
}

/// Convert days since Unix epoch to civil date (year, month 1-12, day 1-31)
fn civil_from_days(days_since_epoch: i64) -> (i64, u8, u8) {
    // Shift epoch to 0000-03-01 so the leap day ends the year
    let z = days_since_epoch + EPOCH_SHIFT_DAYS;

    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365; // [0, 399]
    let y = (yoe as i64) + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]

    // Month [0, 11] where 0 = March, 11 = February
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u8;

    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Convert civil date (year, month 1-12, day 1-31) to days since Unix epoch
fn days_from_civil(year: i64, month: u8, day: u8) -> i64 {
    let m = month as i64;
    let (y, m) = if m <= 2 { (year - 1, m + 9) } else { (year, m - 3) };

    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400; // [0, 399]
    let doy = (153 * m + 2) / 5 + (day as i64) - 1; // [0, 365]
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy; // [0, 146096]

    era * 146_097 + doe - EPOCH_SHIFT_DAYS
}
