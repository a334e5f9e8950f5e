//! Time-bucket alignment flags.
//!
//! Every stored observation carries 22 booleans, one per bucket size from
//! 1 minute to 4 weeks. A flag is set when the bar's timestamp opens a bucket
//! of that size, evaluated on the exchange's local wall clock:
//!
//! | unit   | set when                                                    |
//! |--------|-------------------------------------------------------------|
//! | minute | seconds are zero and minute-of-day is a multiple of N       |
//! | hour   | on the hour and hour-of-day is a multiple of N              |
//! | day    | local midnight and days since 1970-01-01 is a multiple of N |
//! | week   | Monday midnight and Monday-weeks since 1970 is a multiple of N |

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketUnit {
    Minute,
    Hour,
    Day,
    Week,
}

/// A bucket size and the column its flag is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub column: &'static str,
    pub unit: BucketUnit,
    pub size: u32,
}

const fn bucket(column: &'static str, unit: BucketUnit, size: u32) -> Bucket {
    Bucket { column, unit, size }
}

pub const BUCKET_COUNT: usize = 22;

/// All buckets in column order.
pub const BUCKETS: [Bucket; BUCKET_COUNT] = [
    bucket("m1", BucketUnit::Minute, 1),
    bucket("m3", BucketUnit::Minute, 3),
    bucket("m5", BucketUnit::Minute, 5),
    bucket("m15", BucketUnit::Minute, 15),
    bucket("m30", BucketUnit::Minute, 30),
    bucket("m45", BucketUnit::Minute, 45),
    bucket("h1", BucketUnit::Hour, 1),
    bucket("h2", BucketUnit::Hour, 2),
    bucket("h4", BucketUnit::Hour, 4),
    bucket("h8", BucketUnit::Hour, 8),
    bucket("h12", BucketUnit::Hour, 12),
    bucket("h16", BucketUnit::Hour, 16),
    bucket("d1", BucketUnit::Day, 1),
    bucket("d2", BucketUnit::Day, 2),
    bucket("d3", BucketUnit::Day, 3),
    bucket("d4", BucketUnit::Day, 4),
    bucket("d5", BucketUnit::Day, 5),
    bucket("d6", BucketUnit::Day, 6),
    bucket("w1", BucketUnit::Week, 1),
    bucket("w2", BucketUnit::Week, 2),
    bucket("w3", BucketUnit::Week, 3),
    bucket("w4", BucketUnit::Week, 4),
];

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

impl Bucket {
    /// Whether `local` opens a bucket of this size.
    pub fn opens_at(&self, local: NaiveDateTime) -> bool {
        let size = i64::from(self.size.max(1));
        let time = local.time();
        let on_minute = time.second() == 0 && time.nanosecond() == 0;
        let at_midnight = on_minute && time.hour() == 0 && time.minute() == 0;

        match self.unit {
            BucketUnit::Minute => {
                on_minute && i64::from(time.hour() * 60 + time.minute()) % size == 0
            }
            BucketUnit::Hour => on_minute && time.minute() == 0 && i64::from(time.hour()) % size == 0,
            BucketUnit::Day => {
                let days = (local.date() - epoch()).num_days();
                at_midnight && days.rem_euclid(size) == 0
            }
            BucketUnit::Week => {
                // 1970-01-05 is the first Monday after the epoch
                let days = (local.date() - epoch()).num_days() - 4;
                at_midnight
                    && local.weekday() == Weekday::Mon
                    && days.div_euclid(7).rem_euclid(size) == 0
            }
        }
    }
}

/// The bucket flags of one observation, in [`BUCKETS`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BucketFlags([bool; BUCKET_COUNT]);

impl BucketFlags {
    /// Flags for `ts` read on the wall clock of `timezone` (UTC when the zone
    /// is missing or unknown).
    pub fn for_timestamp(ts: DateTime<Utc>, timezone: Option<&str>) -> Self {
        let local = match timezone.and_then(|tz| tz.parse::<Tz>().ok()) {
            Some(tz) => ts.with_timezone(&tz).naive_local(),
            None => ts.naive_utc(),
        };
        Self::for_local(local)
    }

    pub fn for_local(local: NaiveDateTime) -> Self {
        let mut flags = [false; BUCKET_COUNT];
        for (flag, bucket) in flags.iter_mut().zip(BUCKETS.iter()) {
            *flag = bucket.opens_at(local);
        }
        Self(flags)
    }

    pub fn from_array(flags: [bool; BUCKET_COUNT]) -> Self {
        Self(flags)
    }

    pub fn as_array(&self) -> &[bool; BUCKET_COUNT] {
        &self.0
    }

    /// Flag by column name ("m5", "h1", "w4", ...).
    pub fn get(&self, column: &str) -> Option<bool> {
        BUCKETS
            .iter()
            .position(|b| b.column == column)
            .map(|i| self.0[i])
    }

    /// Columns whose flag is set.
    pub fn set_columns(&self) -> Vec<&'static str> {
        BUCKETS
            .iter()
            .zip(self.0.iter())
            .filter(|(_, &set)| set)
            .map(|(b, _)| b.column)
            .collect()
    }
}
