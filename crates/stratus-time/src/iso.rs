//! ISO-8601 timestamps with microsecond precision
//!
//! Output is `YYYY-mm-ddTHH:MM:SS.uuuuuu+hh:mm` in local time. Breaking a
//! date down into calendar fields is the costly part and only changes once
//! per second, so it is cached.

use std::fmt::Display;

use chrono::{Local, TimeZone};
use stratus_core::PackedClock;

const FALLBACK_PREFIX: &str = "YYYY-mm-ddTHH:MM:SS";
const FALLBACK_OFFSET: &str = "-00:00";

/// Per-thread cache of the second-granular part of the timestamp
#[derive(Clone, Debug, Default)]
pub struct IsoTimeCache {
    secs: Option<u32>,
    prefix: String,
    offset: String,
}

impl IsoTimeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Format `date` in the local time zone. `pad` appends one space.
    pub fn format(&mut self, date: PackedClock, pad: bool) -> String {
        self.format_in(&Local, date, pad)
    }

    /// Format `date` in time zone `tz`
    pub fn format_in<Tz>(&mut self, tz: &Tz, date: PackedClock, pad: bool) -> String
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        if self.secs != Some(date.secs()) || date.secs() == 0 {
            match tz.timestamp_opt(date.secs() as i64, 0).earliest() {
                Some(dt) => {
                    self.prefix = dt.format("%Y-%m-%dT%H:%M:%S").to_string();
                    self.offset = dt.format("%:z").to_string();
                }
                None => {
                    self.prefix = FALLBACK_PREFIX.to_string();
                    self.offset = FALLBACK_OFFSET.to_string();
                }
            }
            self.secs = Some(date.secs());
        }

        let mut out = String::with_capacity(33);
        out.push_str(&self.prefix);
        out.push('.');
        out.push_str(&format!("{:06}", date.usecs()));
        out.push_str(&self.offset);
        if pad {
            out.push(' ');
        }
        out
    }
}
