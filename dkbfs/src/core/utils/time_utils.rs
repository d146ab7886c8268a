// SPDX-License-Identifier: MIT

//! Timestamp packing for FAT-style and OS-9 records.
//!
//! - `now()` → current UTC time as a `PrimitiveDateTime`
//! - `fat_pack()` / `fat_unpack()` → DOS date/time words
//! - `os9_pack()` / `os9_unpack()` → OS-9 `YY MM DD HH MI` bytes

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

pub fn now() -> PrimitiveDateTime {
    let t = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(t.date(), t.time())
}

/// Packs into `(date, time)` DOS words. Years outside 1980..=2107 are clamped.
pub fn fat_pack(dt: PrimitiveDateTime) -> (u16, u16) {
    let year = dt.year().clamp(1980, 2107) as u16;
    let date = (year - 1980) << 9 | (dt.month() as u16) << 5 | dt.day() as u16;
    let time = (dt.hour() as u16) << 11 | (dt.minute() as u16) << 5 | (dt.second() as u16 / 2);
    (date, time)
}

/// Unpacks DOS words; `None` when the date field is zero or out of range.
pub fn fat_unpack(date: u16, time: u16) -> Option<PrimitiveDateTime> {
    if date == 0 {
        return None;
    }
    let year = 1980 + (date >> 9) as i32;
    let month = Month::try_from(((date >> 5) & 0x0F) as u8).ok()?;
    let day = (date & 0x1F) as u8;
    let d = Date::from_calendar_date(year, month, day).ok()?;
    let t = Time::from_hms(
        (time >> 11) as u8,
        ((time >> 5) & 0x3F) as u8,
        ((time & 0x1F) * 2) as u8,
    )
    .unwrap_or(Time::MIDNIGHT);
    Some(PrimitiveDateTime::new(d, t))
}

/// Packs into OS-9 `YY MM DD HH MI`, year relative to 1900.
pub fn os9_pack(dt: PrimitiveDateTime) -> [u8; 5] {
    let year = (dt.year() - 1900).clamp(0, 255) as u8;
    [year, dt.month() as u8, dt.day(), dt.hour(), dt.minute()]
}

pub fn os9_unpack(b: &[u8]) -> Option<PrimitiveDateTime> {
    if b.len() < 3 || b[1] == 0 {
        return None;
    }
    let month = Month::try_from(b[1]).ok()?;
    let d = Date::from_calendar_date(1900 + b[0] as i32, month, b[2]).ok()?;
    let (h, m) = match b {
        [_, _, _, h, m, ..] => (*h, *m),
        _ => (0, 0),
    };
    let t = Time::from_hms(h, m, 0).unwrap_or(Time::MIDNIGHT);
    Some(PrimitiveDateTime::new(d, t))
}
