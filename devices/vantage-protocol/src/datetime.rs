//! Packed date/time formats used by DMP archive records and the GETTIME/SETTIME
//! commands. Both are host-timezone-naive: the console has no concept of time
//! zone, so these always round-trip through [`chrono::NaiveDateTime`].

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::ProtocolError;

/// Sentinel value for both halves of a DMP packed date/time, marking an
/// archive slot that has never been written.
pub const DMP_SENTINEL: u16 = 0xffff;

/// Unpack a DMP archive record's `(date, time)` 16-bit pair into a timestamp.
///
/// `date` packs `day + month * 32 + (year - 2000) * 512`; `time` packs
/// `hour * 100 + minute`. Returns `None` if either half is the `0xffff`
/// sentinel (an unwritten slot), which callers use to stop paging.
pub fn unpack_dmp_date_time(date: u16, time: u16) -> Result<Option<NaiveDateTime>, ProtocolError> {
    if date == DMP_SENTINEL || time == DMP_SENTINEL {
        return Ok(None);
    }
    let day = (date & 0x1f) as u32;
    let month = ((date >> 5) & 0x0f) as u32;
    let year = 2000 + (date >> 9) as i32;
    let hour = (time / 100) as u32;
    let minute = (time % 100) as u32;

    let day = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or(ProtocolError::InvalidDateTime(date, time))?;
    let ts = day
        .and_hms_opt(hour, minute, 0)
        .ok_or(ProtocolError::InvalidDateTime(date, time))?;
    Ok(Some(ts))
}

/// Pack a timestamp into a DMP archive record's `(date, time)` 16-bit pair.
pub fn pack_dmp_date_time(ts: NaiveDateTime) -> (u16, u16) {
    use chrono::{Datelike, Timelike};

    let date = ts.day() as u16 + ts.month() as u16 * 32 + (ts.year() as u16 - 2000) * 512;
    let time = ts.hour() as u16 * 100 + ts.minute() as u16;
    (date, time)
}

/// Unpack the 6-byte big-endian GETTIME reply: seconds, minutes, hours, day,
/// month, year-since-1900.
pub fn unpack_datetime(bytes: &[u8; 6]) -> Result<NaiveDateTime, ProtocolError> {
    let [sec, min, hour, day, month, year] = *bytes;
    let date = NaiveDate::from_ymd_opt(1900 + year as i32, month as u32, day as u32)
        .ok_or(ProtocolError::InvalidDateTime(
            u16::from(day) | (u16::from(month) << 8),
            u16::from(year),
        ))?;
    date.and_hms_opt(hour as u32, min as u32, sec as u32)
        .ok_or(ProtocolError::InvalidDateTime(u16::from(hour), u16::from(min)))
}

/// Pack a timestamp into the 6-byte big-endian SETTIME payload.
pub fn pack_datetime(ts: NaiveDateTime) -> [u8; 6] {
    use chrono::{Datelike, Timelike};

    [
        ts.second() as u8,
        ts.minute() as u8,
        ts.hour() as u8,
        ts.day() as u8,
        ts.month() as u8,
        (ts.year() - 1900) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn dmp_round_trip() {
        let ts = NaiveDate::from_ymd_opt(2012, 6, 8)
            .unwrap()
            .and_hms_opt(16, 40, 0)
            .unwrap();
        let (date, time) = pack_dmp_date_time(ts);
        assert_eq!(unpack_dmp_date_time(date, time).unwrap(), Some(ts));
    }

    #[test]
    fn dmp_sentinel_is_none() {
        assert_eq!(unpack_dmp_date_time(0xffff, 0xffff).unwrap(), None);
    }

    #[test]
    fn dmp_sentinel_in_either_half_is_none() {
        assert_eq!(unpack_dmp_date_time(0xffff, 0x0730).unwrap(), None);
        assert_eq!(unpack_dmp_date_time(0x1234, 0xffff).unwrap(), None);
    }

    #[test]
    fn settime_round_trip() {
        let ts = NaiveDate::from_ymd_opt(2012, 6, 8)
            .unwrap()
            .and_hms_opt(16, 40, 12)
            .unwrap();
        let bytes = pack_datetime(ts);
        assert_eq!(unpack_datetime(&bytes).unwrap(), ts);
    }
}
