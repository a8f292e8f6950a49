//! Fixed-layout console records: the LOOP real-time packet and the archive
//! (DMP) record and page framing.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::alarms::{AlarmExTempHum, AlarmFlags, AlarmIn, AlarmOut, AlarmRain, AlarmSoilLeaf};
use crate::crc;
use crate::error::ProtocolError;

/// Explode a fixed-size array of optional sensor readings into
/// 1-indexed keys (`prefix01`, `prefix02`, ...), skipping absent sensors.
fn flatten_array<const N: usize>(map: &mut BTreeMap<String, f64>, prefix: &str, values: [Option<u8>; N]) {
    for (i, value) in values.into_iter().enumerate() {
        if let Some(value) = value {
            map.insert(format!("{prefix}{:02}", i + 1), value as f64);
        }
    }
}

fn flatten_offset_array<const N: usize>(
    map: &mut BTreeMap<String, f64>,
    prefix: &str,
    values: [Option<i16>; N],
) {
    for (i, value) in values.into_iter().enumerate() {
        if let Some(value) = value {
            map.insert(format!("{prefix}{:02}", i + 1), value as f64);
        }
    }
}

const LOOP_LEN: usize = 99;
const ARCHIVE_LEN: usize = 52;
const DMP_HEADER_LEN: usize = 6;
const DMP_PAGE_LEN: usize = 267;
const DMP_RECORDS_PER_PAGE: usize = 5;

fn sensor_byte(raw: u8) -> Option<u8> {
    if raw == 0xff { None } else { Some(raw) }
}

fn sensor_offset(raw: u8) -> Option<i16> {
    if raw == 0xff { None } else { Some(raw as i16 - 90) }
}

fn read_array<const N: usize>(cursor: &mut Cursor<&[u8]>) -> Result<[u8; N], ProtocolError> {
    let mut buf = [0u8; N];
    cursor
        .read_exact(&mut buf)
        .map_err(|_| ProtocolError::ShortFrame { expected: N, got: 0 })?;
    Ok(buf)
}

/// The `LOOP` real-time data packet (99 bytes on the wire, CRC included).
#[derive(Debug, Clone, PartialEq)]
pub struct LoopPacket {
    pub bar_trend: i8,
    pub barometer: f64,
    pub temp_in: f64,
    pub hum_in: u8,
    pub temp_out: f64,
    pub wind_speed: u8,
    pub wind_speed_10min_avg: u8,
    pub wind_dir: u16,
    pub extra_temps: [Option<u8>; 7],
    pub soil_temps: [Option<u8>; 4],
    pub leaf_temps: [Option<u8>; 4],
    pub hum_out: u8,
    pub extra_hum: [Option<u8>; 7],
    pub rain_rate: f64,
    pub uv: u8,
    pub solar_rad: u16,
    pub storm_rain: f64,
    pub storm_start: Option<(u16, u8, u8)>,
    pub rain_day: f64,
    pub rain_month: f64,
    pub rain_year: f64,
    pub et_day: f64,
    pub et_month: f64,
    pub et_year: f64,
    pub soil_moist: [Option<u8>; 4],
    pub leaf_wetness: [Option<u8>; 4],
    pub alarms: AlarmFlags,
    pub battery_status: u8,
    pub battery_volts: f64,
    pub forecast_icon: u8,
    pub forecast_rule_no: u8,
    pub sun_rise: (u8, u8),
    pub sun_set: (u8, u8),
}

fn unpack_time(raw: u16) -> (u8, u8) {
    ((raw / 100) as u8, (raw % 100) as u8)
}

fn unpack_storm_date(raw: u16) -> (u16, u8, u8) {
    let year = 2000 + (raw & 0x7f);
    let day = ((raw >> 7) & 0x1f) as u8;
    let month = ((raw >> 12) & 0x0f) as u8;
    (year, month, day)
}

impl LoopPacket {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != LOOP_LEN {
            return Err(ProtocolError::ShortFrame {
                expected: LOOP_LEN,
                got: bytes.len(),
            });
        }
        if !crc::verify(bytes) {
            return Err(ProtocolError::BadCrc { what: "LOOP packet" });
        }

        let mut cursor = Cursor::new(bytes);
        let _loo: [u8; 3] = read_array(&mut cursor)?;
        let bar_trend = cursor.read_i8().map_err(io_err)?;
        let _packet_type = cursor.read_u8().map_err(io_err)?;
        let _next_rec = cursor.read_u16::<LittleEndian>().map_err(io_err)?;
        let barometer = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 1000.0;
        let temp_in = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 10.0;
        let hum_in = cursor.read_u8().map_err(io_err)?;
        let temp_out = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 10.0;
        let wind_speed = cursor.read_u8().map_err(io_err)?;
        let wind_speed_10min_avg = cursor.read_u8().map_err(io_err)?;
        let wind_dir = cursor.read_u16::<LittleEndian>().map_err(io_err)?;
        let extra_temps: [u8; 7] = read_array(&mut cursor)?;
        let soil_temps: [u8; 4] = read_array(&mut cursor)?;
        let leaf_temps: [u8; 4] = read_array(&mut cursor)?;
        let hum_out = cursor.read_u8().map_err(io_err)?;
        let extra_hum: [u8; 7] = read_array(&mut cursor)?;
        let rain_rate = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 100.0;
        let uv = cursor.read_u8().map_err(io_err)?;
        let solar_rad = cursor.read_u16::<LittleEndian>().map_err(io_err)?;
        let storm_rain = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 100.0;
        let storm_start_raw = cursor.read_u16::<LittleEndian>().map_err(io_err)?;
        let rain_day = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 100.0;
        let rain_month = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 100.0;
        let rain_year = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 100.0;
        let et_day = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 1000.0;
        let et_month = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 100.0;
        let et_year = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 100.0;
        let soil_moist: [u8; 4] = read_array(&mut cursor)?;
        let leaf_wetness: [u8; 4] = read_array(&mut cursor)?;
        let alarm_in = cursor.read_u8().map_err(io_err)?;
        let alarm_rain = cursor.read_u8().map_err(io_err)?;
        let alarm_out: [u8; 2] = read_array(&mut cursor)?;
        let alarm_ex_temp_hum: [u8; 8] = read_array(&mut cursor)?;
        let alarm_soil_leaf: [u8; 4] = read_array(&mut cursor)?;
        let battery_status = cursor.read_u8().map_err(io_err)?;
        let battery_volts =
            cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 * 300.0 / 512.0 / 100.0;
        let forecast_icon = cursor.read_u8().map_err(io_err)?;
        let forecast_rule_no = cursor.read_u8().map_err(io_err)?;
        let sun_rise = unpack_time(cursor.read_u16::<LittleEndian>().map_err(io_err)?);
        let sun_set = unpack_time(cursor.read_u16::<LittleEndian>().map_err(io_err)?);

        let storm_start = if storm_start_raw == 0xffff {
            None
        } else {
            Some(unpack_storm_date(storm_start_raw))
        };

        Ok(Self {
            bar_trend,
            barometer,
            temp_in,
            hum_in,
            temp_out,
            wind_speed,
            wind_speed_10min_avg,
            wind_dir,
            extra_temps: extra_temps.map(sensor_byte),
            soil_temps: soil_temps.map(sensor_byte),
            leaf_temps: leaf_temps.map(sensor_byte),
            hum_out,
            extra_hum: extra_hum.map(sensor_byte),
            rain_rate,
            uv,
            solar_rad,
            storm_rain,
            storm_start,
            rain_day,
            rain_month,
            rain_year,
            et_day,
            et_month,
            et_year,
            soil_moist: soil_moist.map(sensor_byte),
            leaf_wetness: leaf_wetness.map(sensor_byte),
            alarms: AlarmFlags {
                inside: AlarmIn::from_byte(alarm_in),
                rain: AlarmRain::from_byte(alarm_rain),
                outside: AlarmOut::from_bytes(alarm_out),
                extra_temp_hum: AlarmExTempHum::from_field({
                    let mut full = [0u8; 8];
                    full.copy_from_slice(&alarm_ex_temp_hum);
                    full
                }),
                soil_leaf: AlarmSoilLeaf::from_field(alarm_soil_leaf),
            },
            battery_status,
            battery_volts,
            forecast_icon,
            forecast_rule_no,
            sun_rise,
            sun_set,
        })
    }

    /// Explode the array/tuple-valued fields into 1-indexed scalar keys,
    /// for callers that want a generic map rather than the typed struct.
    /// Absent sensors (originally `0xff` on the wire) are omitted.
    pub fn flatten(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("bar_trend".into(), self.bar_trend as f64);
        map.insert("barometer".into(), self.barometer);
        map.insert("temp_in".into(), self.temp_in);
        map.insert("hum_in".into(), self.hum_in as f64);
        map.insert("temp_out".into(), self.temp_out);
        map.insert("wind_speed".into(), self.wind_speed as f64);
        map.insert("wind_speed_10min_avg".into(), self.wind_speed_10min_avg as f64);
        map.insert("wind_dir".into(), self.wind_dir as f64);
        map.insert("hum_out".into(), self.hum_out as f64);
        map.insert("rain_rate".into(), self.rain_rate);
        map.insert("uv".into(), self.uv as f64);
        map.insert("solar_rad".into(), self.solar_rad as f64);
        map.insert("storm_rain".into(), self.storm_rain);
        map.insert("rain_day".into(), self.rain_day);
        map.insert("rain_month".into(), self.rain_month);
        map.insert("rain_year".into(), self.rain_year);
        map.insert("et_day".into(), self.et_day);
        map.insert("et_month".into(), self.et_month);
        map.insert("et_year".into(), self.et_year);
        map.insert("battery_status".into(), self.battery_status as f64);
        map.insert("battery_volts".into(), self.battery_volts);
        map.insert("forecast_icon".into(), self.forecast_icon as f64);
        map.insert("forecast_rule_no".into(), self.forecast_rule_no as f64);
        map.insert("sun_rise_hour".into(), self.sun_rise.0 as f64);
        map.insert("sun_rise_minute".into(), self.sun_rise.1 as f64);
        map.insert("sun_set_hour".into(), self.sun_set.0 as f64);
        map.insert("sun_set_minute".into(), self.sun_set.1 as f64);
        if let Some((year, month, day)) = self.storm_start {
            map.insert("storm_start_year".into(), year as f64);
            map.insert("storm_start_month".into(), month as f64);
            map.insert("storm_start_day".into(), day as f64);
        }
        flatten_array(&mut map, "extra_temp_", self.extra_temps);
        flatten_array(&mut map, "soil_temp_", self.soil_temps);
        flatten_array(&mut map, "leaf_temp_", self.leaf_temps);
        flatten_array(&mut map, "extra_hum_", self.extra_hum);
        flatten_array(&mut map, "soil_moist_", self.soil_moist);
        flatten_array(&mut map, "leaf_wetness_", self.leaf_wetness);
        map
    }
}

/// One archived sample from the console's non-volatile record log.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRecord {
    pub datetime: Option<chrono::NaiveDateTime>,
    pub temp_out: f64,
    pub temp_out_hi: f64,
    pub temp_out_low: f64,
    pub rain_rate: f64,
    pub rain_rate_hi: f64,
    pub barometer: f64,
    pub solar_rad: u16,
    pub wind_samples: u16,
    pub temp_in: f64,
    pub hum_in: u8,
    pub hum_out: u8,
    pub wind_avg: u8,
    pub wind_hi: u8,
    pub wind_hi_dir: f64,
    pub wind_avg_dir: f64,
    pub uv: f64,
    pub et_hour: f64,
    pub solar_rad_hi: u16,
    pub uv_hi: u8,
    pub forecast_rule_no: u8,
    pub leaf_temps: [Option<i16>; 2],
    pub leaf_wetness: [Option<u8>; 2],
    pub soil_temps: [Option<i16>; 4],
    pub rec_type: u8,
    pub extra_hum: [Option<u8>; 2],
    pub extra_temps: [Option<i16>; 3],
    pub soil_moist: [Option<u8>; 4],
}

impl ArchiveRecord {
    /// True if the first 4 bytes of a raw archive record carry the
    /// unwritten-slot sentinel in either half (`DateStamp == 0xffff` or
    /// `TimeStamp == 0xffff`).
    pub fn is_sentinel(bytes: &[u8]) -> bool {
        bytes.len() >= 4 && (bytes[0..2] == [0xff, 0xff] || bytes[2..4] == [0xff, 0xff])
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != ARCHIVE_LEN {
            return Err(ProtocolError::ShortFrame {
                expected: ARCHIVE_LEN,
                got: bytes.len(),
            });
        }

        let mut cursor = Cursor::new(bytes);
        let date_stamp = cursor.read_u16::<LittleEndian>().map_err(io_err)?;
        let time_stamp = cursor.read_u16::<LittleEndian>().map_err(io_err)?;
        let datetime = crate::datetime::unpack_dmp_date_time(date_stamp, time_stamp)?;
        let temp_out = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 10.0;
        let temp_out_hi = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 10.0;
        let temp_out_low = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 10.0;
        let rain_rate = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 100.0;
        let rain_rate_hi = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 100.0;
        let barometer = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 1000.0;
        let solar_rad = cursor.read_u16::<LittleEndian>().map_err(io_err)?;
        let wind_samples = cursor.read_u16::<LittleEndian>().map_err(io_err)?;
        let temp_in = cursor.read_u16::<LittleEndian>().map_err(io_err)? as f64 / 10.0;
        let hum_in = cursor.read_u8().map_err(io_err)?;
        let hum_out = cursor.read_u8().map_err(io_err)?;
        let wind_avg = cursor.read_u8().map_err(io_err)?;
        let wind_hi = cursor.read_u8().map_err(io_err)?;
        let wind_hi_dir = cursor.read_u8().map_err(io_err)? as f64 * 22.5;
        let wind_avg_dir = cursor.read_u8().map_err(io_err)? as f64 * 22.5;
        let uv = cursor.read_u8().map_err(io_err)? as f64 / 10.0;
        let et_hour = cursor.read_u8().map_err(io_err)? as f64 / 1000.0;
        let solar_rad_hi = cursor.read_u16::<LittleEndian>().map_err(io_err)?;
        let uv_hi = cursor.read_u8().map_err(io_err)?;
        let forecast_rule_no = cursor.read_u8().map_err(io_err)?;
        let leaf_temps: [u8; 2] = read_array(&mut cursor)?;
        let leaf_wetness: [u8; 2] = read_array(&mut cursor)?;
        let soil_temps: [u8; 4] = read_array(&mut cursor)?;
        let rec_type = cursor.read_u8().map_err(io_err)?;
        let extra_hum: [u8; 2] = read_array(&mut cursor)?;
        let extra_temps: [u8; 3] = read_array(&mut cursor)?;
        let soil_moist: [u8; 4] = read_array(&mut cursor)?;

        Ok(Self {
            datetime,
            temp_out,
            temp_out_hi,
            temp_out_low,
            rain_rate,
            rain_rate_hi,
            barometer,
            solar_rad,
            wind_samples,
            temp_in,
            hum_in,
            hum_out,
            wind_avg,
            wind_hi,
            wind_hi_dir,
            wind_avg_dir,
            uv,
            et_hour,
            solar_rad_hi,
            uv_hi,
            forecast_rule_no,
            leaf_temps: leaf_temps.map(sensor_offset),
            leaf_wetness: leaf_wetness.map(sensor_byte),
            soil_temps: soil_temps.map(sensor_offset),
            rec_type,
            extra_hum: extra_hum.map(sensor_byte),
            extra_temps: extra_temps.map(sensor_offset),
            soil_moist: soil_moist.map(sensor_byte),
        })
    }

    /// Explode the array-valued fields into 1-indexed scalar keys, for
    /// callers that want a generic map rather than the typed struct.
    /// Absent sensors (originally `0xff` on the wire) are omitted.
    pub fn flatten(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        if let Some(datetime) = self.datetime {
            map.insert("datetime".into(), datetime.and_utc().timestamp() as f64);
        }
        map.insert("temp_out".into(), self.temp_out);
        map.insert("temp_out_hi".into(), self.temp_out_hi);
        map.insert("temp_out_low".into(), self.temp_out_low);
        map.insert("rain_rate".into(), self.rain_rate);
        map.insert("rain_rate_hi".into(), self.rain_rate_hi);
        map.insert("barometer".into(), self.barometer);
        map.insert("solar_rad".into(), self.solar_rad as f64);
        map.insert("wind_samples".into(), self.wind_samples as f64);
        map.insert("temp_in".into(), self.temp_in);
        map.insert("hum_in".into(), self.hum_in as f64);
        map.insert("hum_out".into(), self.hum_out as f64);
        map.insert("wind_avg".into(), self.wind_avg as f64);
        map.insert("wind_hi".into(), self.wind_hi as f64);
        map.insert("wind_hi_dir".into(), self.wind_hi_dir);
        map.insert("wind_avg_dir".into(), self.wind_avg_dir);
        map.insert("uv".into(), self.uv);
        map.insert("et_hour".into(), self.et_hour);
        map.insert("solar_rad_hi".into(), self.solar_rad_hi as f64);
        map.insert("uv_hi".into(), self.uv_hi as f64);
        map.insert("forecast_rule_no".into(), self.forecast_rule_no as f64);
        map.insert("rec_type".into(), self.rec_type as f64);
        flatten_offset_array(&mut map, "leaf_temp_", self.leaf_temps);
        flatten_array(&mut map, "leaf_wetness_", self.leaf_wetness);
        flatten_offset_array(&mut map, "soil_temp_", self.soil_temps);
        flatten_array(&mut map, "extra_hum_", self.extra_hum);
        flatten_offset_array(&mut map, "extra_temp_", self.extra_temps);
        flatten_array(&mut map, "soil_moist_", self.soil_moist);
        map
    }
}

/// The 6-byte header preceding a DMP-After transfer: page count, the record
/// offset of the first record to use within page 0, and its own CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmpHeader {
    pub pages: u16,
    pub offset: u16,
}

impl DmpHeader {
    pub const WIRE_LEN: usize = DMP_HEADER_LEN;

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != Self::WIRE_LEN {
            return Err(ProtocolError::ShortFrame {
                expected: Self::WIRE_LEN,
                got: bytes.len(),
            });
        }
        if !crc::verify(bytes) {
            return Err(ProtocolError::BadCrc { what: "DMP header" });
        }
        let mut cursor = Cursor::new(bytes);
        let pages = cursor.read_u16::<LittleEndian>().map_err(io_err)?;
        let offset = cursor.read_u16::<LittleEndian>().map_err(io_err)?;
        Ok(Self { pages, offset })
    }
}

/// One 267-byte archive page: a sequence number, 5 packed 52-byte records,
/// 4 unused bytes, and a CRC over the whole page.
#[derive(Debug, Clone, PartialEq)]
pub struct DmpPage {
    pub index: u8,
    pub records: [[u8; ARCHIVE_LEN]; DMP_RECORDS_PER_PAGE],
}

impl DmpPage {
    pub const WIRE_LEN: usize = DMP_PAGE_LEN;

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != Self::WIRE_LEN {
            return Err(ProtocolError::ShortFrame {
                expected: Self::WIRE_LEN,
                got: bytes.len(),
            });
        }
        if !crc::verify(bytes) {
            return Err(ProtocolError::BadCrc { what: "DMP page" });
        }
        let index = bytes[0];
        let mut records = [[0u8; ARCHIVE_LEN]; DMP_RECORDS_PER_PAGE];
        for (i, record) in records.iter_mut().enumerate() {
            let start = 1 + i * ARCHIVE_LEN;
            record.copy_from_slice(&bytes[start..start + ARCHIVE_LEN]);
        }
        Ok(Self { index, records })
    }
}

fn io_err(_: std::io::Error) -> ProtocolError {
    ProtocolError::ShortFrame { expected: 0, got: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_loop_bytes() -> Vec<u8> {
        let mut body = vec![0u8; LOOP_LEN - 2];
        body[0..3].copy_from_slice(b"LOO");
        // Barometer: 30.00 inHg -> 30000
        body[7] = 0x30;
        body[8] = 0x75;
        // TempIn: 73.0F -> 730
        body[9] = 0xda;
        body[10] = 0x02;
        // storm start / sunrise / sunset default to 0 -> treated as midnight/none
        crc::append(body)
    }

    #[test]
    fn decodes_temp_in() {
        let bytes = sample_loop_bytes();
        let packet = LoopPacket::decode(&bytes).unwrap();
        assert_eq!(packet.temp_in, 73.0);
        assert_eq!(packet.barometer, 30.0);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = LoopPacket::decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, ProtocolError::ShortFrame { .. }));
    }

    #[test]
    fn rejects_bad_crc() {
        let mut bytes = sample_loop_bytes();
        *bytes.last_mut().unwrap() ^= 0xff;
        let err = LoopPacket::decode(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::BadCrc { .. }));
    }

    #[test]
    fn archive_sentinel_detected() {
        let raw = vec![0xff; ARCHIVE_LEN];
        assert!(ArchiveRecord::is_sentinel(&raw));
    }

    #[test]
    fn archive_sentinel_detected_in_either_half() {
        let mut raw = vec![0x00; ARCHIVE_LEN];
        raw[0..2].copy_from_slice(&[0xff, 0xff]);
        assert!(ArchiveRecord::is_sentinel(&raw));

        let mut raw = vec![0x00; ARCHIVE_LEN];
        raw[2..4].copy_from_slice(&[0xff, 0xff]);
        assert!(ArchiveRecord::is_sentinel(&raw));
    }

    #[test]
    fn archive_non_sentinel_record_not_flagged() {
        let mut raw = vec![0x00; ARCHIVE_LEN];
        raw[0] = 0x01;
        assert!(!ArchiveRecord::is_sentinel(&raw));
    }

    #[test]
    fn dmp_page_splits_five_records() {
        let mut bytes = vec![0u8; DMP_PAGE_LEN - 2];
        bytes[0] = 3;
        let bytes = crc::append(bytes);
        let page = DmpPage::decode(&bytes).unwrap();
        assert_eq!(page.index, 3);
        assert_eq!(page.records.len(), 5);
    }

    #[test]
    fn loop_flatten_explodes_arrays_and_omits_absent_sensors() {
        let mut body = vec![0u8; LOOP_LEN - 2];
        body[0..3].copy_from_slice(b"LOO");
        body[18] = 50; // ExtraTemps[0]
        body[19] = 0xff; // ExtraTemps[1] absent
        let bytes = crc::append(body);
        let packet = LoopPacket::decode(&bytes).unwrap();
        let flat = packet.flatten();
        assert_eq!(flat.get("extra_temp_01"), Some(&50.0));
        assert!(!flat.contains_key("extra_temp_02"));
        assert_eq!(flat.get("temp_in"), Some(&0.0));
    }

    #[test]
    fn archive_flatten_applies_sensor_offset() {
        let ts = chrono::NaiveDate::from_ymd_opt(2012, 6, 8)
            .unwrap()
            .and_hms_opt(16, 40, 0)
            .unwrap();
        let (date, time) = crate::datetime::pack_dmp_date_time(ts);
        let mut bytes = vec![0u8; ARCHIVE_LEN];
        bytes[0..2].copy_from_slice(&date.to_le_bytes());
        bytes[2..4].copy_from_slice(&time.to_le_bytes());
        bytes[38] = 100; // SoilTemps[0] -> 100 - 90 = 10
        let record = ArchiveRecord::decode(&bytes).unwrap();
        let flat = record.flatten();
        assert_eq!(flat.get("soil_temp_01"), Some(&10.0));
        assert_eq!(flat.get("datetime"), Some(&(ts.and_utc().timestamp() as f64)));
    }
}
