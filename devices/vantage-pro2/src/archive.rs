//! DMP-After archive download: paged retrieval of the console's non-volatile
//! record log as a bounded-memory streaming iterator.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime, Timelike};
use vantage_protocol::{ArchiveRecord, DmpHeader, DmpPage};

use crate::console::{CANCEL, Console, ESC, NACK};
use crate::error::DriverError;

const PAGE_RETRIES: u8 = 3;
const PAGE_READ_TIMEOUT: Duration = Duration::from_secs(10);

fn default_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2001, 1, 1)
        .and_then(|d| d.and_hms_opt(1, 1, 1))
        .expect("2001-01-01 01:01:01 is a valid datetime")
}

impl Console {
    /// Begin a DMP-After archive download for records with `start < datetime
    /// <= stop`. `start` defaults to 2001-01-01 01:01:01; `stop` defaults to
    /// the host's current time.
    pub fn download_archive(
        &mut self,
        start: Option<NaiveDateTime>,
        stop: Option<NaiveDateTime>,
    ) -> Result<ArchiveDownload<'_>, DriverError> {
        self.wake_up()?;

        let period = self.archive_period()?.max(1) as i64;
        let mut start = start.unwrap_or_else(default_start);
        let stop = stop.unwrap_or_else(|| Local::now().naive_local());
        let overshoot = start.minute() as i64 % period;
        start -= ChronoDuration::minutes(overshoot);

        self.transport_mut().write(b"DMPAFT\n")?;
        if !self.read_ack()? {
            return Err(DriverError::BadAck {
                command: "DMPAFT".into(),
                attempts: 1,
            });
        }

        let (vpdate, vptime) = vantage_protocol::pack_dmp_date_time(start);
        let mut selector = Vec::with_capacity(4);
        selector.extend_from_slice(&vpdate.to_le_bytes());
        selector.extend_from_slice(&vptime.to_le_bytes());
        let framed = vantage_protocol::crc_append(selector);
        self.transport_mut().write(&framed)?;

        let doubled = self.doubled_timeout();
        let ack = self.transport_mut().read(1, Some(doubled))?;
        if ack.first() != Some(&0x06) {
            return Err(DriverError::BadAck {
                command: "DMPAFT selector".into(),
                attempts: 1,
            });
        }

        let header_bytes = self.transport_mut().read(DmpHeader::WIRE_LEN, Some(doubled));
        let header = match header_bytes.ok().and_then(|b| DmpHeader::decode(&b).ok()) {
            Some(header) => header,
            None => {
                self.write_token(CANCEL)?;
                return Err(DriverError::BadAck {
                    command: "DMPAFT header".into(),
                    attempts: 1,
                });
            },
        };

        let total_estimate = header.pages as usize * 5;

        Ok(ArchiveDownload {
            console: self,
            start,
            stop,
            pages_total: header.pages,
            pages_read: 0,
            first_offset: header.offset as usize,
            page_records: Vec::new(),
            record_index: 0,
            finished: header.pages == 0,
            step: 0,
            total_estimate,
            progress: None,
        })
    }
}

/// A streaming archive download in progress. Iterate for
/// `Result<ArchiveRecord, DriverError>` items; dropping the iterator before
/// exhaustion sends `ESC` to return the console to idle.
pub struct ArchiveDownload<'a> {
    console: &'a mut Console,
    start: NaiveDateTime,
    stop: NaiveDateTime,
    pages_total: u16,
    pages_read: u16,
    first_offset: usize,
    page_records: Vec<[u8; 52]>,
    record_index: usize,
    finished: bool,
    step: usize,
    total_estimate: usize,
    progress: Option<Box<dyn FnMut(usize, usize) + 'a>>,
}

impl<'a> ArchiveDownload<'a> {
    /// Register a progress callback, invoked once per record considered
    /// (yielded or silently dropped as out-of-window).
    pub fn with_progress(mut self, callback: impl FnMut(usize, usize) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Request and read the next page. Assumes the request ACK (or the
    /// implicit page-1 request folded into the header exchange) has already
    /// been sent by the caller.
    fn fetch_page(&mut self) -> Result<(), DriverError> {
        for attempt in 1..=PAGE_RETRIES {
            let raw = self
                .console
                .transport_mut()
                .read(DmpPage::WIRE_LEN, Some(PAGE_READ_TIMEOUT));
            match raw.ok().and_then(|b| DmpPage::decode(&b).ok()) {
                Some(page) => {
                    self.page_records = page.records.to_vec();
                    self.record_index = if self.pages_read == 0 { self.first_offset } else { 0 };
                    self.pages_read += 1;
                    return Ok(());
                },
                None => {
                    log::warn!("archive page {} failed CRC on attempt {attempt}", self.pages_read);
                    if attempt < PAGE_RETRIES {
                        self.console.write_token(NACK)?;
                        continue;
                    }
                },
            }
        }
        Err(DriverError::Cancelled {
            page: self.pages_read,
        })
    }

    fn cancel(&mut self) {
        self.finished = true;
        let _ = self.console.write_token(ESC);
    }
}

impl Iterator for ArchiveDownload<'_> {
    type Item = Result<ArchiveRecord, DriverError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            if self.record_index >= self.page_records.len() {
                if self.pages_read >= self.pages_total {
                    self.finished = true;
                    return None;
                }
                if let Err(err) = self.console.write_token(0x06) {
                    self.finished = true;
                    return Some(Err(err));
                }
                if let Err(err) = self.fetch_page() {
                    self.finished = true;
                    return Some(Err(err));
                }
                continue;
            }

            let raw = self.page_records[self.record_index];
            self.record_index += 1;

            if ArchiveRecord::is_sentinel(&raw) {
                self.cancel();
                return None;
            }

            let record = match ArchiveRecord::decode(&raw) {
                Ok(record) => record,
                Err(err) => {
                    self.cancel();
                    return Some(Err(err.into()));
                },
            };
            self.step += 1;

            let Some(datetime) = record.datetime else {
                continue;
            };

            if datetime > self.stop {
                self.cancel();
                return None;
            }

            if let Some(progress) = self.progress.as_mut() {
                progress(self.step, self.total_estimate);
            }

            if datetime <= self.start {
                continue;
            }

            return Some(Ok(record));
        }
    }
}

impl Drop for ArchiveDownload<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.console.write_token(ESC);
        }
    }
}

/// Deduplicated, time-ordered accumulation of archive records. The console's
/// ring buffer can return overlapping records across a download; this keeps
/// exactly one record per `datetime`, the last one seen.
#[derive(Debug, Default, Clone)]
pub struct RecordStore {
    by_time: BTreeMap<NaiveDateTime, ArchiveRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a download's records, deduping by `datetime` and keeping the
    /// most recently seen decoding for each timestamp.
    pub fn ingest(
        &mut self,
        records: impl IntoIterator<Item = Result<ArchiveRecord, DriverError>>,
    ) -> Result<usize, DriverError> {
        let mut count = 0;
        for record in records {
            let record = record?;
            if let Some(datetime) = record.datetime {
                self.by_time.insert(datetime, record);
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.by_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_time.is_empty()
    }

    /// Records in ascending `datetime` order.
    pub fn iter(&self) -> impl Iterator<Item = &ArchiveRecord> {
        self.by_time.values()
    }

    /// Records whose datetime falls in `[from, to]`, ascending.
    pub fn range(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> impl Iterator<Item = &ArchiveRecord> {
        self.by_time.range(from..=to).map(|(_, record)| record)
    }

    /// Records sorted ascending by a field of [`ArchiveRecord::flatten`].
    /// Records where `field` is absent from the flattened map sort first.
    pub fn sorted_by_field(&self, field: &str) -> Vec<&ArchiveRecord> {
        let mut records: Vec<&ArchiveRecord> = self.by_time.values().collect();
        records.sort_by(|a, b| {
            let a = a.flatten().get(field).copied().unwrap_or(f64::NEG_INFINITY);
            let b = b.flatten().get(field).copied().unwrap_or(f64::NEG_INFINITY);
            a.total_cmp(&b)
        });
        records
    }

    /// Project every record down to just `keys`, dropping any key absent
    /// from a given record's flattened map.
    pub fn filter_by_keys(&self, keys: &[&str]) -> Vec<BTreeMap<String, f64>> {
        self.by_time
            .values()
            .map(|record| {
                let full = record.flatten();
                keys.iter()
                    .filter_map(|key| full.get(*key).map(|value| (key.to_string(), *value)))
                    .collect()
            })
            .collect()
    }
}
