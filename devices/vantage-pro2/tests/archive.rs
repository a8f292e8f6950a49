//! Integration tests exercising `Console::download_archive` end-to-end
//! against a scripted mock transport: window filtering, sentinel
//! termination, page CRC-retry/NACK, and cancellation on drop.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use chrono::NaiveDate;
use common::MockTransport;
use vantage_pro2::{Console, RecordStore};

const ACK: u8 = 0x06;
const NACK: u8 = 0x21;
const ESC: u8 = 0x1b;

fn wake_ack() -> Vec<u8> {
    b"\n\r".to_vec()
}

fn ver_banner() -> Vec<u8> {
    b"\n\rOK\n\r".to_vec()
}

fn firmware_date_reply() -> Vec<u8> {
    b"Apr 24 2002\n\r".to_vec()
}

fn eebrd_archive_period(period: u8) -> Vec<u8> {
    vantage_protocol::crc_append(vec![period])
}

fn dmp_header(pages: u16, offset: u16) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&pages.to_le_bytes());
    body.extend_from_slice(&offset.to_le_bytes());
    vantage_protocol::crc_append(body)
}

fn archive_record_bytes(dt: chrono::NaiveDateTime) -> [u8; 52] {
    let (date, time) = vantage_protocol::pack_dmp_date_time(dt);
    let mut bytes = [0u8; 52];
    bytes[0..2].copy_from_slice(&date.to_le_bytes());
    bytes[2..4].copy_from_slice(&time.to_le_bytes());
    bytes
}

fn sentinel_record_bytes() -> [u8; 52] {
    [0xff; 52]
}

fn dmp_page(records: [[u8; 52]; 5], index: u8) -> Vec<u8> {
    let mut body = Vec::with_capacity(1 + 260 + 4);
    body.push(index);
    for record in &records {
        body.extend_from_slice(record);
    }
    body.extend_from_slice(&[0u8; 4]);
    vantage_protocol::crc_append(body)
}

/// Opens a console and leaves it ready to call `download_archive`, having
/// scripted the wake/VER/firmware-date exchange already consumed by `open`.
/// Returns the console alongside a handle onto every byte it has written,
/// since the transport itself is moved into the console's `Box<dyn Transport>`.
fn open_console(reads_after_open: Vec<&[u8]>) -> (Console, Rc<RefCell<Vec<Vec<u8>>>>) {
    let mut reads = vec![wake_ack(), ver_banner(), firmware_date_reply()];
    reads.extend(reads_after_open.into_iter().map(|r| r.to_vec()));
    let refs: Vec<&[u8]> = reads.iter().map(|r| r.as_slice()).collect();
    let transport = MockTransport::new(refs);
    let writes = transport.writes_handle();
    let console = Console::open(Box::new(transport)).expect("console opens");
    (console, writes)
}

#[test]
fn archive_download_filters_window_and_stops_on_sentinel() {
    let period = eebrd_archive_period(1);
    let dmpaft_ack = [ACK];
    let selector_ack = [ACK];
    let start = NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let in_window = NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 10, 0)
        .unwrap();
    let stop = NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(1, 0, 0)
        .unwrap();

    let page = dmp_page(
        [
            archive_record_bytes(start),    // <= start: skipped
            archive_record_bytes(in_window), // yielded
            sentinel_record_bytes(),        // ends the stream
            [0u8; 52],
            [0u8; 52],
        ],
        0,
    );
    let header = dmp_header(1, 0);

    let (mut console, _writes) = open_console(vec![
        &wake_ack(),  // explicit wake_up() at the top of download_archive
        &wake_ack(),  // wake_up() nested inside the EEBRD (archive_period) call
        &[ACK],       // EEBRD command ack
        &period,      // EEBRD archive period reply
        &dmpaft_ack,  // DMPAFT command ack
        &selector_ack, // date/time selector ack
        &header,      // DMP header
        &page,        // page 1
    ]);

    let download = console
        .download_archive(Some(start), Some(stop))
        .expect("download starts");
    let records: Vec<_> = download.collect();

    assert_eq!(records.len(), 1);
    let record = records[0].as_ref().expect("in-window record decodes");
    assert_eq!(record.datetime, Some(in_window));
}

#[test]
fn archive_download_retries_page_on_bad_crc_then_succeeds() {
    let period = eebrd_archive_period(1);
    let good_page = dmp_page([sentinel_record_bytes(); 5], 0);
    let mut corrupt_page = good_page.clone();
    *corrupt_page.last_mut().unwrap() ^= 0xff;

    let header = dmp_header(1, 0);

    let (mut console, _writes) = open_console(vec![
        &wake_ack(),
        &wake_ack(),
        &[ACK],
        &period,
        &[ACK],
        &[ACK],
        &header,
        &corrupt_page,
        &corrupt_page,
        &good_page,
    ]);

    let download = console
        .download_archive(None, None)
        .expect("download starts");
    let records: Vec<_> = download.collect();

    // The page decodes on the third attempt, then the first (sentinel)
    // record immediately ends the stream.
    assert!(records.is_empty());
}

#[test]
fn archive_download_sends_nack_on_each_bad_page_and_esc_on_sentinel() {
    let period = eebrd_archive_period(1);
    let good_page = dmp_page([sentinel_record_bytes(); 5], 0);
    let mut corrupt_page = good_page.clone();
    *corrupt_page.last_mut().unwrap() ^= 0xff;
    let header = dmp_header(1, 0);

    let (mut console, writes) = open_console(vec![
        &wake_ack(),
        &wake_ack(),
        &[ACK],
        &period,
        &[ACK],
        &[ACK],
        &header,
        &corrupt_page,
        &good_page,
    ]);

    let download = console
        .download_archive(None, None)
        .expect("download starts");
    let _: Vec<_> = download.collect();

    let writes = writes.borrow();
    let nack_writes = writes.iter().filter(|w| w.as_slice() == [NACK]).count();
    let esc_writes = writes.iter().filter(|w| w.as_slice() == [ESC]).count();
    assert_eq!(nack_writes, 1);
    assert_eq!(esc_writes, 1);
}

#[test]
fn dropping_an_unfinished_download_sends_esc() {
    let period = eebrd_archive_period(1);
    let a = NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 10, 0)
        .unwrap();
    let b = NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 20, 0)
        .unwrap();
    let page = dmp_page(
        [
            archive_record_bytes(a),
            archive_record_bytes(b),
            [0u8; 52],
            [0u8; 52],
            [0u8; 52],
        ],
        0,
    );
    // Two pages total, but the test only consumes one record and drops.
    let header = dmp_header(2, 0);

    let (mut console, writes) = open_console(vec![
        &wake_ack(),
        &wake_ack(),
        &[ACK],
        &period,
        &[ACK],
        &[ACK],
        &header,
        &page,
    ]);

    {
        let mut download = console
            .download_archive(None, None)
            .expect("download starts");
        let first = download.next().expect("first record present");
        assert!(first.is_ok());
    }

    let esc_writes = writes.borrow().iter().filter(|w| w.as_slice() == [ESC]).count();
    assert_eq!(esc_writes, 1);
}

#[test]
fn record_store_dedups_overlapping_downloads() {
    let dt = NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 10, 0)
        .unwrap();
    let period = eebrd_archive_period(1);
    let page = dmp_page(
        [
            archive_record_bytes(dt),
            sentinel_record_bytes(),
            [0u8; 52],
            [0u8; 52],
            [0u8; 52],
        ],
        0,
    );
    let header = dmp_header(1, 0);

    // Two separate downloads (as if the ring buffer handed back an
    // overlapping window both times) both surface the same timestamp.
    let (mut console_a, _) = open_console(vec![
        &wake_ack(),
        &wake_ack(),
        &[ACK],
        &period,
        &[ACK],
        &[ACK],
        &header,
        &page,
    ]);
    let (mut console_b, _) = open_console(vec![
        &wake_ack(),
        &wake_ack(),
        &[ACK],
        &period,
        &[ACK],
        &[ACK],
        &header,
        &page,
    ]);

    let records_a: Vec<_> = console_a.download_archive(None, None).unwrap().collect();
    let records_b: Vec<_> = console_b.download_archive(None, None).unwrap().collect();

    let mut store = RecordStore::new();
    store.ingest(records_a).unwrap();
    store.ingest(records_b).unwrap();

    assert_eq!(store.len(), 1);
}
