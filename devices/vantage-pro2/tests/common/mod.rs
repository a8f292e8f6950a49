//! Scripted mock transport shared by the protocol controller and archive
//! downloader integration tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use vantage_core::{Transport, TransportError};

/// A transport that replays a fixed script of reads and records every write.
/// `writes_handle()` hands out a shared view callers can inspect after the
/// transport has been moved into a `Box<dyn Transport>`.
pub struct MockTransport {
    reads: VecDeque<Vec<u8>>,
    writes: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl MockTransport {
    pub fn new(reads: Vec<&[u8]>) -> Self {
        Self {
            reads: reads.into_iter().map(|r| r.to_vec()).collect(),
            writes: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn writes_handle(&self) -> Rc<RefCell<Vec<Vec<u8>>>> {
        self.writes.clone()
    }
}

impl Transport for MockTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.writes.borrow_mut().push(bytes.to_vec());
        Ok(())
    }

    fn read(&mut self, n: usize, _timeout: Option<Duration>) -> Result<Vec<u8>, TransportError> {
        match self.reads.pop_front() {
            Some(chunk) if chunk.len() == n => Ok(chunk),
            Some(chunk) => Err(TransportError::Timeout {
                expected: n,
                got: chunk.len(),
            }),
            None => Err(TransportError::Timeout { expected: n, got: 0 }),
        }
    }

    fn set_timeout(&mut self, _timeout: Duration) {}

    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}
