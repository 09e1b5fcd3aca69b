//! A mock link, useful to run the manager without a board attached.
//!
//! Lines can be injected as if the board sent them, writes are recorded,
//! and opening or writing can be told to fail.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, trace};

use crate::{
    serial::error::SerialPortError,
    transport::{Frame, Link, LinkSettings},
};

type Inbound = Result<Frame, String>;

#[derive(Debug)]
struct MockInner {
    open: AtomicBool,
    fail_open: AtomicBool,
    fail_writes: AtomicBool,
    hang_writes: AtomicBool,
    resets: AtomicUsize,
    write_attempts: AtomicUsize,
    read_timeout_micros: AtomicU64,

    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: AsyncMutex<mpsc::UnboundedReceiver<Inbound>>,

    written: Mutex<Vec<Vec<u8>>>,
}

/// An in-memory [`Link`].
///
/// Clones share state, so a test can keep one clone while
/// the manager owns another.
#[derive(Debug, Clone)]
pub struct MockLink {
    inner: Arc<MockInner>,
}

impl Default for MockLink {
    fn default() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(MockInner {
                open: AtomicBool::new(false),
                fail_open: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                hang_writes: AtomicBool::new(false),
                resets: AtomicUsize::new(0),
                write_attempts: AtomicUsize::new(0),
                read_timeout_micros: AtomicU64::new(1_000),
                inbound_tx,
                inbound_rx: AsyncMutex::new(inbound_rx),
                written: Mutex::new(vec![]),
            }),
        }
    }
}

impl MockLink {
    /// Queue a line as if the board sent it.
    pub fn push_line(&self, line: &str) {
        let _ = self.inner.inbound_tx.send(Ok(line.into()));
    }

    /// Queue a read failure.
    pub fn push_read_error(&self, problem: &str) {
        let _ = self.inner.inbound_tx.send(Err(problem.into()));
    }

    /// Make future opens fail (or succeed again).
    pub fn fail_open(&self, fail: bool) {
        self.inner.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make future writes fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make future writes never complete (or complete again).
    pub fn hang_writes(&self, hang: bool) {
        self.inner.hang_writes.store(hang, Ordering::SeqCst);
    }

    /// How many times the board was reset by a successful open.
    pub fn resets(&self) -> usize {
        self.inner.resets.load(Ordering::SeqCst)
    }

    /// How many writes were attempted, successful or not.
    pub fn write_attempts(&self) -> usize {
        self.inner.write_attempts.load(Ordering::SeqCst)
    }

    /// Everything successfully written, one entry per write, as text.
    pub fn written_lines(&self) -> Vec<String> {
        self.inner
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_micros(self.inner.read_timeout_micros.load(Ordering::SeqCst))
    }
}

impl Link for MockLink {
    async fn open(&self, settings: &LinkSettings) -> Result<(), SerialPortError> {
        if self.inner.fail_open.load(Ordering::SeqCst) {
            return Err(SerialPortError::Injected(format!(
                "{} refused to open",
                settings.path
            )));
        }

        self.inner.read_timeout_micros.store(
            settings.read_timeout.as_micros().try_into().unwrap_or(u64::MAX),
            Ordering::SeqCst,
        );

        // Same as a real board: whatever was buffered before the reset is gone.
        let mut inbound = self.inner.inbound_rx.lock().await;
        while inbound.try_recv().is_ok() {}

        self.inner.resets.fetch_add(1, Ordering::SeqCst);
        self.inner.open.store(true, Ordering::SeqCst);

        debug!(%settings.path, "Mock link open");

        Ok(())
    }

    async fn close(&self) {
        self.inner.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), SerialPortError> {
        self.inner.write_attempts.fetch_add(1, Ordering::SeqCst);

        if !self.is_open() {
            return Err(SerialPortError::NotOpen);
        }

        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(SerialPortError::Injected("write refused".into()));
        }

        if self.inner.hang_writes.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }

        trace!("Mock write of {} byte(s)", bytes.len());

        self.inner
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(bytes.to_vec());

        Ok(())
    }

    async fn read_frame(&self) -> Result<Option<Frame>, SerialPortError> {
        if !self.is_open() {
            return Err(SerialPortError::NotOpen);
        }

        let mut inbound = self.inner.inbound_rx.lock().await;

        match tokio::time::timeout(self.read_timeout(), inbound.recv()).await {
            Ok(Some(Ok(frame))) => Ok(Some(frame)),
            Ok(Some(Err(problem))) => Err(SerialPortError::Injected(problem)),
            Ok(None) => Err(SerialPortError::Disconnected),
            Err(_elapsed) => Ok(None),
        }
    }
}
