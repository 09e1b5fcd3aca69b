//! The transport owns the link to the board.
//! All bytes to and from the board pass through here.
//!
//! Inbound lines land in a [`FrameSlot`], which only ever holds the most
//! recent frame. A frame that is overwritten before anyone reads it is lost.

use std::{fmt::Display, future::Future, sync::Arc, time::Duration};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use crate::{config::Config, serial::error::SerialPortError};

/// One line of text from the link, without its line ending.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Frame(String);

impl Frame {
    /// Create a frame from bytes, ignoring any bad utf8 bytes.
    pub fn new_lossy<B: AsRef<[u8]>>(bytes: B) -> Self {
        Self(String::from_utf8_lossy(bytes.as_ref()).to_string())
    }

    /// Borrowed form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for a frame with no text at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: AsRef<str>> From<T> for Frame {
    fn from(string_like: T) -> Self {
        Self(string_like.as_ref().into())
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.0.chars().take(48).collect::<String>();

        write!(f, "{}", s.trim())
    }
}

/// Everything a link needs to know when opening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    /// Device path, e.g. `/dev/ttyACM0` or `COM3`.
    pub path: String,

    /// Baud rate.
    pub baud: u32,

    /// Upper bound for a single line read.
    pub read_timeout: Duration,

    /// How long the reset line is held low while the board resets.
    pub reset_settle: Duration,
}

/// A physical (or pretend) connection to the board.
///
/// Reads and writes may happen concurrently from different tasks,
/// so implementations keep the read side and the write side independent.
pub trait Link: Send + Sync + 'static {
    /// Open the link, reset the board and discard anything already buffered.
    fn open(
        &self,
        settings: &LinkSettings,
    ) -> impl Future<Output = Result<(), SerialPortError>> + Send;

    /// Release the link. Closing a closed link does nothing.
    fn close(&self) -> impl Future<Output = ()> + Send;

    /// Whether the link is currently open.
    fn is_open(&self) -> bool;

    /// Write all bytes, bounded by the write timeout.
    fn write(&self, bytes: &[u8]) -> impl Future<Output = Result<(), SerialPortError>> + Send;

    /// Read one line, bounded by the read timeout.
    /// `Ok(None)` means nothing complete arrived in time.
    fn read_frame(&self) -> impl Future<Output = Result<Option<Frame>, SerialPortError>> + Send;
}

/// Single-slot mailbox for inbound frames.
///
/// Storing a frame replaces whatever was there, read or not.
#[derive(Debug, Clone)]
pub struct FrameSlot {
    sender: Arc<watch::Sender<Option<Frame>>>,
}

impl Default for FrameSlot {
    fn default() -> Self {
        let (sender, _) = watch::channel(None);

        Self {
            sender: Arc::new(sender),
        }
    }
}

impl FrameSlot {
    /// Put a frame in the slot, overwriting the previous one.
    pub fn store(&self, frame: Frame) {
        trace!(%frame, "Frame stored");
        self.sender.send_replace(Some(frame));
    }

    /// The frame currently in the slot, seen or not.
    pub fn latest(&self) -> Option<Frame> {
        self.sender.borrow().clone()
    }

    /// A reader which only sees frames stored after this call.
    pub fn reader(&self) -> FrameReader {
        FrameReader {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Reads from a [`FrameSlot`], remembering which frame it saw last.
#[derive(Debug)]
pub struct FrameReader {
    receiver: watch::Receiver<Option<Frame>>,
}

impl FrameReader {
    /// The current frame, if it was stored since the last call.
    pub fn take_fresh(&mut self) -> Option<Frame> {
        match self.receiver.has_changed() {
            Ok(true) => self.receiver.borrow_and_update().clone(),
            _ => None,
        }
    }
}

/// Timing knobs the transport applies on top of what [`Transport::open`] is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportTiming {
    /// Upper bound for a single write, whatever the link.
    pub write_timeout: Duration,

    /// See [`LinkSettings::reset_settle`].
    pub reset_settle: Duration,

    /// Pause between two reads in the receive loop.
    pub receive_interval: Duration,
}

impl From<&Config> for TransportTiming {
    fn from(config: &Config) -> Self {
        Self {
            write_timeout: config.write_timeout(),
            reset_settle: config.reset_settle(),
            receive_interval: config.receive_interval(),
        }
    }
}

/// Exclusive owner of the [`Link`].
#[derive(Debug)]
pub struct Transport<L> {
    link: L,
    timing: TransportTiming,
    frames: FrameSlot,
}

impl<L: Link> Transport<L> {
    /// Wrap a link. Nothing is opened yet.
    pub fn new(link: L, timing: TransportTiming) -> Self {
        Self {
            link,
            timing,
            frames: FrameSlot::default(),
        }
    }

    /// Open the link at `path`, closing any link already open.
    ///
    /// Failure is only logged, check [`Transport::is_open`] afterwards.
    pub async fn open(&self, path: &str, baud: u32, timeout: Duration) {
        if self.link.is_open() {
            self.link.close().await;
        }

        let settings = LinkSettings {
            path: path.to_owned(),
            baud,
            read_timeout: timeout,
            reset_settle: self.timing.reset_settle,
        };

        match self.link.open(&settings).await {
            Ok(()) => info!(%path, %baud, "Link open"),
            Err(e) => error!(?e, %path, "Could not open link"),
        }
    }

    /// Release the link.
    pub async fn close(&self) {
        if self.link.is_open() {
            info!("Closing link");
        }
        self.link.close().await;
    }

    /// Whether the link is open.
    pub fn is_open(&self) -> bool {
        self.link.is_open()
    }

    /// Put bytes on the wire, giving up after the write timeout.
    /// Returns `false` on any failure, leaving it to the caller what to do about it.
    pub async fn send(&self, bytes: &[u8]) -> bool {
        if !self.link.is_open() {
            debug!("Not sending, link is closed");
            return false;
        }

        let written = tokio::time::timeout(self.timing.write_timeout, self.link.write(bytes))
            .await
            .unwrap_or(Err(SerialPortError::WriteTimeout));

        match written {
            Ok(()) => true,
            Err(e) => {
                error!(?e, "Write to link failed");
                false
            }
        }
    }

    /// The frame most recently read, possibly one already dispatched.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.frames.latest()
    }

    /// The slot the receive loop stores frames into.
    pub fn frames(&self) -> &FrameSlot {
        &self.frames
    }

    /// Read lines into the frame slot until `token` is cancelled.
    ///
    /// Read errors are logged and the next read is attempted as usual.
    /// While the link is closed the loop idles, and picks up again once it is reopened.
    pub async fn receive_loop(&self, token: CancellationToken) {
        if !self.link.is_open() {
            warn!("Link is not open yet, receiving once it is");
        }

        async move {
            info!("Receive loop running");

            while !token.is_cancelled() {
                tokio::select! {
                    _ = token.cancelled() => break,
                    read = self.link.read_frame() => match read {
                        Ok(Some(frame)) => self.frames.store(frame),
                        Ok(None) => {}
                        Err(SerialPortError::NotOpen) => trace!("Read skipped, link is closed"),
                        Err(e) => error!(?e, "Link read problem"),
                    }
                }

                tokio::time::sleep(self.timing.receive_interval).await;
            }

            info!("Receive loop stopped");
        }
        .instrument(info_span!("receive"))
        .await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mock::MockLink;

    fn timing() -> TransportTiming {
        TransportTiming {
            write_timeout: Duration::from_millis(50),
            reset_settle: Duration::from_millis(1),
            receive_interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn slot_is_last_writer_wins() {
        let slot = FrameSlot::default();
        let mut reader = slot.reader();

        assert_eq!(reader.take_fresh(), None);

        slot.store("E,2,1".into());
        slot.store("E,2,2".into());

        assert_eq!(reader.take_fresh(), Some(Frame::from("E,2,2")));
        assert_eq!(reader.take_fresh(), None);

        // Peeking still shows the stale frame.
        assert_eq!(slot.latest(), Some(Frame::from("E,2,2")));
    }

    #[test]
    fn frame_display_is_short() {
        let frame = Frame::from("x".repeat(100));

        assert_eq!(frame.to_string().len(), 48);
    }

    #[tokio::test]
    async fn send_on_closed_link_does_no_io() {
        let link = MockLink::default();
        let transport = Transport::new(link.clone(), timing());

        assert!(!transport.send(b"2,A,1\n").await);
        assert_eq!(link.write_attempts(), 0);
    }

    #[tokio::test]
    async fn open_resets_board_and_reopens() {
        let link = MockLink::default();
        let transport = Transport::new(link.clone(), timing());

        transport.open("mock", 57_600, Duration::from_millis(5)).await;
        assert!(transport.is_open());

        transport.open("mock", 57_600, Duration::from_millis(5)).await;
        assert!(transport.is_open());
        assert_eq!(link.resets(), 2);

        transport.close().await;
        transport.close().await;
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn failed_open_leaves_link_closed() {
        let link = MockLink::default();
        link.fail_open(true);
        let transport = Transport::new(link, timing());

        transport.open("mock", 57_600, Duration::from_millis(5)).await;

        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn receive_loop_survives_read_errors() {
        let link = MockLink::default();
        let transport = Arc::new(Transport::new(link.clone(), timing()));
        transport.open("mock", 57_600, Duration::from_millis(5)).await;

        let token = CancellationToken::new();
        let task = tokio::spawn({
            let transport = transport.clone();
            let token = token.clone();
            async move { transport.receive_loop(token).await }
        });

        link.push_read_error("glitch");
        link.push_line("E,2,7");

        tokio::time::timeout(Duration::from_secs(2), async {
            while transport.latest_frame().is_none() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(transport.latest_frame(), Some(Frame::from("E,2,7")));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn receive_loop_waits_for_link_to_open() {
        let link = MockLink::default();
        let transport = Arc::new(Transport::new(link.clone(), timing()));

        let token = CancellationToken::new();
        let task = tokio::spawn({
            let transport = transport.clone();
            let token = token.clone();
            async move { transport.receive_loop(token).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!task.is_finished());

        transport.open("mock", 57_600, Duration::from_millis(5)).await;
        link.push_line("E,2,9");

        tokio::time::timeout(Duration::from_secs(2), async {
            while transport.latest_frame().is_none() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(transport.latest_frame(), Some(Frame::from("E,2,9")));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn hung_write_gives_up_after_timeout() {
        let link = MockLink::default();
        let transport = Transport::new(link.clone(), timing());
        transport.open("mock", 57_600, Duration::from_millis(5)).await;

        link.hang_writes(true);

        let sent = tokio::time::timeout(Duration::from_secs(1), transport.send(b"3,m,0,10\n"))
            .await
            .unwrap();

        assert!(!sent);
        assert_eq!(link.write_attempts(), 1);
        assert!(link.written_lines().is_empty());
    }
}
