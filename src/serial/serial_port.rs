use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::{
    io::{AsyncWriteExt, ReadHalf, WriteHalf},
    sync::Mutex,
};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tokio_util::codec::FramedRead;
use tracing::{debug, info};

use crate::{
    serial::{codecs::lines::FrameCodec, error::SerialPortError},
    transport::{Frame, Link, LinkSettings},
};

type Reader = FramedRead<ReadHalf<SerialStream>, FrameCodec>;

fn try_create_serial_port(settings: &LinkSettings) -> Result<SerialStream, SerialPortError> {
    let serial_stream = tokio_serial::new(&settings.path, settings.baud)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .timeout(settings.read_timeout)
        .open_native_async()?;

    Ok(serial_stream)
}

/// A [`Link`] over a real serial port.
///
/// The port is split on open, so a pending read never holds up a write.
/// Bounding writes in time is left to the [`crate::transport::Transport`].
#[derive(Debug)]
pub struct SerialLink {
    open: AtomicBool,
    read_timeout: Mutex<Duration>,
    reader: Mutex<Option<Reader>>,
    writer: Mutex<Option<WriteHalf<SerialStream>>>,
}

impl Default for SerialLink {
    fn default() -> Self {
        Self {
            open: AtomicBool::new(false),
            read_timeout: Mutex::new(Duration::from_secs(1)),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }
}

impl Link for SerialLink {
    async fn open(&self, settings: &LinkSettings) -> Result<(), SerialPortError> {
        self.close().await;

        let mut port = try_create_serial_port(settings)?;

        // Dropping DTR resets the board.
        debug!(%settings.path, "Resetting board");
        port.write_data_terminal_ready(false)?;
        tokio::time::sleep(settings.reset_settle).await;

        // Anything received so far predates the reset.
        port.clear(ClearBuffer::Input)?;
        port.write_data_terminal_ready(true)?;

        let (read_half, write_half) = tokio::io::split(port);

        *self.read_timeout.lock().await = settings.read_timeout;
        *self.reader.lock().await = Some(FramedRead::new(read_half, FrameCodec::default()));
        *self.writer.lock().await = Some(write_half);

        self.open.store(true, Ordering::SeqCst);
        info!(%settings.path, "Serial port open");

        Ok(())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);

        let writer = self.writer.lock().await.take();
        let reader = self.reader.lock().await.take();

        if writer.is_some() || reader.is_some() {
            debug!("Serial port released");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), SerialPortError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(SerialPortError::NotOpen)?;

        writer.write_all(bytes).await?;
        writer.flush().await?;

        Ok(())
    }

    async fn read_frame(&self) -> Result<Option<Frame>, SerialPortError> {
        let timeout = *self.read_timeout.lock().await;

        let mut reader = self.reader.lock().await;
        let reader = reader.as_mut().ok_or(SerialPortError::NotOpen)?;

        match tokio::time::timeout(timeout, reader.next()).await {
            Ok(Some(frame)) => Ok(Some(frame?)),
            Ok(None) => Err(SerialPortError::Disconnected),
            Err(_elapsed) => Ok(None),
        }
    }
}
