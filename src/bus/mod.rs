//! Sensor bus line sources.
//!
//! The bus is a line-oriented byte stream: one reading per line at a fixed
//! baud rate. Sources yield raw lines; decoding lives in [`parse`].

pub mod parse;

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_serial::SerialPortBuilderExt;
use tracing::debug;

/// Yields one text line at a time from the sensor bus.
pub trait LineSource: Send {
    /// Read the next line, including its trailing newline.
    ///
    /// Returns `Ok(None)` once the underlying stream is exhausted.
    fn next_line(&mut self) -> impl std::future::Future<Output = io::Result<Option<String>>> + Send;
}

/// Line source backed by a serial port.
pub struct SerialLineSource {
    reader: BufReader<tokio_serial::SerialStream>,
}

impl SerialLineSource {
    /// Open the serial device and discard the first line.
    ///
    /// The first read after opening is typically a truncated fragment of a
    /// frame already in flight, so it is never handed to the caller.
    pub async fn open(device: &str, baud: u32) -> anyhow::Result<Self> {
        let port = tokio_serial::new(device, baud).open_native_async()?;
        let mut source = Self {
            reader: BufReader::new(port),
        };

        if let Some(fragment) = read_line_retrying(&mut source.reader).await? {
            debug!(bytes = fragment.len(), "discarded partial first line");
        }

        Ok(source)
    }
}

impl LineSource for SerialLineSource {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        read_line_retrying(&mut self.reader).await
    }
}

/// Read one line, retrying reads interrupted by a signal.
///
/// Bytes are converted lossily: line noise on the bus must surface as an
/// invalid line downstream, not as a fatal transport error.
async fn read_line_retrying<R>(reader: &mut BufReader<R>) -> io::Result<Option<String>>
where
    R: AsyncRead + Unpin + Send,
{
    let mut buf = Vec::new();
    loop {
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) if buf.is_empty() => return Ok(None),
            Ok(_) => return Ok(Some(String::from_utf8_lossy(&buf).into_owned())),
            // A retried read keeps the bytes gathered so far in `buf`.
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
