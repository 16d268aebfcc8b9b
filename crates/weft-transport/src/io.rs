//! Byte-stream transport
//!
//! Newline-delimited JSON envelopes over any tokio reader/writer pair.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use weft_core::{WeftError, WeftResult};
use weft_wire::{
    decode_frame, encode_frame, Envelope, EnvelopeHandler, FRAME_DELIMITER, MAX_FRAME_SIZE,
};

use crate::transport::{Handlers, Transport};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Transport over a byte stream (pipes, sockets, `tokio::io::duplex`)
pub struct IoTransport {
    name: String,
    runtime: Handle,
    writer: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    reader: Mutex<Option<BoxedReader>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    handlers: Handlers,
    closed: AtomicBool,
}

impl IoTransport {
    /// Wrap a reader/writer pair; must be called inside a tokio runtime
    ///
    /// The writer task starts immediately. Reading starts with the first
    /// `on_receive`.
    pub fn new<R, W>(name: &str, reader: R, writer: W) -> WeftResult<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let runtime =
            Handle::try_current().map_err(|_| WeftError::NotInitialized("tokio runtime"))?;
        let (tx, rx) = mpsc::unbounded_channel();
        start_write_loop(&runtime, name.to_string(), writer, rx);

        Ok(IoTransport {
            name: name.to_string(),
            runtime,
            writer: Mutex::new(Some(tx)),
            reader: Mutex::new(Some(Box::new(reader))),
            reader_task: Mutex::new(None),
            handlers: Handlers::default(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Write queued frames until the queue closes, then shut the writer down
fn start_write_loop<W>(
    runtime: &Handle,
    name: String,
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    runtime.spawn(async move {
        while let Some(frame) = rx.recv().await {
            let written = async {
                writer.write_all(&frame).await?;
                writer.flush().await
            };
            if let Err(e) = written.await {
                warn!(transport = %name, error = %e, "Write failed");
                return;
            }
        }
        if let Err(e) = writer.shutdown().await {
            debug!(transport = %name, error = %e, "Writer shutdown failed");
        }
    })
}

/// Result of reading one delimited line
#[derive(Debug, PartialEq, Eq)]
enum ReadLine {
    Line,
    /// Longer than `MAX_FRAME_SIZE`; the bytes up to the next delimiter were discarded
    Oversized(usize),
    Eof,
}

/// Read one line into `line`, buffering at most `MAX_FRAME_SIZE + 1` bytes
async fn read_line<R>(reader: &mut R, line: &mut Vec<u8>) -> io::Result<ReadLine>
where
    R: AsyncBufRead + Unpin,
{
    let limit = MAX_FRAME_SIZE as u64 + 1;
    line.clear();
    if (&mut *reader).take(limit).read_until(FRAME_DELIMITER, line).await? == 0 {
        return Ok(ReadLine::Eof);
    }
    if line.last() == Some(&FRAME_DELIMITER) || line.len() <= MAX_FRAME_SIZE {
        return Ok(ReadLine::Line);
    }

    let mut skipped = line.len();
    loop {
        line.clear();
        let n = (&mut *reader).take(limit).read_until(FRAME_DELIMITER, line).await?;
        skipped += n;
        if n == 0 || line.last() == Some(&FRAME_DELIMITER) {
            line.clear();
            return Ok(ReadLine::Oversized(skipped));
        }
    }
}

/// Decode lines from `reader` and dispatch them until EOF
fn start_read_loop(
    runtime: &Handle,
    name: String,
    reader: BoxedReader,
    handlers: Handlers,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            match read_line(&mut reader, &mut line).await {
                Ok(ReadLine::Eof) => {
                    debug!(transport = %name, "End of stream");
                    break;
                }
                Ok(ReadLine::Oversized(size)) => {
                    warn!(transport = %name, size, max = MAX_FRAME_SIZE, "Skipping oversized frame");
                }
                Ok(ReadLine::Line) => {
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    match decode_frame(&line) {
                        Ok(envelope) => handlers.dispatch(&name, &envelope),
                        Err(e) => warn!(transport = %name, error = %e, "Skipping bad frame"),
                    }
                }
                Err(e) => {
                    warn!(transport = %name, error = %e, "Read failed");
                    break;
                }
            }
        }
    })
}

impl Transport for IoTransport {
    fn send(&self, envelope: Envelope) -> WeftResult<()> {
        if self.is_closed() {
            return Err(WeftError::TransportClosed);
        }
        let frame = encode_frame(&envelope)?;
        match self.writer.lock().as_ref() {
            Some(tx) => tx.send(frame).map_err(|_| WeftError::TransportClosed),
            None => Err(WeftError::TransportClosed),
        }
    }

    fn on_receive(&self, handler: EnvelopeHandler) {
        if self.is_closed() {
            return;
        }
        self.handlers.push(handler);

        let mut task = self.reader_task.lock();
        if task.is_none() {
            if let Some(reader) = self.reader.lock().take() {
                *task = Some(start_read_loop(
                    &self.runtime,
                    self.name.clone(),
                    reader,
                    self.handlers.clone(),
                ));
            }
        }
    }

    /// Queued frames are still flushed before the writer shuts down
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.writer.lock().take();
        self.reader.lock().take();
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
        self.handlers.clear();
        debug!(transport = %self.name, "IO transport closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for IoTransport {
    fn drop(&mut self) {
        self.close();
    }
}
