//! Standard I/O node

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::watch;

use peerhub_core::{PeerError, PeerResult};
use peerhub_handle::{Handle, HandleReceivers, DEFAULT_BUFFER};

use crate::{trim_line, LineHandler};

/// Prints every write as a line; optionally feeds input lines to a handler
///
/// Defaults to the process stdin/stdout; [`StdioNode::with_io`] swaps in
/// any reader/writer pair.
pub struct StdioNode<R = Stdin, W = Stdout> {
    reader: R,
    writer: W,
    input_handler: Option<LineHandler>,
    handle: Handle,
    receivers: HandleReceivers,
}

impl StdioNode {
    pub fn new(buffer: usize) -> Self {
        Self::with_io(buffer, tokio::io::stdin(), tokio::io::stdout())
    }
}

impl Default for StdioNode {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl<R, W> StdioNode<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn with_io(buffer: usize, reader: R, writer: W) -> Self {
        let (handle, receivers) = Handle::channel(buffer);
        StdioNode {
            reader,
            writer,
            input_handler: None,
            handle,
            receivers,
        }
    }

    /// Without an input handler the reader is never touched
    pub fn on_input(mut self, handler: impl Fn(Bytes) + Send + Sync + 'static) -> Self {
        self.input_handler = Some(Arc::new(handler));
        self
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub fn spawn(self) -> Handle {
        let (reader_stop_tx, reader_stop_rx) = watch::channel(false);

        if let Some(handler) = self.input_handler {
            tokio::spawn(read_lines(self.reader, handler, reader_stop_rx));
        }
        tokio::spawn(write_lines(self.writer, self.receivers, reader_stop_tx));

        self.handle
    }
}

async fn read_lines<R: AsyncRead + Unpin>(
    reader: R,
    handler: LineHandler,
    mut stop: watch::Receiver<bool>,
) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            read = reader.read_until(b'\n', &mut line) => match read {
                Ok(0) => break,
                Ok(_) => handler(trim_line(std::mem::take(&mut line))),
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            },
        }
    }
}

async fn write_lines<W: AsyncWrite + Unpin>(
    mut writer: W,
    receivers: HandleReceivers,
    reader_stop: watch::Sender<bool>,
) {
    let HandleReceivers { mut rx, mut stop_rx } = receivers;
    loop {
        tokio::select! {
            biased;
            Some(stop) = stop_rx.recv() => {
                reader_stop.send_replace(true);
                let result = writer.flush().await.map_err(PeerError::from);
                stop.complete(result);
                break;
            }
            Some(payload) = rx.recv() => {
                let (data, callback) = payload.into_parts();
                callback(write_line(&mut writer, &data).await);
            }
            else => break,
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> PeerResult<()> {
    writer.write_all(data).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
