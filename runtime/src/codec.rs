//! Content-Length framing for the worker's stdio channel.
//!
//! Each message is `Content-Length: N\r\n\r\n{json}`, the framing the
//! language-server ecosystem uses, so a worker script can lean on existing
//! JSON-RPC stream libraries.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Lint results for large stylesheets can be sizeable; anything past this is a broken worker.
const MAX_FRAME_BYTES: usize = 32 * 1024 * 1024;

pub(crate) struct FrameReader<R> {
    reader: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: String::new(),
        }
    }

    /// Next frame, or `Ok(None)` when the stream ends cleanly between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Value>> {
        let Some(length) = self.read_header_block().await? else {
            return Ok(None);
        };
        if length > MAX_FRAME_BYTES {
            bail!("frame of {length} bytes exceeds limit of {MAX_FRAME_BYTES}");
        }

        let mut body = vec![0u8; length];
        self.reader
            .read_exact(&mut body)
            .await
            .context("reading frame body")?;
        let value = serde_json::from_slice(&body).context("decoding frame body")?;
        Ok(Some(value))
    }

    async fn read_header_block(&mut self) -> Result<Option<usize>> {
        let mut length = None;
        let mut started = false;

        loop {
            self.line.clear();
            let read = self
                .reader
                .read_line(&mut self.line)
                .await
                .context("reading frame header")?;
            if read == 0 {
                if started {
                    bail!("stream ended inside a frame header");
                }
                return Ok(None);
            }
            started = true;

            let header = self.line.trim();
            if header.is_empty() {
                break;
            }
            if let Some(value) = content_length(header) {
                length = Some(value.parse::<usize>().context("invalid Content-Length")?);
            }
        }

        length.map(Some).context("frame without Content-Length")
    }
}

fn content_length(header: &str) -> Option<&str> {
    let (name, value) = header.split_once(':')?;
    name.trim()
        .eq_ignore_ascii_case("content-length")
        .then(|| value.trim())
}

pub(crate) struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_frame(&mut self, message: &Value) -> Result<()> {
        let body = serde_json::to_vec(message).context("encoding frame body")?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.writer
            .write_all(header.as_bytes())
            .await
            .context("writing frame header")?;
        self.writer
            .write_all(&body)
            .await
            .context("writing frame body")?;
        self.writer.flush().await.context("flushing frame")
    }
}
