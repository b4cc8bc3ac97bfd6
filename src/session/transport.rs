use std::future::Future;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::SessionError;

pub const DEFAULT_PORT: u16 = 8883;
const MAX_FRAME_BYTES: usize = 1 << 20;

/// Opens a framed, bidirectional channel to a robot.
pub trait Connector: Clone + Send + Sync + 'static {
    type Reader: FrameReader;
    type Writer: FrameWriter;

    fn open(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<(Self::Reader, Self::Writer), SessionError>> + Send;
}

pub trait FrameReader: Send + 'static {
    /// Next frame without its delimiter; `Ok(None)` once the peer closed.
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, SessionError>> + Send;
}

pub trait FrameWriter: Send + 'static {
    fn write_frame(&mut self, frame: &[u8]) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Plain TCP with one JSON document per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

pub struct TcpFrameReader {
    reader: BufReader<OwnedReadHalf>,
    buf: Vec<u8>,
}

pub struct TcpFrameWriter {
    writer: OwnedWriteHalf,
}

fn with_default_port(address: &str) -> String {
    if address.contains(':') {
        address.to_string()
    } else {
        format!("{address}:{DEFAULT_PORT}")
    }
}

impl Connector for TcpConnector {
    type Reader = TcpFrameReader;
    type Writer = TcpFrameWriter;

    fn open(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<(Self::Reader, Self::Writer), SessionError>> + Send {
        let target = with_default_port(address);
        async move {
            let stream = TcpStream::connect(&target)
                .await
                .map_err(|err| SessionError::Transport(format!("connect to {target}: {err}")))?;
            stream.set_nodelay(true)?;
            let (read_half, write_half) = stream.into_split();
            Ok((
                TcpFrameReader {
                    reader: BufReader::new(read_half),
                    buf: Vec::new(),
                },
                TcpFrameWriter { writer: write_half },
            ))
        }
    }
}

impl FrameReader for TcpFrameReader {
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, SessionError>> + Send {
        async move {
            loop {
                self.buf.clear();
                let mut limited = (&mut self.reader).take(MAX_FRAME_BYTES as u64 + 1);
                let read = limited.read_until(b'\n', &mut self.buf).await?;
                if read == 0 {
                    return Ok(None);
                }
                if read > MAX_FRAME_BYTES && self.buf.last() != Some(&b'\n') {
                    return Err(SessionError::Transport(format!(
                        "frame exceeds {MAX_FRAME_BYTES} bytes"
                    )));
                }

                let frame = self.buf.trim_ascii();
                if !frame.is_empty() {
                    return Ok(Some(frame.to_vec()));
                }
            }
        }
    }
}

impl FrameWriter for TcpFrameWriter {
    fn write_frame(&mut self, frame: &[u8]) -> impl Future<Output = Result<(), SessionError>> + Send {
        let mut line = Vec::with_capacity(frame.len() + 1);
        line.extend_from_slice(frame);
        line.push(b'\n');
        async move {
            self.writer.write_all(&line).await?;
            self.writer.flush().await?;
            Ok(())
        }
    }
}
