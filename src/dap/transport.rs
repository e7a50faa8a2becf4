//! DAP transport layer.
//! Content-Length framed messages over stdio (embedded mode) or TCP (server mode).

use crate::dap::protocol::{DapRequest, Inbound};
use crate::dap::tracer::FileTracer;
use anyhow::anyhow;
use serde_json::Value;
use std::io::{BufRead, BufReader, Read, Stdin, Stdout, Write};
use std::net::TcpStream;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

/// Incoming half of a DAP connection.
pub trait MessageReader: Send {
    /// Read a single DAP message (with Content-Length framing).
    /// Return [`None`] if the peer closed the connection between messages.
    fn read_message(&mut self) -> anyhow::Result<Option<Value>>;
}

/// Outgoing half of a DAP connection.
pub trait MessageWriter: Send {
    /// Write a single DAP message (with Content-Length framing).
    fn write_message(&mut self, message: &Value) -> anyhow::Result<()>;
}

pub struct FramedReader<R> {
    reader: R,
    tracer: Option<FileTracer>,
}

impl<R: BufRead + Send> FramedReader<R> {
    pub fn new(reader: R, tracer: Option<FileTracer>) -> Self {
        Self { reader, tracer }
    }
}

impl<R: BufRead + Send> MessageReader for FramedReader<R> {
    fn read_message(&mut self) -> anyhow::Result<Option<Value>> {
        let mut content_length: Option<usize> = None;
        let mut header_seen = false;
        loop {
            let mut line = String::new();
            let read_n = self.reader.read_line(&mut line)?;
            if read_n == 0 {
                if header_seen {
                    return Err(anyhow!("DAP connection closed in the middle of a message"));
                }
                return Ok(None);
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if header_seen {
                    break;
                }
                continue;
            }
            header_seen = true;
            if let Some(v) = line.strip_prefix("Content-Length:") {
                content_length = Some(v.trim().parse()?);
            }
        }

        let len = content_length.ok_or_else(|| anyhow!("Missing Content-Length header"))?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        let msg: Value = serde_json::from_slice(&buf)?;
        if let Some(tracer) = &self.tracer {
            tracer.inbound(&msg);
        }
        Ok(Some(msg))
    }
}

pub struct FramedWriter<W> {
    writer: W,
    tracer: Option<FileTracer>,
}

impl<W: Write + Send> FramedWriter<W> {
    pub fn new(writer: W, tracer: Option<FileTracer>) -> Self {
        Self { writer, tracer }
    }
}

impl<W: Write + Send> MessageWriter for FramedWriter<W> {
    fn write_message(&mut self, message: &Value) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(message)?;
        if let Some(tracer) = &self.tracer {
            tracer.outbound(message);
        }
        write!(self.writer, "Content-Length: {}\r\n\r\n", payload.len())?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Stdio-based DAP transport (for embedded mode).
pub fn stdio(
    tracer: Option<FileTracer>,
) -> (FramedReader<BufReader<Stdin>>, FramedWriter<Stdout>) {
    (
        FramedReader::new(BufReader::new(std::io::stdin()), tracer.clone()),
        FramedWriter::new(std::io::stdout(), tracer),
    )
}

/// TCP-based DAP transport (for server mode).
pub fn tcp(
    stream: TcpStream,
    tracer: Option<FileTracer>,
) -> anyhow::Result<(FramedReader<BufReader<TcpStream>>, FramedWriter<TcpStream>)> {
    stream.set_nodelay(true)?;
    let reader = BufReader::new(stream.try_clone()?);
    Ok((
        FramedReader::new(reader, tracer.clone()),
        FramedWriter::new(stream, tracer),
    ))
}

/// Pump client requests into the session queue until the connection ends.
pub fn spawn_reader<R: MessageReader + 'static>(
    mut reader: R,
    queue: Sender<Inbound>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        let message = match reader.read_message() {
            Ok(Some(message)) => message,
            Ok(None) => {
                log::info!(target: "dap", "client closed the connection");
                let _ = queue.send(Inbound::Closed(None));
                return;
            }
            Err(err) => {
                log::error!(target: "dap", "read failed: {err:#}");
                let _ = queue.send(Inbound::Closed(Some(format!("{err:#}"))));
                return;
            }
        };

        let req: DapRequest = match serde_json::from_value(message) {
            Ok(req) => req,
            Err(err) => {
                log::warn!(target: "dap", "malformed message skipped: {err}");
                continue;
            }
        };
        if req.r#type != "request" {
            log::debug!(target: "dap", "ignore non-request message of type `{}`", req.r#type);
            continue;
        }
        if queue.send(Inbound::Request(req)).is_err() {
            return;
        }
    })
}
