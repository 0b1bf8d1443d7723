//! Persistent bidirectional channel to the simulation server.
//!
//! Newline-delimited JSON event frames over TCP. The reader forwards decoded
//! server events; undecodable frames are logged and skipped.

pub mod frame;

use crate::model::{ClientEvent, ServerEvent};
use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Both ends of an open channel plus the I/O tasks behind them.
pub struct ChannelHandle {
    pub inbound: UnboundedReceiver<ServerEvent>,
    pub outbound: UnboundedSender<ClientEvent>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ChannelHandle {
    /// Split into the two endpoints the controller needs; I/O tasks keep running.
    pub fn into_parts(self) -> (UnboundedReceiver<ServerEvent>, UnboundedSender<ClientEvent>, ChannelTasks) {
        (
            self.inbound,
            self.outbound,
            ChannelTasks {
                reader: self.reader,
                writer: self.writer,
            },
        )
    }
}

pub struct ChannelTasks {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ChannelTasks {
    /// Dropping a JoinHandle does not cancel the task, so abort explicitly.
    pub fn shutdown(self) {
        self.reader.abort();
        self.writer.abort();
    }
}

pub async fn connect(addr: &str) -> Result<ChannelHandle> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("connect to simulation server at {addr}"))?;
    stream.set_nodelay(true).ok();
    tracing::info!(%addr, "simulation channel connected");
    let (rd, wr) = stream.into_split();
    Ok(spawn_io(rd, wr))
}

/// Wire an arbitrary byte stream pair to event channels.
pub fn spawn_io<R, W>(rd: R, wr: W) -> ChannelHandle
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (in_tx, in_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<ClientEvent>();
    let reader = tokio::spawn(read_loop(rd, in_tx));
    let writer = tokio::spawn(write_loop(wr, out_rx));
    ChannelHandle {
        inbound: in_rx,
        outbound: out_tx,
        reader,
        writer,
    }
}

async fn read_loop<R: AsyncRead + Unpin>(rd: R, tx: UnboundedSender<ServerEvent>) {
    let mut lines = BufReader::new(rd).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match frame::decode(&line) {
                Ok(Some(ev)) => {
                    tracing::trace!(event = ev.name(), "frame received");
                    if tx.send(ev).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %format!("{e:#}"), "skipping malformed frame"),
            },
            Ok(None) => {
                tracing::debug!("simulation channel reached EOF");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "simulation channel read failed");
                break;
            }
        }
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(mut wr: W, mut rx: UnboundedReceiver<ClientEvent>) {
    while let Some(ev) = rx.recv().await {
        let line = match frame::encode(&ev) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "dropping unencodable event");
                continue;
            }
        };
        if let Err(e) = wr.write_all(line.as_bytes()).await {
            tracing::warn!(error = %e, "simulation channel write failed");
            break;
        }
        let _ = wr.flush().await;
    }
}
