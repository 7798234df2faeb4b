use std::{io, net::SocketAddr, sync::Arc};

use anyhow::{Result, bail};
use tokio::{
    io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    select,
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::{
    config::DeliveryFailurePolicy,
    event::{BroadcastEvent, ConnectionId, EventSender},
    registry::{ClientEntry, ClientRegistry},
    wire::{LineReader, clean_line, display_name, write_line},
};

/// Handles every session needs; cloned once per accepted connection.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub registry: Arc<ClientRegistry>,
    pub events: EventSender,
    pub policy: DeliveryFailurePolicy,
}

/// Why a registered session stopped.
#[derive(Debug)]
pub enum SessionEnd {
    PeerClosed,
    ReadFailed(io::Error),
    WriteFailed(io::Error),
    HungUp,
    QueueClosed,
}

/// Drives one connection from handshake to teardown.
///
/// Returns an error only when the handshake fails, in which case nothing was
/// registered and nothing was announced.
pub async fn run_session<S>(
    id: ConnectionId,
    stream: S,
    peer: SocketAddr,
    ctx: SessionContext,
) -> Result<SessionEnd>
where
    S: AsyncRead + AsyncWrite,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = LineReader::new(BufReader::new(reader));

    let name = perform_handshake(&mut lines, peer).await?;

    let (outbox_tx, mut outbox) = mpsc::unbounded_channel();
    ctx.registry
        .insert(id, ClientEntry::new(name.clone(), outbox_tx))
        .await;
    info!(%id, %peer, %name, "client joined");

    let end = match ctx.events.submit(BroadcastEvent::joined(id, &name)).await {
        Ok(()) => run_message_loop(id, &name, &ctx, &mut lines, &mut outbox, &mut writer).await,
        Err(_) => SessionEnd::QueueClosed,
    };

    teardown(id, &name, &ctx, &end).await;
    if let Err(error) = writer.shutdown().await {
        debug!(%id, %error, "failed to shut down connection cleanly");
    }

    Ok(end)
}

async fn perform_handshake<R>(lines: &mut LineReader<R>, peer: SocketAddr) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    match lines.next_line().await? {
        Some(requested) => Ok(display_name(&requested, peer)),
        None => bail!("connection closed before handshake"),
    }
}

async fn run_message_loop<R, W>(
    id: ConnectionId,
    name: &str,
    ctx: &SessionContext,
    lines: &mut LineReader<R>,
    outbox: &mut mpsc::UnboundedReceiver<String>,
    writer: &mut W,
) -> SessionEnd
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // `next_line` and `recv` are both cancel-safe, so losing a race drops nothing.
    loop {
        select! {
            inbound = lines.next_line() => match inbound {
                Ok(Some(line)) => {
                    let Some(text) = clean_line(&line) else {
                        continue;
                    };
                    let event = BroadcastEvent::chat(id, name, text);
                    if ctx.events.submit(event).await.is_err() {
                        return SessionEnd::QueueClosed;
                    }
                }
                Ok(None) => return SessionEnd::PeerClosed,
                Err(error) => return SessionEnd::ReadFailed(error),
            },
            outgoing = outbox.recv() => match outgoing {
                Some(line) => {
                    if let Err(error) = write_line(writer, &line).await {
                        warn!(%id, %name, %error, "failed to write to client");
                        if ctx.policy == DeliveryFailurePolicy::Evict {
                            return SessionEnd::WriteFailed(error);
                        }
                    }
                }
                None => return SessionEnd::HungUp,
            },
        }
    }
}

async fn teardown(id: ConnectionId, name: &str, ctx: &SessionContext, end: &SessionEnd) {
    // Only the session removes its own entry, so this runs at most once per id
    // and the leave is queued after every chat line this session submitted.
    if ctx.registry.remove(id).await.is_none() {
        return;
    }
    info!(%id, %name, reason = ?end, "client left");
    if ctx.events.submit(BroadcastEvent::left(name)).await.is_err() {
        debug!(%id, %name, "broadcast queue closed, leave not announced");
    }
}
