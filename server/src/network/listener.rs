// world_server/server/src/network/listener.rs
//! TCP front door. Each connection opens with a 4-byte little-endian session
//! id (0 for a fresh login), then carries stream frames both ways. Datagrams
//! are length-prefixed on the way out since TCP has no message boundaries.

use super::framing::StreamDecoder;
use super::messages::IntValue;
use super::opcodes::OpCode;
use super::transport::{ChannelSink, Outbound};
use super::world_handler::WorldHandler;
use crate::core::error::{FramingError, ServerResult};
use crate::core::types::SessionId;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

pub async fn serve(listener: TcpListener, world: Arc<WorldHandler>) -> ServerResult<()> {
    info!("Listening for clients on {}", listener.local_addr()?);
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };
        let world = world.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, world).await {
                debug!("[{}]: connection ended with error: {}", peer, e);
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, world: Arc<WorldHandler>) -> ServerResult<()> {
    stream.set_nodelay(true)?;
    let (mut reader, writer) = stream.into_split();

    let requested: SessionId = reader.read_u32_le().await?;
    let (sink, outbound) = ChannelSink::new();
    let (session, attached) = world.connect(Arc::new(sink), peer.ip(), (requested != 0).then_some(requested));
    info!("[{}]: connected as session {}", peer, session.id());

    let writer_task = tokio::spawn(write_outbound(writer, outbound, peer));
    if let Err(e) = session.send_stream(OpCode::SessionAssigned, &IntValue { value: i64::from(session.id()) }) {
        warn!("[{}]: could not confirm session {}: {}", peer, session.id(), e);
    }

    let mut decoder = StreamDecoder;
    let mut buf = BytesMut::with_capacity(4096);
    'read: loop {
        match reader.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("[{}]: read failed: {}", peer, e);
                break;
            }
        }
        loop {
            match decoder.next_frame(&mut buf) {
                Ok(Some(frame)) => world.handle_packet(&session, frame).await,
                Ok(None) => break,
                Err(FramingError::Oversized(len)) => {
                    warn!("[{}]: frame of {} bytes exceeds limit, closing", peer, len);
                    break 'read;
                }
                Err(e) => warn!("[{}]: malformed frame dropped: {}", peer, e),
            }
        }
    }

    info!("[{}]: session {} disconnected", peer, session.id());
    world.disconnect(&session, attached);
    // Once the sink is detached the writer drains and exits.
    if let Err(e) = writer_task.await {
        error!("[{}]: writer task failed: {}", peer, e);
    }
    Ok(())
}

async fn write_outbound<W: AsyncWrite + Unpin>(mut writer: W, mut outbound: UnboundedReceiver<Outbound>, peer: SocketAddr) {
    while let Some(frame) = outbound.recv().await {
        let result = match &frame {
            Outbound::Stream(bytes) => writer.write_all(bytes).await,
            Outbound::Datagram(bytes) => {
                let prefix = (bytes.len() as u32).to_le_bytes();
                match writer.write_all(&prefix).await {
                    Ok(()) => writer.write_all(bytes).await,
                    Err(e) => Err(e),
                }
            }
        };
        if let Err(e) = result {
            debug!("[{}]: write failed: {}", peer, e);
            break;
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!("[{}]: shutdown failed: {}", peer, e);
    }
}
