// world_server/server/src/network/transport.rs
use crate::core::error::TransportError;
use crate::core::types::SessionId;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Outbound half of a client connection. Implementations must not block:
/// they are called from inside zone actor loops.
pub trait TransportSink: Send + Sync {
    fn send_datagram(&self, session_id: SessionId, frame: &[u8]) -> Result<(), TransportError>;
    fn send_stream(&self, session_id: SessionId, frame: &[u8]) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Datagram(Bytes),
    Stream(Bytes),
}

impl Outbound {
    pub fn bytes(&self) -> &Bytes {
        match self {
            Outbound::Datagram(b) | Outbound::Stream(b) => b,
        }
    }
}

/// Hands frames to a writer task over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink { tx }, rx)
    }
}

impl TransportSink for ChannelSink {
    fn send_datagram(&self, session_id: SessionId, frame: &[u8]) -> Result<(), TransportError> {
        self.tx
            .send(Outbound::Datagram(Bytes::copy_from_slice(frame)))
            .map_err(|_| TransportError::Closed(session_id))
    }

    fn send_stream(&self, session_id: SessionId, frame: &[u8]) -> Result<(), TransportError> {
        self.tx
            .send(Outbound::Stream(Bytes::copy_from_slice(frame)))
            .map_err(|_| TransportError::Closed(session_id))
    }
}

/// Stand-in sink for a session whose connection has dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedSink;

impl TransportSink for DetachedSink {
    fn send_datagram(&self, session_id: SessionId, _frame: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::Closed(session_id))
    }

    fn send_stream(&self, session_id: SessionId, _frame: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::Closed(session_id))
    }
}
