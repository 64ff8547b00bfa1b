//! Datagram transport facing the front end.
//!
//! Two sockets, one per direction:
//!
//! | Socket | Default port | Traffic |
//! |---|---|---|
//! | [`UplinkSender`] | 6050 (remote) | telemetry and gain responses, gateway → front end |
//! | [`CommandListener`] | 6060 (local) | commands, front end → gateway |

use std::net::SocketAddr;

use rigbridge_types::TransportError;
use serde_json::Value;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Largest command datagram accepted from the front end.
pub const MAX_DATAGRAM: usize = 4096;

/// Sends JSON messages to the front end.
#[derive(Debug)]
pub struct UplinkSender {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UplinkSender {
    /// Bind an ephemeral local socket that sends to `peer`.
    pub async fn bind(peer: SocketAddr) -> Result<Self, TransportError> {
        let local: SocketAddr = if peer.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| TransportError::io("uplink", e))?;
        info!(%peer, "front-end uplink ready");
        Ok(Self { socket, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Serialise `message` and send it as one datagram.
    pub async fn send_json(&self, message: &Value) -> Result<(), TransportError> {
        let payload = message.to_string();
        self.socket
            .send_to(payload.as_bytes(), self.peer)
            .await
            .map_err(|e| TransportError::io("uplink", e))?;
        debug!(peer = %self.peer, %payload, "sent to front end");
        Ok(())
    }
}

/// Receives command datagrams from the front end.
#[derive(Debug)]
pub struct CommandListener {
    socket: UdpSocket,
}

impl CommandListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TransportError::io("command listener", e))?;
        info!(addr = %socket.local_addr().unwrap_or(addr), "listening for front-end commands");
        Ok(Self { socket })
    }

    /// The bound address, useful when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket
            .local_addr()
            .map_err(|e| TransportError::io("command listener", e))
    }

    /// Wait for the next datagram.
    pub async fn recv(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, from) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| TransportError::io("command listener", e))?;
        buf.truncate(len);
        Ok((buf, from))
    }
}
