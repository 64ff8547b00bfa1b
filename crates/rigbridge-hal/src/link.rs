//! Line channel pair between a device transport and the gateway.

use rigbridge_types::TransportError;
use tokio::sync::mpsc;

/// Buffered lines in each direction before senders wait.
pub const LINK_CAPACITY: usize = 256;

/// One result per received line.  A transport that fails sends a final
/// `Err` and then closes the channel.
pub type InboundLine = Result<String, TransportError>;

/// The gateway's end of a device transport.
///
/// `inbound` yields raw text lines from the rig; every string pushed into
/// `outbound` is written to the rig verbatim and in order.
#[derive(Debug)]
pub struct DeviceLink {
    pub name: String,
    pub inbound: mpsc::Receiver<InboundLine>,
    pub outbound: mpsc::Sender<String>,
}

/// The transport's end of a [`DeviceLink`].
#[derive(Debug)]
pub struct LinkEndpoint {
    pub inbound: mpsc::Sender<InboundLine>,
    pub outbound: mpsc::Receiver<String>,
}

/// Create a connected [`DeviceLink`] / [`LinkEndpoint`] pair.
pub fn channel(name: impl Into<String>) -> (DeviceLink, LinkEndpoint) {
    let (in_tx, in_rx) = mpsc::channel(LINK_CAPACITY);
    let (out_tx, out_rx) = mpsc::channel(LINK_CAPACITY);
    (
        DeviceLink {
            name: name.into(),
            inbound: in_rx,
            outbound: out_tx,
        },
        LinkEndpoint {
            inbound: in_tx,
            outbound: out_rx,
        },
    )
}
