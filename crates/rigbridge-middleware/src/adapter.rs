//! The device-side adapter seam.
//!
//! The dispatcher and the gait generator never touch a port.  They hand a
//! [`DeviceCommand`] to a [`DeviceSink`], which frames it for whatever link
//! is behind it.

use async_trait::async_trait;
use rigbridge_protocol::{DeviceCommand, encode_command_line};
use rigbridge_types::TransportError;
use tokio::sync::mpsc;
use tracing::debug;

/// Anything that can deliver commands to the rig.
///
/// # Contract
///
/// * Commands passed to one sink reach the rig in the order `transmit` was
///   called.
/// * A failed link is reported as a [`TransportError`]; the sink never
///   retries on its own.
#[async_trait]
pub trait DeviceSink: Send + Sync {
    async fn transmit(&self, command: &DeviceCommand) -> Result<(), TransportError>;
}

/// [`DeviceSink`] over a line channel, typically the `outbound` half of a
/// serial or simulated device link.
#[derive(Debug, Clone)]
pub struct LineSink {
    link: String,
    outbound: mpsc::Sender<String>,
}

impl LineSink {
    pub fn new(link: impl Into<String>, outbound: mpsc::Sender<String>) -> Self {
        Self {
            link: link.into(),
            outbound,
        }
    }
}

#[async_trait]
impl DeviceSink for LineSink {
    async fn transmit(&self, command: &DeviceCommand) -> Result<(), TransportError> {
        let word = command.encode();
        debug!(link = %self.link, ?command, word, "transmit");
        self.outbound
            .send(encode_command_line(word))
            .await
            .map_err(|_| TransportError::Disconnected(self.link.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigbridge_protocol::decode_command_line;
    use rigbridge_types::ActuatorId;

    #[tokio::test]
    async fn line_sink_preserves_submission_order() -> Result<(), Box<dyn std::error::Error>> {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = LineSink::new("test", tx);

        let commands: Vec<DeviceCommand> = ActuatorId::ALL
            .into_iter()
            .map(|channel| DeviceCommand::RequestGain { channel })
            .collect();
        for command in &commands {
            sink.transmit(command).await?;
        }

        for expected in commands {
            let line = rx.recv().await.ok_or("channel closed")?;
            assert!(line.ends_with('\n'));
            assert_eq!(DeviceCommand::decode(decode_command_line(&line)?)?, expected);
        }
        Ok(())
    }

    #[tokio::test]
    async fn closed_link_is_reported_as_disconnected() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = LineSink::new("serial", tx);
        let err = sink.transmit(&DeviceCommand::home()).await.unwrap_err();
        assert_eq!(err, TransportError::Disconnected("serial".into()));
    }
}
