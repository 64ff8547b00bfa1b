//! In-process rig simulation for tests.
//!
//! [`SimRig`] sits on the far end of a [`DeviceLink`] and behaves like the
//! firmware where the gateway can observe it:
//!
//! * every command line is decoded and handed to the test through
//!   [`SimHandle::commands`];
//! * gain requests and gain saves are answered with a gain report for the
//!   addressed channel;
//! * set-gain commands update the gains reported afterwards.
//!
//! Telemetry is not produced on its own; inject it with a [`SimReporter`].
//!
//! # Example
//!
//! ```rust
//! use rigbridge_hal::SimRig;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (link, rig) = SimRig::pair();
//! let reporter = rig.reporter();
//! let sim = rig.spawn();
//! // Hand `link` to the gateway, inject telemetry through `reporter` and
//! // read what the gateway sent from `sim.commands`.
//! # drop((link, reporter, sim));
//! # }
//! ```

use rigbridge_protocol::{DeviceCommand, decode_command_line, encode_frame, encode_report_line};
use rigbridge_types::{ActuatorId, CHANNEL_COUNT, DeviceFrame, GainSet, TransportError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::link::{self, DeviceLink, InboundLine, LinkEndpoint};

// ────────────────────────────────────────────────────────────────────────────
// Reporter
// ────────────────────────────────────────────────────────────────────────────

/// Pushes rig → gateway traffic into a simulated link.
#[derive(Debug, Clone)]
pub struct SimReporter {
    inbound: mpsc::Sender<InboundLine>,
}

impl SimReporter {
    /// Send `frame` exactly as the firmware would frame it.
    pub async fn send_frame(&self, frame: &DeviceFrame) -> Result<(), TransportError> {
        self.send_line(encode_report_line(encode_frame(frame))).await
    }

    /// Send a raw line, e.g. one that is deliberately malformed.
    pub async fn send_line(&self, line: impl Into<String>) -> Result<(), TransportError> {
        self.inbound
            .send(Ok(line.into()))
            .await
            .map_err(|_| TransportError::Disconnected("sim".into()))
    }

    /// Simulate the link dropping.
    pub async fn disconnect(&self) {
        let _ = self
            .inbound
            .send(Err(TransportError::Disconnected("sim".into())))
            .await;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rig
// ────────────────────────────────────────────────────────────────────────────

/// A simulated rig bound to one [`DeviceLink`].
#[derive(Debug)]
pub struct SimRig {
    endpoint: LinkEndpoint,
    gains: [GainSet; CHANNEL_COUNT],
}

/// Running simulation.
#[derive(Debug)]
pub struct SimHandle {
    /// Every command the gateway sent, in order.
    pub commands: mpsc::UnboundedReceiver<DeviceCommand>,
    pub task: JoinHandle<()>,
}

impl SimRig {
    /// Create a rig and the gateway-side link connected to it.
    pub fn pair() -> (DeviceLink, SimRig) {
        let (device_link, endpoint) = link::channel("sim");
        (
            device_link,
            SimRig {
                endpoint,
                gains: [GainSet::default(); CHANNEL_COUNT],
            },
        )
    }

    /// Preload the gains reported for `channel`.
    pub fn with_gains(mut self, channel: ActuatorId, gains: GainSet) -> Self {
        self.gains[channel.index()] = gains;
        self
    }

    pub fn reporter(&self) -> SimReporter {
        SimReporter {
            inbound: self.endpoint.inbound.clone(),
        }
    }

    /// Start answering commands on a Tokio task.
    ///
    /// The task ends when the gateway drops every outbound sender.
    pub fn spawn(self) -> SimHandle {
        let (observed_tx, observed_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(observed_tx));
        SimHandle {
            commands: observed_rx,
            task,
        }
    }

    async fn run(mut self, observed: mpsc::UnboundedSender<DeviceCommand>) {
        let reporter = self.reporter();
        while let Some(line) = self.endpoint.outbound.recv().await {
            let command = match decode_command_line(&line).and_then(DeviceCommand::decode) {
                Ok(command) => command,
                Err(e) => {
                    warn!(error = %e, line = line.trim_end(), "sim rig ignoring command line");
                    continue;
                }
            };
            debug!(?command, "sim rig received command");

            match command {
                DeviceCommand::RequestGain { channel } | DeviceCommand::SaveGain { channel } => {
                    let report = DeviceFrame::GainReport {
                        channel,
                        gains: self.gains[channel.index()],
                    };
                    if reporter.send_frame(&report).await.is_err() {
                        break;
                    }
                }
                DeviceCommand::SetGain { channel, p, i, d } => {
                    let gains = &mut self.gains[channel.index()];
                    gains.p = p;
                    gains.i = i;
                    gains.d = d;
                }
                DeviceCommand::SetTargets { .. } | DeviceCommand::RequestCapture { .. } => {}
            }

            // The test may not care about the command stream.
            let _ = observed.send(command);
        }
        debug!("sim rig stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigbridge_protocol::{PaddingPolicy, decode, decode_report_line, encode_command_line};

    fn ch(index: u8) -> ActuatorId {
        ActuatorId::new(index).unwrap()
    }

    #[tokio::test]
    async fn answers_gain_requests_with_preloaded_gains() -> Result<(), Box<dyn std::error::Error>> {
        let gains = GainSet {
            p: 30,
            i: 2,
            d: 1,
            capture_max: 3900,
            capture_min: 150,
        };
        let (mut link, rig) = SimRig::pair();
        let mut sim = rig.with_gains(ch(2), gains).spawn();

        let request = DeviceCommand::RequestGain { channel: ch(2) };
        link.outbound.send(encode_command_line(request.encode())).await?;

        let line = link.inbound.recv().await.ok_or("link closed")??;
        let frame = decode(decode_report_line(&line)?, PaddingPolicy::Reject)?;
        assert_eq!(frame, DeviceFrame::GainReport { channel: ch(2), gains });
        assert_eq!(sim.commands.recv().await, Some(request));
        Ok(())
    }

    #[tokio::test]
    async fn set_gain_changes_later_reports() -> Result<(), Box<dyn std::error::Error>> {
        let (mut link, rig) = SimRig::pair();
        let _sim = rig.spawn();

        let set = DeviceCommand::SetGain {
            channel: ch(0),
            p: 15,
            i: 4,
            d: 9,
        };
        link.outbound.send(encode_command_line(set.encode())).await?;
        let save = DeviceCommand::SaveGain { channel: ch(0) };
        link.outbound.send(encode_command_line(save.encode())).await?;

        let line = link.inbound.recv().await.ok_or("link closed")??;
        match decode(decode_report_line(&line)?, PaddingPolicy::Reject)? {
            DeviceFrame::GainReport { gains, .. } => {
                assert_eq!((gains.p, gains.i, gains.d), (15, 4, 9));
            }
            other => panic!("unexpected frame {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn stops_when_gateway_side_is_dropped() {
        let (link, rig) = SimRig::pair();
        let sim = rig.spawn();
        drop(link);
        sim.task.await.expect("sim task must not panic");
    }

    #[tokio::test]
    async fn reporter_frames_match_the_firmware() -> Result<(), Box<dyn std::error::Error>> {
        let (mut link, rig) = SimRig::pair();
        let reporter = rig.reporter();
        let frame = DeviceFrame::Telemetry {
            channel: ch(1),
            state: rigbridge_types::ActuatorState {
                position: 1,
                drive_voltage: 2,
                command_echo: 3,
            },
        };
        reporter.send_frame(&frame).await?;
        let line = link.inbound.recv().await.ok_or("link closed")??;
        assert_eq!(decode(decode_report_line(&line)?, PaddingPolicy::Reject)?, frame);
        Ok(())
    }
}
