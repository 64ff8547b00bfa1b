//! Front-end command dispatcher.
//!
//! [`Dispatcher::dispatch`] turns one [`FrontEndMessage`] into device
//! commands.  Two kinds of work outlive the call and are guarded so only one
//! of each runs at a time:
//!
//! * a gain request or save, which waits for the matching report on
//!   [`Topic::GainResponses`] ([`GainWaiter`]);
//! * a fixed-motion sequence, which runs as a tracked task.
//!
//! The two guards are independent: a gain query may be issued while a gait
//! is playing.  A gait that loses the device link reports the error on the
//! fault lane set with [`Dispatcher::report_faults`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rigbridge_hal::ActuatorStateStore;
use rigbridge_middleware::{DeviceSink, EventBus, Topic, TopicReceiver};
use rigbridge_protocol::DeviceCommand;
use rigbridge_types::{
    ActuatorId, DeviceFrame, DispatchError, EventPayload, FIELD_MAX, FrontEndMessage, GainSet,
    Motion, TargetMode, TransportError,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::gait::{CrawlGait, GaitOutcome, run_crawl};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How long a gain request waits for its report.
    pub gain_timeout: Duration,
    /// Divisor applied to command-mode target values from the front end.
    pub command_scale: f64,
    pub gait_tick: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            gain_timeout: Duration::from_millis(2_000),
            command_scale: 2.275,
            gait_tick: Duration::from_millis(300),
        }
    }
}

/// Coarse view of what the dispatcher is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    AwaitingGainResponse,
    /// Takes precedence over a pending gain request.
    GaitRunning,
}

/// What a successful [`Dispatcher::dispatch`] started.
#[derive(Debug)]
pub enum Dispatched {
    /// Fire-and-forget command written to the rig.
    Sent,
    /// Gain request written; hold the waiter until the report arrives.
    AwaitingGain(GainWaiter),
    GaitStarted(JoinHandle<Result<GaitOutcome, TransportError>>),
}

// ────────────────────────────────────────────────────────────────────────────
// In-flight guard
// ────────────────────────────────────────────────────────────────────────────

/// Holds a busy flag set until dropped.
#[derive(Debug)]
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Gain waiter
// ────────────────────────────────────────────────────────────────────────────

/// Pending gain request.  Dropping it releases the request slot.
#[derive(Debug)]
pub struct GainWaiter {
    channel: ActuatorId,
    responses: TopicReceiver,
    timeout: Duration,
    _slot: InFlight,
}

impl GainWaiter {
    pub fn channel(&self) -> ActuatorId {
        self.channel
    }

    /// Wait for the report of this channel.
    ///
    /// Reports for other channels are skipped.  Gives up with
    /// [`DispatchError::Timeout`] after the configured timeout.
    pub async fn wait(mut self) -> Result<GainSet, DispatchError> {
        let channel = self.channel;
        let limit = self.timeout;
        let responses = &mut self.responses;
        let report = async move {
            loop {
                match responses.recv().await {
                    Ok(event) => {
                        if let EventPayload::Device(DeviceFrame::GainReport {
                            channel: reported,
                            gains,
                        }) = event.payload
                            && reported == channel
                        {
                            return Ok(gains);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%channel, skipped, "gain waiter lagged behind the bus");
                    }
                    Err(RecvError::Closed) => {
                        return Err(TransportError::Disconnected("event bus".into()).into());
                    }
                }
            }
        };
        match tokio::time::timeout(limit, report).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(limit)),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ────────────────────────────────────────────────────────────────────────────

/// Routes front-end messages to the rig.
pub struct Dispatcher {
    sink: Arc<dyn DeviceSink>,
    store: ActuatorStateStore,
    bus: EventBus,
    config: DispatcherConfig,
    gait_running: Arc<AtomicBool>,
    gain_pending: Arc<AtomicBool>,
    gaits: TaskTracker,
    cancel: CancellationToken,
    faults: Option<mpsc::UnboundedSender<TransportError>>,
}

impl Dispatcher {
    /// `cancel` stops running gait sequences; pass a child of the gateway's
    /// shutdown token.
    pub fn new(
        sink: Arc<dyn DeviceSink>,
        store: ActuatorStateStore,
        bus: EventBus,
        config: DispatcherConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sink,
            store,
            bus,
            config,
            gait_running: Arc::new(AtomicBool::new(false)),
            gain_pending: Arc::new(AtomicBool::new(false)),
            gaits: TaskTracker::new(),
            cancel,
            faults: None,
        }
    }

    /// Send transport errors hit by gait tasks to `faults`.
    pub fn report_faults(mut self, faults: mpsc::UnboundedSender<TransportError>) -> Self {
        self.faults = Some(faults);
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn state(&self) -> DispatcherState {
        if self.gait_running.load(Ordering::Acquire) {
            DispatcherState::GaitRunning
        } else if self.gain_pending.load(Ordering::Acquire) {
            DispatcherState::AwaitingGainResponse
        } else {
            DispatcherState::Idle
        }
    }

    /// Carry out one front-end message.
    pub async fn dispatch(&self, message: FrontEndMessage) -> Result<Dispatched, DispatchError> {
        match message {
            FrontEndMessage::SetTargetValue { mode, targets } => {
                let scaled: Vec<(ActuatorId, u16)> = targets
                    .iter()
                    .map(|target| (target.channel, self.scale_target(mode, target.value)))
                    .collect();
                let values = self.store.fill_targets(mode, &scaled);
                self.send(DeviceCommand::SetTargets { mode, values }).await
            }
            FrontEndMessage::SetGainValue { channel, p, i, d } => {
                self.send(DeviceCommand::set_gain(channel, p, i, d)).await
            }
            FrontEndMessage::RequestCapture { channel, point } => {
                self.send(DeviceCommand::RequestCapture { channel, point })
                    .await
            }
            FrontEndMessage::RequestGainValue { channel } => {
                self.request_gain(DeviceCommand::RequestGain { channel }, channel)
                    .await
            }
            FrontEndMessage::RequestGainSave { channel } => {
                self.request_gain(DeviceCommand::SaveGain { channel }, channel)
                    .await
            }
            FrontEndMessage::FixedMotion { motion } => self.start_motion(motion).await,
        }
    }

    /// Cancel running gaits and wait until each has sent the rig home.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.gaits.close();
        self.gaits.wait().await;
    }

    /// Position values are masked to the field; command values are divided by
    /// the command scale first.
    fn scale_target(&self, mode: TargetMode, value: u32) -> u16 {
        let raw = match mode {
            TargetMode::Position => value,
            TargetMode::Command => (f64::from(value) / self.config.command_scale) as u32,
        };
        (raw & u32::from(FIELD_MAX)) as u16
    }

    async fn send(&self, command: DeviceCommand) -> Result<Dispatched, DispatchError> {
        self.sink.transmit(&command).await?;
        Ok(Dispatched::Sent)
    }

    async fn request_gain(
        &self,
        command: DeviceCommand,
        channel: ActuatorId,
    ) -> Result<Dispatched, DispatchError> {
        let slot = InFlight::acquire(&self.gain_pending).ok_or(DispatchError::Busy("gain request"))?;
        // Subscribe before transmitting so a fast reply is not missed.
        let responses = self.bus.subscribe_to(Topic::GainResponses);
        self.sink.transmit(&command).await?;
        debug!(%channel, ?command, "gain request sent");
        Ok(Dispatched::AwaitingGain(GainWaiter {
            channel,
            responses,
            timeout: self.config.gain_timeout,
            _slot: slot,
        }))
    }

    async fn start_motion(&self, motion: Motion) -> Result<Dispatched, DispatchError> {
        if motion != Motion::Crawl {
            if self.gait_running.load(Ordering::Acquire) {
                return Err(DispatchError::Busy("gait sequence"));
            }
            return Err(DispatchError::NotImplemented(motion));
        }

        let slot =
            InFlight::acquire(&self.gait_running).ok_or(DispatchError::Busy("gait sequence"))?;
        self.sink.transmit(&DeviceCommand::home()).await?;

        let sink = Arc::clone(&self.sink);
        let tick = self.config.gait_tick;
        let cancel = self.cancel.child_token();
        let faults = self.faults.clone();
        info!(%motion, ?tick, "gait sequence started");
        let handle = self.gaits.spawn(async move {
            let _slot = slot;
            let outcome = run_crawl(CrawlGait::new(), sink.as_ref(), tick, &cancel).await;
            if let Err(e) = &outcome {
                error!(error = %e, "gait sequence failed");
                if let Some(faults) = faults {
                    let _ = faults.send(e.clone());
                }
            }
            outcome
        });
        Ok(Dispatched::GaitStarted(handle))
    }
}
