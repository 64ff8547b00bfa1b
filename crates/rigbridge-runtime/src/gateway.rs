//! [`Gateway`] – wires the device link, the bus, and the front end together.
//!
//! [`Gateway::start`] binds the front-end sockets and spawns five tasks:
//!
//! | Task | Consumes | Produces |
//! |---|---|---|
//! | device inbound | report lines from the [`DeviceLink`] | store updates, bus events |
//! | uplink | telemetry and gain responses on the bus | JSON datagrams to the front end |
//! | front-end inbound | command datagrams | [`Dispatcher`] calls |
//! | link monitor | [`LinkWatchdog`] | [`EventPayload::LinkFault`] alerts |
//! | gait faults | transport errors of gait tasks | task failure |
//!
//! The first task to fail ends [`Gateway::run`]; on the way out every task is
//! cancelled and a running gait sends the rig home.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rigbridge_hal::link::InboundLine;
use rigbridge_hal::{ActuatorStateStore, DeviceLink};
use rigbridge_middleware::{
    CommandListener, DeviceSink, EventBus, LineSink, Topic, TopicReceiver, UplinkSender,
    parse_datagram, to_front_end,
};
use rigbridge_protocol::{PaddingPolicy, decode, decode_report_line};
use rigbridge_types::{DispatchError, Event, EventPayload, GatewayError, TransportError};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{Dispatched, Dispatcher, DispatcherConfig};
use crate::watchdog::LinkWatchdog;

/// Event source of decoded device frames.
pub const DEVICE_SOURCE: &str = "rigbridge::device_inbound";
/// Event source of link alerts.
pub const MONITOR_SOURCE: &str = "rigbridge::link_monitor";
/// Watchdog name of the device link.
pub const DEVICE_LINK: &str = "serial_inbound";

const MIN_MONITOR_PERIOD: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Local address receiving front-end commands.
    pub listen_addr: SocketAddr,
    /// Front-end address receiving telemetry and gain responses.
    pub frontend_addr: SocketAddr,
    pub padding: PaddingPolicy,
    /// Silence on the device link longer than this raises an alert.
    pub device_silence: Duration,
    pub dispatcher: DispatcherConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 6060)),
            frontend_addr: SocketAddr::from(([127, 0, 0, 1], 6050)),
            padding: PaddingPolicy::default(),
            device_silence: Duration::from_millis(2_000),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

type SharedWatchdog = Arc<Mutex<LinkWatchdog>>;

/// A running gateway.
pub struct Gateway {
    tasks: JoinSet<Result<(), TransportError>>,
    cancel: CancellationToken,
    dispatcher: Arc<Dispatcher>,
    store: ActuatorStateStore,
    bus: EventBus,
    command_addr: SocketAddr,
}

impl Gateway {
    /// Bind the front-end sockets and start serving `link`.
    pub async fn start(config: GatewayConfig, link: DeviceLink) -> Result<Self, GatewayError> {
        let listener = CommandListener::bind(config.listen_addr).await?;
        let command_addr = listener.local_addr()?;
        let uplink = UplinkSender::bind(config.frontend_addr).await?;

        let cancel = CancellationToken::new();
        let store = ActuatorStateStore::new();
        let bus = EventBus::default();

        let DeviceLink {
            name,
            inbound,
            outbound,
        } = link;
        let sink: Arc<dyn DeviceSink> = Arc::new(LineSink::new(name.clone(), outbound));
        let (faults, fault_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(
            Dispatcher::new(
                sink,
                store.clone(),
                bus.clone(),
                config.dispatcher.clone(),
                cancel.child_token(),
            )
            .report_faults(faults),
        );

        let watchdog: SharedWatchdog = Arc::new(Mutex::new(LinkWatchdog::new()));
        lock(&watchdog).register(DEVICE_LINK, config.device_silence);

        // Subscribe before the inbound task can publish anything.
        let telemetry = bus.subscribe_to(Topic::Telemetry);
        let responses = bus.subscribe_to(Topic::GainResponses);

        let mut tasks = JoinSet::new();
        tasks.spawn(device_inbound(
            inbound,
            name.clone(),
            store.clone(),
            bus.clone(),
            config.padding,
            Arc::clone(&watchdog),
            cancel.clone(),
        ));
        tasks.spawn(uplink_loop(telemetry, responses, uplink, cancel.clone()));
        tasks.spawn(frontend_inbound(
            listener,
            Arc::clone(&dispatcher),
            cancel.clone(),
        ));
        tasks.spawn(link_monitor(
            watchdog,
            bus.clone(),
            config.device_silence,
            cancel.clone(),
        ));
        tasks.spawn(gait_faults(fault_rx, cancel.clone()));

        info!(
            device = %name,
            commands = %command_addr,
            frontend = %config.frontend_addr,
            padding = ?config.padding,
            "gateway started"
        );
        Ok(Self {
            tasks,
            cancel,
            dispatcher,
            store,
            bus,
            command_addr,
        })
    }

    pub fn store(&self) -> &ActuatorStateStore {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Address the command listener is bound to.
    pub fn command_addr(&self) -> SocketAddr {
        self.command_addr
    }

    /// Cancelling this token makes [`Gateway::run`] return `Ok(())`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Serve until cancelled or until a task fails, then stop every task.
    pub async fn run(mut self) -> Result<(), GatewayError> {
        let outcome = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Ok(()),
            Some(joined) = self.tasks.join_next() => task_outcome(joined),
        };
        if let Err(e) = &outcome {
            error!(error = %e, "gateway task failed");
        }

        self.cancel.cancel();
        self.dispatcher.shutdown().await;
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = task_outcome(joined) {
                debug!(error = %e, "task ended with an error during shutdown");
            }
        }
        info!("gateway stopped");
        outcome
    }

    /// Cancel and wait for every task to finish.
    pub async fn shutdown(self) -> Result<(), GatewayError> {
        self.cancel.cancel();
        self.run().await
    }
}

fn task_outcome(joined: Result<Result<(), TransportError>, JoinError>) -> Result<(), GatewayError> {
    match joined {
        Ok(result) => result.map_err(GatewayError::from),
        Err(e) => Err(GatewayError::Task(e.to_string())),
    }
}

fn lock(watchdog: &SharedWatchdog) -> std::sync::MutexGuard<'_, LinkWatchdog> {
    watchdog.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Tasks
// ────────────────────────────────────────────────────────────────────────────

/// Decode report lines, update the store, and publish frames.
///
/// Undecodable lines are dropped with a warning.  A link error or a closed
/// link ends the task with an error.
async fn device_inbound(
    mut inbound: mpsc::Receiver<InboundLine>,
    link: String,
    store: ActuatorStateStore,
    bus: EventBus,
    padding: PaddingPolicy,
    watchdog: SharedWatchdog,
    cancel: CancellationToken,
) -> Result<(), TransportError> {
    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            received = inbound.recv() => received,
        };
        let line = match received {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Err(e),
            None => return Err(TransportError::Disconnected(link)),
        };

        match decode_report_line(&line).and_then(|word| decode(word, padding)) {
            Ok(frame) => {
                lock(&watchdog).heartbeat(DEVICE_LINK);
                store.apply(&frame);
                let delivered = bus.publish_frame(DEVICE_SOURCE, frame);
                debug!(?frame, delivered, "device frame");
            }
            Err(e) => warn!(%link, error = %e, line = line.trim_end(), "dropping device line"),
        }
    }
}

/// Forward telemetry and gain responses to the front end.
async fn uplink_loop(
    mut telemetry: TopicReceiver,
    mut responses: TopicReceiver,
    uplink: UplinkSender,
    cancel: CancellationToken,
) -> Result<(), TransportError> {
    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            event = telemetry.recv() => event,
            event = responses.recv() => event,
        };
        match received {
            Ok(Event {
                payload: EventPayload::Device(frame),
                ..
            }) => uplink.send_json(&to_front_end(&frame)).await?,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "uplink fell behind, frames dropped");
            }
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

/// Parse command datagrams and hand them to the dispatcher.
async fn frontend_inbound(
    listener: CommandListener,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) -> Result<(), TransportError> {
    loop {
        let (bytes, from) = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            datagram = listener.recv() => datagram?,
        };
        let message = match parse_datagram(&bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!(%from, error = %e, "dropping front-end datagram");
                continue;
            }
        };
        let kind = message.kind();
        debug!(%from, kind, "front-end command");

        match dispatcher.dispatch(message).await {
            Ok(Dispatched::Sent) => {}
            Ok(Dispatched::AwaitingGain(waiter)) => {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let channel = waiter.channel();
                    tokio::select! {
                        () = cancel.cancelled() => {}
                        result = waiter.wait() => match result {
                            Ok(gains) => debug!(%channel, ?gains, "gain request answered"),
                            Err(e) => warn!(%channel, error = %e, "gain request unanswered"),
                        },
                    }
                });
            }
            // The dispatcher tracks the gait task itself.
            Ok(Dispatched::GaitStarted(_)) => {}
            Err(DispatchError::Transport(e)) => return Err(e),
            Err(e) => warn!(kind, error = %e, "command rejected"),
        }
    }
}

/// Fail with the first transport error a gait task reports.
async fn gait_faults(
    mut faults: mpsc::UnboundedReceiver<TransportError>,
    cancel: CancellationToken,
) -> Result<(), TransportError> {
    tokio::select! {
        () = cancel.cancelled() => Ok(()),
        fault = faults.recv() => fault.map_or(Ok(()), Err),
    }
}

/// Raise one alert each time the device link goes silent.
async fn link_monitor(
    watchdog: SharedWatchdog,
    bus: EventBus,
    silence: Duration,
    cancel: CancellationToken,
) -> Result<(), TransportError> {
    let mut ticker = tokio::time::interval((silence / 2).max(MIN_MONITOR_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }
        let silent = lock(&watchdog).newly_silent();
        for component in silent {
            warn!(%component, ?silence, "no device traffic");
            bus.publish_to(
                Topic::SystemAlerts,
                Event::new(
                    MONITOR_SOURCE,
                    EventPayload::LinkFault {
                        component,
                        message: format!("no frames for {silence:?}"),
                    },
                ),
            );
        }
    }
}
