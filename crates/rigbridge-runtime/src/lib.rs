//! `rigbridge-runtime` – the gateway's control plane.
//!
//! # Modules
//!
//! - [`gateway`] – [`Gateway`][gateway::Gateway]: starts the device, uplink,
//!   front-end and link-monitor tasks and supervises them until shutdown.
//! - [`dispatcher`] – [`Dispatcher`][dispatcher::Dispatcher]: turns front-end
//!   messages into device commands, filling unaddressed channels from the
//!   [`ActuatorStateStore`][rigbridge_hal::ActuatorStateStore] and guarding
//!   gain requests and gait sequences so only one of each is in flight.
//! - [`gait`] – [`CrawlGait`][gait::CrawlGait]: the crawl stride as a pure
//!   step machine, plus [`run_crawl`][gait::run_crawl] to play it at a fixed
//!   tick.
//! - [`watchdog`] – [`LinkWatchdog`][watchdog::LinkWatchdog]: detects a
//!   silent device link.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.
//!
//! # Shutdown
//!
//! Cancelling the token from [`Gateway::shutdown_token`][gateway::Gateway::shutdown_token]
//! stops every task.  A gait still running at that point sends the rig home
//! before [`Gateway::run`][gateway::Gateway::run] returns.

pub mod dispatcher;
pub mod gait;
pub mod gateway;
pub mod telemetry;
pub mod watchdog;

#[cfg(test)]
mod testing;

pub use dispatcher::{Dispatched, Dispatcher, DispatcherConfig, DispatcherState, GainWaiter};
pub use gait::{CrawlGait, CrawlParams, CrawlPhase, GaitOutcome, run_crawl};
pub use gateway::{Gateway, GatewayConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use watchdog::LinkWatchdog;
