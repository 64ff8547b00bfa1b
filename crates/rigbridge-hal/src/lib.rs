//! `rigbridge-hal` – everything that touches the rig.
//!
//! # Modules
//!
//! - [`store`] – [`ActuatorStateStore`], the last-known telemetry and gains
//!   of every channel, shared between the inbound and outbound paths.
//! - [`link`] – [`DeviceLink`], the line-oriented channel pair every device
//!   transport hands to the gateway.
//! - [`serial`] – opens a serial port and pumps its lines through a
//!   [`DeviceLink`] from two dedicated threads.
//! - [`sim`] – [`SimRig`], an in-process stand-in for the firmware so the
//!   whole gateway runs in tests without hardware.

pub mod link;
pub mod serial;
pub mod sim;
pub mod store;

pub use link::DeviceLink;
pub use serial::{SerialConfig, open_serial};
pub use sim::SimRig;
pub use store::ActuatorStateStore;
