//! `rigbridge-middleware` – routing between the rig and the front end.
//!
//! Moves data between the device link, the internal bus, and the front end
//! without owning any control logic.
//!
//! # Modules
//!
//! - [`bus`] – typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`adapter`] – the [`DeviceSink`] trait every path to the rig implements,
//!   plus [`LineSink`] for line-oriented links.
//! - [`translator`] – device frames to front-end JSON and back.
//! - [`udp`] – datagram sockets facing the front end.

pub mod adapter;
pub mod bus;
pub mod translator;
pub mod udp;

pub use adapter::{DeviceSink, LineSink};
pub use bus::{EventBus, Topic, TopicReceiver};
pub use translator::{from_front_end, parse_datagram, to_front_end};
pub use udp::{CommandListener, UplinkSender};
