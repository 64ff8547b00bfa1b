//! [`LinkWatchdog`] – silence detector for inbound links.
//!
//! The device inbound task calls [`LinkWatchdog::heartbeat`] for every frame
//! it decodes.  A supervisor loop calls [`LinkWatchdog::newly_silent`] and
//! raises one alert per silence; the link is re-armed by its next heartbeat.
//!
//! Time is read from [`tokio::time::Instant`], so paused-clock tests can
//! drive it with `tokio::time::advance`.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

// ────────────────────────────────────────────────────────────────────────────
// Internal entry
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct LinkEntry {
    last_seen: Instant,
    deadline: Duration,
    alerted: bool,
}

impl LinkEntry {
    fn is_silent(&self) -> bool {
        self.last_seen.elapsed() > self.deadline
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Watchdog
// ────────────────────────────────────────────────────────────────────────────

/// Tracks the last traffic seen on each registered link.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use rigbridge_runtime::watchdog::LinkWatchdog;
///
/// let mut wd = LinkWatchdog::new();
/// wd.register("serial_inbound", Duration::from_secs(2));
/// wd.heartbeat("serial_inbound");
///
/// assert!(wd.newly_silent().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct LinkWatchdog {
    links: HashMap<String, LinkEntry>,
}

impl LinkWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `link` with a maximum silence of `deadline`, starting now.
    ///
    /// Re-registering an existing link resets it.
    pub fn register(&mut self, link: &str, deadline: Duration) {
        self.links.insert(
            link.to_string(),
            LinkEntry {
                last_seen: Instant::now(),
                deadline,
                alerted: false,
            },
        );
    }

    /// Record traffic on `link`.  No-op for unregistered links.
    pub fn heartbeat(&mut self, link: &str) {
        if let Some(entry) = self.links.get_mut(link) {
            entry.last_seen = Instant::now();
            entry.alerted = false;
        }
    }

    /// Links that went silent since the last call, each reported once per
    /// silence.
    pub fn newly_silent(&mut self) -> Vec<String> {
        self.links
            .iter_mut()
            .filter(|(_, entry)| !entry.alerted && entry.is_silent())
            .map(|(name, entry)| {
                entry.alerted = true;
                name.clone()
            })
            .collect()
    }
}
