//! [`ActuatorStateStore`] – last-known state of every channel.
//!
//! Written only by the inbound decode path; read by the outbound command path
//! when a four-channel word has to be completed with the channels the request
//! did not address.  Channels that were never reported read as zero.

use std::sync::{Arc, PoisonError, RwLock};

use rigbridge_types::{ActuatorId, ActuatorState, CHANNEL_COUNT, DeviceFrame, GainSet, TargetMode};
use tracing::trace;

#[derive(Debug, Default)]
struct Channels {
    states: [ActuatorState; CHANNEL_COUNT],
    gains: [Option<GainSet>; CHANNEL_COUNT],
}

/// Shared per-channel state.  Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct ActuatorStateStore {
    inner: Arc<RwLock<Channels>>,
}

impl ActuatorStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the telemetry of `id`.
    pub fn update(&self, id: ActuatorId, position: u16, drive_voltage: u16, command_echo: u16) {
        let mut channels = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        channels.states[id.index()] = ActuatorState {
            position,
            drive_voltage,
            command_echo,
        };
        trace!(channel = %id, position, drive_voltage, command_echo, "state updated");
    }

    /// Record whatever a decoded frame says about its channel.
    pub fn apply(&self, frame: &DeviceFrame) {
        match *frame {
            DeviceFrame::Telemetry { channel, state } => self.update(
                channel,
                state.position,
                state.drive_voltage,
                state.command_echo,
            ),
            DeviceFrame::GainReport { channel, gains } => {
                let mut channels = self.inner.write().unwrap_or_else(PoisonError::into_inner);
                channels.gains[channel.index()] = Some(gains);
            }
        }
    }

    pub fn snapshot(&self, id: ActuatorId) -> ActuatorState {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).states[id.index()]
    }

    pub fn snapshot_all(&self) -> [ActuatorState; CHANNEL_COUNT] {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).states
    }

    /// Last gains reported by the rig for `id`, if any.
    pub fn gains(&self, id: ActuatorId) -> Option<GainSet> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).gains[id.index()]
    }

    /// Build a complete four-channel target word.
    ///
    /// Addressed channels take the given value; every other channel repeats
    /// its last-known position (position mode) or command echo (command
    /// mode).  All channels are read under one lock, so the word never mixes
    /// readings from before and after a concurrent update.  When a channel is
    /// addressed twice the last entry wins.
    pub fn fill_targets(&self, mode: TargetMode, targets: &[(ActuatorId, u16)]) -> [u16; CHANNEL_COUNT] {
        let channels = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut values = channels.states.map(|state| match mode {
            TargetMode::Position => state.position,
            TargetMode::Command => state.command_echo,
        });
        for &(id, value) in targets {
            values[id.index()] = value;
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(index: u8) -> ActuatorId {
        ActuatorId::new(index).unwrap()
    }

    #[test]
    fn unseen_channels_read_as_zero() {
        let store = ActuatorStateStore::new();
        for id in ActuatorId::ALL {
            assert_eq!(store.snapshot(id), ActuatorState::default());
            assert_eq!(store.gains(id), None);
        }
    }

    #[test]
    fn update_overwrites_one_channel() {
        let store = ActuatorStateStore::new();
        store.update(ch(2), 10, 20, 30);
        store.update(ch(2), 11, 21, 31);
        assert_eq!(
            store.snapshot(ch(2)),
            ActuatorState {
                position: 11,
                drive_voltage: 21,
                command_echo: 31,
            }
        );
        assert_eq!(store.snapshot(ch(1)), ActuatorState::default());
    }

    #[test]
    fn fill_targets_pads_with_zero_for_unseen_channels() {
        let store = ActuatorStateStore::new();
        let values = store.fill_targets(TargetMode::Position, &[(ch(1), 1200)]);
        assert_eq!(values, [0, 1200, 0, 0]);
    }

    #[test]
    fn fill_targets_pads_by_mode() {
        let store = ActuatorStateStore::new();
        store.update(ch(0), 100, 7, 900);
        store.update(ch(3), 400, 7, 600);

        let by_position = store.fill_targets(TargetMode::Position, &[(ch(1), 5)]);
        assert_eq!(by_position, [100, 5, 0, 400]);

        let by_command = store.fill_targets(TargetMode::Command, &[(ch(1), 5), (ch(1), 6)]);
        assert_eq!(by_command, [900, 6, 0, 600]);
    }

    #[test]
    fn apply_records_gain_reports() {
        let store = ActuatorStateStore::new();
        let gains = GainSet {
            p: 1,
            i: 2,
            d: 3,
            capture_max: 4000,
            capture_min: 12,
        };
        store.apply(&DeviceFrame::GainReport {
            channel: ch(3),
            gains,
        });
        assert_eq!(store.gains(ch(3)), Some(gains));
        assert_eq!(store.snapshot(ch(3)), ActuatorState::default());
    }

    #[test]
    fn clones_share_state_across_threads() {
        let store = ActuatorStateStore::new();
        let writer = store.clone();
        std::thread::spawn(move || {
            for position in 0..=100 {
                writer.update(ch(0), position, 0, 0);
            }
        })
        .join()
        .unwrap();
        assert_eq!(store.snapshot(ch(0)).position, 100);
        assert_eq!(store.snapshot_all()[0].position, 100);
    }
}
