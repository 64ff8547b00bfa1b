//! Test doubles shared by the runtime's unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use rigbridge_middleware::DeviceSink;
use rigbridge_protocol::DeviceCommand;
use rigbridge_types::TransportError;

/// Records every command it is handed.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<DeviceCommand>>,
    /// The link drops once this many commands went through.
    capacity: Option<usize>,
}

impl RecordingSink {
    /// A sink whose link is already gone.
    pub fn disconnected() -> Self {
        Self::failing_after(0)
    }

    pub fn failing_after(commands: usize) -> Self {
        Self {
            sent: Mutex::default(),
            capacity: Some(commands),
        }
    }

    pub fn sent(&self) -> Vec<DeviceCommand> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceSink for RecordingSink {
    async fn transmit(&self, command: &DeviceCommand) -> Result<(), TransportError> {
        let mut sent = self.sent.lock().unwrap();
        if self.capacity.is_some_and(|capacity| sent.len() >= capacity) {
            return Err(TransportError::Disconnected("recording".into()));
        }
        sent.push(*command);
        Ok(())
    }
}
