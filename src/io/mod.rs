//! I/O devices polled by primitives.
//!
//! Devices are passive: the host posts the latest data with
//! [`IoDevices::post_data`] and primitives query it synchronously. Nothing
//! is queued beyond "latest value wins".

pub mod clock;
pub mod keyboard;
pub mod mouse;
pub mod mouse_wheel;

pub use clock::{Clock, ManualTime, SystemTime, TimeSource};
pub use keyboard::{KeyEvent, Keyboard};
pub use mouse::{Mouse, MouseEvent};
pub use mouse_wheel::{MouseWheel, WheelEvent};

use serde::Deserialize;

use crate::runtime::value::Value;

/// Device errors.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("Unknown I/O device: {0}")]
    UnknownDevice(String),
    #[error("Malformed data for {device}: {source}")]
    MalformedData {
        device: String,
        #[source]
        source: serde_json::Error,
    },
}

/// What a posted event means for hat dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoSignal {
    /// Nothing further to do.
    None,
    /// A key went down; carries its scratch name.
    KeyPressed(String),
}

/// The fixed set of devices.
#[derive(Debug)]
pub struct IoDevices {
    pub clock: Clock,
    pub keyboard: Keyboard,
    pub mouse: Mouse,
    pub mouse_wheel: MouseWheel,
}

impl Default for IoDevices {
    fn default() -> Self {
        Self::new(Clock::default())
    }
}

impl IoDevices {
    /// Create the device set around a clock.
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            keyboard: Keyboard::default(),
            mouse: Mouse::default(),
            mouse_wheel: MouseWheel::default(),
        }
    }

    /// Route raw host data to the named device.
    pub fn post_data(
        &mut self,
        device: &str,
        data: Value,
    ) -> Result<IoSignal, IoError> {
        match device {
            "clock" => {
                let command = parse::<clock::ClockCommand>(device, data)?;
                self.clock.post_data(command);
                Ok(IoSignal::None)
            }
            "keyboard" => {
                let event = parse::<KeyEvent>(device, data)?;
                Ok(self
                    .keyboard
                    .post_data(event)
                    .map(IoSignal::KeyPressed)
                    .unwrap_or(IoSignal::None))
            }
            "mouse" => {
                let event = parse::<MouseEvent>(device, data)?;
                self.mouse.post_data(event);
                Ok(IoSignal::None)
            }
            "mouseWheel" => {
                let event = parse::<WheelEvent>(device, data)?;
                Ok(self
                    .mouse_wheel
                    .post_data(event)
                    .map(|key| IoSignal::KeyPressed(key.to_string()))
                    .unwrap_or(IoSignal::None))
            }
            other => Err(IoError::UnknownDevice(other.to_string())),
        }
    }
}

fn parse<T: for<'de> Deserialize<'de>>(
    device: &str,
    data: Value,
) -> Result<T, IoError> {
    serde_json::from_value(data).map_err(|source| IoError::MalformedData {
        device: device.to_string(),
        source,
    })
}
