//! Application payloads understood by the device.
//!
//! Requests are flat `{"method": ..., "params": {...}}` objects. A state change
//! counts as confirmed when the serialized `get_device_info` reply contains the
//! exact `"key":value` fragment the command expects. The check is plain text
//! containment, so `"brightness":1` also matches a reported brightness of 10;
//! replies from real devices are compared the same way.

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

pub const SET_DEVICE_INFO: &str = "set_device_info";
pub const GET_DEVICE_INFO: &str = "get_device_info";

/// A request envelope as sent on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRequest<'a> {
    pub method: &'a str,
    pub params: Value,
}

impl DeviceRequest<'_> {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// `{"method":"get_device_info","params":{}}`.
pub fn device_info_request() -> String {
    DeviceRequest {
        method: GET_DEVICE_INFO,
        params: json!({}),
    }
    .to_json()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("brightness {0} outside 1..=100")]
    Brightness(u8),
    #[error("hue {0} outside 0..=360")]
    Hue(u16),
    #[error("saturation {0} outside 0..=100")]
    Saturation(u8),
    #[error("color temperature must be non-zero")]
    ColorTemperature,
}

/// State-changing commands shared by plugs and bulbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    On,
    Off,
    /// Percent, 1..=100.
    Brightness(u8),
    /// Hue in degrees (0..=360) and saturation percent (0..=100).
    Color { hue: u16, saturation: u8 },
    /// Kelvin, e.g. 2500..=6500.
    ColorTemperature(u16),
}

impl DeviceCommand {
    pub fn validate(&self) -> Result<(), CommandError> {
        match *self {
            DeviceCommand::On | DeviceCommand::Off => Ok(()),
            DeviceCommand::Brightness(level) if !(1..=100).contains(&level) => {
                Err(CommandError::Brightness(level))
            }
            DeviceCommand::Brightness(_) => Ok(()),
            DeviceCommand::Color { hue, .. } if hue > 360 => Err(CommandError::Hue(hue)),
            DeviceCommand::Color { saturation, .. } if saturation > 100 => {
                Err(CommandError::Saturation(saturation))
            }
            DeviceCommand::Color { .. } => Ok(()),
            DeviceCommand::ColorTemperature(0) => Err(CommandError::ColorTemperature),
            DeviceCommand::ColorTemperature(_) => Ok(()),
        }
    }

    pub fn params(&self) -> Value {
        match *self {
            DeviceCommand::On => json!({ "device_on": true }),
            DeviceCommand::Off => json!({ "device_on": false }),
            DeviceCommand::Brightness(level) => json!({ "brightness": level }),
            // Colour and white modes are exclusive: clear the other one.
            DeviceCommand::Color { hue, saturation } => {
                json!({ "hue": hue, "saturation": saturation, "color_temp": 0 })
            }
            DeviceCommand::ColorTemperature(kelvin) => {
                json!({ "color_temp": kelvin, "hue": 0, "saturation": 0 })
            }
        }
    }

    /// Serialized request body.
    pub fn request(&self) -> String {
        DeviceRequest {
            method: SET_DEVICE_INFO,
            params: self.params(),
        }
        .to_json()
    }

    /// Fragment that must appear in a `get_device_info` reply once applied.
    pub fn expected_state(&self) -> String {
        match *self {
            DeviceCommand::On => "\"device_on\":true".to_string(),
            DeviceCommand::Off => "\"device_on\":false".to_string(),
            DeviceCommand::Brightness(level) => format!("\"brightness\":{level}"),
            DeviceCommand::Color { hue, .. } => format!("\"hue\":{hue}"),
            DeviceCommand::ColorTemperature(kelvin) => format!("\"color_temp\":{kelvin}"),
        }
    }
}
