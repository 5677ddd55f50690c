use std::fmt;

use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use serde_json::Value;
use tracing::warn;

use crate::config::{ConfigError, SessionConfig};
use crate::control::CommandExecutor;
use crate::handshake::{
    HandshakeError, HttpTransport, ReqwestTransport, TimeoutTransport, TransportError,
};
use crate::messages::{device_info_request, CommandError, DeviceCommand};
use crate::session::{Credentials, SessionError, TapoSession};

/// Errors emitted by the high-level device client.
#[derive(Debug)]
#[non_exhaustive]
pub enum DeviceError {
    /// Configuration rejected before any network activity.
    Config(ConfigError),
    /// The HTTP client could not be built.
    Transport(TransportError),
    /// Session establishment failed.
    Handshake(HandshakeError),
    /// The command parameters are out of range; nothing was sent.
    InvalidCommand(CommandError),
    /// The device never reported the requested state within the retry budget.
    Unconfirmed(DeviceCommand),
    /// A state query could not be completed.
    Session(SessionError),
    /// The device answered with a non-zero `error_code`.
    Device(i64),
    /// The reply was not the JSON shape the device normally sends.
    Decode(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Config(err) => write!(f, "config error: {}", err),
            DeviceError::Transport(err) => write!(f, "transport error: {}", err),
            DeviceError::Handshake(err) => write!(f, "handshake error: {}", err),
            DeviceError::InvalidCommand(err) => write!(f, "invalid command: {}", err),
            DeviceError::Unconfirmed(cmd) => write!(f, "command {:?} not confirmed", cmd),
            DeviceError::Session(err) => write!(f, "session error: {}", err),
            DeviceError::Device(code) => write!(f, "device returned error_code {}", code),
            DeviceError::Decode(err) => write!(f, "decode error: {}", err),
        }
    }
}

impl std::error::Error for DeviceError {}

impl From<ConfigError> for DeviceError {
    fn from(err: ConfigError) -> Self {
        DeviceError::Config(err)
    }
}

impl From<TransportError> for DeviceError {
    fn from(err: TransportError) -> Self {
        DeviceError::Transport(err)
    }
}

impl From<HandshakeError> for DeviceError {
    fn from(err: HandshakeError) -> Self {
        DeviceError::Handshake(err)
    }
}

impl From<CommandError> for DeviceError {
    fn from(err: CommandError) -> Self {
        DeviceError::InvalidCommand(err)
    }
}

impl From<SessionError> for DeviceError {
    fn from(err: SessionError) -> Self {
        DeviceError::Session(err)
    }
}

/// Transport used by [`TapoDevice::connect`].
pub type DefaultTransport = TimeoutTransport<ReqwestTransport>;

/// A single plug or bulb on the local network.
///
/// # Guarantees
/// * Every state change is confirmed against `get_device_info` before it is
///   reported as applied.
/// * Unconfirmed commands are retried and the session re-established per the
///   configured retry policy; no method panics on network failure.
#[derive(Debug)]
pub struct TapoDevice<T = DefaultTransport, R = OsRng> {
    executor: CommandExecutor<T, R>,
}

impl TapoDevice<DefaultTransport, OsRng> {
    /// Connects to the device at `address` over plain HTTP.
    ///
    /// # Errors
    /// Returns `DeviceError::Config` for invalid configuration,
    /// `DeviceError::Transport` if the HTTP client cannot be built, and
    /// `DeviceError::Handshake` when the device rejects the session.
    pub async fn connect(
        address: &str,
        username: &str,
        password: &str,
        config: SessionConfig,
    ) -> Result<Self, DeviceError> {
        let config = config.validate()?;
        let inner = ReqwestTransport::new(config.timeout())?;
        let transport = TimeoutTransport::new(inner, config.timeout());
        let mut device = Self::with_transport(transport, OsRng, config);
        device
            .begin(address, &Credentials::new(username, password))
            .await?;
        Ok(device)
    }
}

impl<T, R> TapoDevice<T, R>
where
    T: HttpTransport,
    R: RngCore + CryptoRng,
{
    /// Wraps an arbitrary transport; call [`TapoDevice::begin`] before use.
    pub fn with_transport(transport: T, rng: R, config: SessionConfig) -> Self {
        let session = TapoSession::with_rng(transport, rng, config);
        Self {
            executor: CommandExecutor::new(session),
        }
    }

    /// Runs the initial handshake.
    pub async fn begin(
        &mut self,
        address: &str,
        credentials: &Credentials,
    ) -> Result<(), DeviceError> {
        self.executor
            .session_mut()
            .handshake(address, credentials)
            .await
            .map_err(DeviceError::from)
    }

    pub fn session(&self) -> &TapoSession<T, R> {
        self.executor.session()
    }

    pub fn executor_mut(&mut self) -> &mut CommandExecutor<T, R> {
        &mut self.executor
    }

    /// Sends `command` and waits for the device to confirm it.
    pub async fn apply(&mut self, command: DeviceCommand) -> Result<(), DeviceError> {
        command.validate()?;
        let expected = command.expected_state();
        if self
            .executor
            .execute(&command.request(), Some(&expected))
            .await
        {
            Ok(())
        } else {
            warn!(?command, "device did not confirm command");
            Err(DeviceError::Unconfirmed(command))
        }
    }

    pub async fn on(&mut self) -> Result<(), DeviceError> {
        self.apply(DeviceCommand::On).await
    }

    pub async fn off(&mut self) -> Result<(), DeviceError> {
        self.apply(DeviceCommand::Off).await
    }

    /// Brightness in percent, 1..=100.
    pub async fn set_brightness(&mut self, level: u8) -> Result<(), DeviceError> {
        self.apply(DeviceCommand::Brightness(level)).await
    }

    /// Hue in degrees (0..=360) and saturation in percent (0..=100).
    pub async fn set_color(&mut self, hue: u16, saturation: u8) -> Result<(), DeviceError> {
        self.apply(DeviceCommand::Color { hue, saturation }).await
    }

    pub async fn set_hue_saturation(
        &mut self,
        hue: u16,
        saturation: u8,
    ) -> Result<(), DeviceError> {
        self.set_color(hue, saturation).await
    }

    /// White colour temperature in Kelvin.
    pub async fn set_color_temperature(&mut self, kelvin: u16) -> Result<(), DeviceError> {
        self.apply(DeviceCommand::ColorTemperature(kelvin)).await
    }

    /// Reads the current device state (the `result` object of the reply).
    ///
    /// A single attempt: failures are reported rather than retried.
    pub async fn device_info(&mut self) -> Result<Value, DeviceError> {
        let session = self.executor.session_mut();
        if !session.has_established() {
            return Err(DeviceError::Session(SessionError::NotEstablished));
        }
        let reply = session.send_message(&device_info_request()).await?;
        parse_device_info(&reply)
    }
}

fn parse_device_info(reply: &str) -> Result<Value, DeviceError> {
    let mut value: Value =
        serde_json::from_str(reply).map_err(|e| DeviceError::Decode(e.to_string()))?;
    match value.get("error_code").and_then(Value::as_i64) {
        Some(0) | None => {}
        Some(code) => return Err(DeviceError::Device(code)),
    }
    match value.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(DeviceError::Decode("reply has no result".into())),
    }
}
