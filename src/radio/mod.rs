//! Radio / MAC-layer collaborator seen by the agent
//!
//! The agent never touches the air interface directly. Everything it needs
//! from the LoRaWAN stack is the four operations of [`Radio`]. DevNonce
//! allocation, channel plans and duty-cycle limits are the radio's job.

pub mod sim;

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::lorawan::DeviceIdentity;

/// Largest payload the stack's single-byte length field can describe
pub const MAX_UPLINK_LEN: usize = u8::MAX as usize;

/// Uplink delivery mode, fixed by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// At-least-once, requires a network acknowledgment
    Confirmed,
    /// Fire-and-forget
    Unconfirmed,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Confirmed => write!(f, "CONFIRMED"),
            DeliveryMode::Unconfirmed => write!(f, "UNCONFIRMED"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("radio stack not started")]
    NotStarted,
    #[error("device has not joined a network")]
    NotJoined,
    #[error("no response from network")]
    Timeout,
    #[error("stack rejected request (code {0})")]
    Rejected(i32),
    #[error("payload of {0} bytes exceeds the 255-byte uplink limit")]
    PayloadTooLarge(usize),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RadioError {
    /// Negative errno-style code, as a MAC stack would report it
    pub fn code(&self) -> i32 {
        match self {
            RadioError::NotStarted => -19, // ENODEV
            RadioError::NotJoined => -107, // ENOTCONN
            RadioError::Timeout => -110,   // ETIMEDOUT
            RadioError::Rejected(code) => *code,
            RadioError::PayloadTooLarge(_) => -22, // EINVAL
            RadioError::Protocol(_) => -71,        // EPROTO
            RadioError::Io(e) => e.raw_os_error().map(|c| -c).unwrap_or(-5), // EIO
        }
    }
}

/// The LoRaWAN stack operations the agent consumes
#[allow(async_fn_in_trait)]
pub trait Radio {
    /// Bring up the stack. Failure here is fatal to the agent.
    async fn start(&mut self) -> Result<(), RadioError>;

    /// Toggle adaptive data rate for subsequent traffic
    fn enable_adaptive_rate(&mut self, enabled: bool);

    /// One OTAA join attempt. The stack allocates the DevNonce.
    async fn join(&mut self, identity: &DeviceIdentity) -> Result<(), RadioError>;

    /// Transmit one application payload on `port`
    async fn send(&mut self, port: u8, payload: &[u8], mode: DeliveryMode)
        -> Result<(), RadioError>;
}

/// Hand a payload to the radio after the length-field boundary check
pub async fn submit_uplink<R: Radio>(
    radio: &mut R,
    port: u8,
    payload: &[u8],
    mode: DeliveryMode,
) -> Result<(), RadioError> {
    if payload.len() > MAX_UPLINK_LEN {
        return Err(RadioError::PayloadTooLarge(payload.len()));
    }
    debug!("Submitting {} byte uplink on port {} ({})", payload.len(), port, mode);
    radio.send(port, payload, mode).await
}
