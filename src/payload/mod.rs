//! Authenticated telemetry payloads
//!
//! Frame format (ASCII):  `T:<temp>,H:<hum>#<64 lowercase hex>`
//!
//! The tag is HMAC-SHA256 over exactly the bytes before `#`, keyed with
//! the 32-byte shared key. Every intermediate lives in a fixed-capacity
//! buffer; anything that does not fit fails the whole frame.

mod verify;

pub use verify::{parse_canonical, verify_frame, VerifyError};

use std::fmt::{self, Write};

use heapless::String as FixedString;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

pub type HmacSha256 = Hmac<Sha256>;

/// Capacity reserved for the `T:..,H:..` part, terminator slot included
pub const DATA_PART_MAX_SIZE: usize = 32;
pub const HMAC_BIN_SIZE: usize = 32;
pub const HMAC_HEX_SIZE: usize = 2 * HMAC_BIN_SIZE;
/// Frames must stay strictly below this length
pub const PAYLOAD_MAX_SIZE: usize = 128;
pub const KEY_SIZE: usize = 32;
pub const TAG_DELIMITER: char = '#';

pub type DataPart = FixedString<DATA_PART_MAX_SIZE>;

/// One sensor sample, consumed immediately by [`build_frame`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Degrees Celsius
    pub temperature: f32,
    /// Percent relative humidity
    pub humidity: f32,
}

impl SensorReading {
    pub fn new(temperature: f32, humidity: f32) -> Self {
        Self {
            temperature,
            humidity,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("cannot format reading: {0}")]
    Format(&'static str),
    #[error("HMAC-SHA256 computation failed")]
    Auth,
    #[error("{what} does not fit in {limit} bytes")]
    Overflow { what: &'static str, limit: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("shared key is {0} bytes, at most 32 allowed")]
pub struct KeyLengthError(pub usize);

/// HMAC key shared with whoever verifies the frames
///
/// Passed in by the caller rather than baked into the builder so it can
/// come from a secure element or provisioning store.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey([u8; KEY_SIZE]);

impl SharedKey {
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Key from an ASCII passphrase, zero-padded to 32 bytes.
    ///
    /// HMAC pads short keys with zeros itself, so the padded key produces
    /// the same tags as the bare passphrase.
    pub fn from_passphrase(passphrase: &[u8]) -> Result<Self, KeyLengthError> {
        if passphrase.len() > KEY_SIZE {
            return Err(KeyLengthError(passphrase.len()));
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes[..passphrase.len()].copy_from_slice(passphrase);
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(<redacted>)")
    }
}

/// A finished `data#tag` frame. Only ever built whole.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticatedFrame {
    text: FixedString<PAYLOAD_MAX_SIZE>,
    data_len: usize,
}

impl AuthenticatedFrame {
    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Byte length, no terminator
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The canonical `T:..,H:..` part the tag covers
    pub fn data_part(&self) -> &str {
        &self.text.as_str()[..self.data_len]
    }

    pub fn tag(&self) -> &str {
        &self.text.as_str()[self.data_len + 1..]
    }
}

impl fmt::Display for AuthenticatedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for AuthenticatedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthenticatedFrame({:?})", self.text.as_str())
    }
}

/// Build the authenticated frame for one reading
pub fn build_frame(
    reading: &SensorReading,
    key: &SharedKey,
) -> Result<AuthenticatedFrame, PayloadError> {
    build_frame_capped(reading, key, PAYLOAD_MAX_SIZE)
}

/// As [`build_frame`], with the total length required to stay below `limit`
/// (itself clamped to [`PAYLOAD_MAX_SIZE`])
pub fn build_frame_capped(
    reading: &SensorReading,
    key: &SharedKey,
    limit: usize,
) -> Result<AuthenticatedFrame, PayloadError> {
    let limit = limit.min(PAYLOAD_MAX_SIZE);

    let data = canonicalize(reading)?;
    let mac = hmac_sha256(key, data.as_bytes())?;
    let tag = hex_tag(&mac);

    let total = data.len() + 1 + HMAC_HEX_SIZE;
    if total >= limit {
        return Err(PayloadError::Overflow {
            what: "frame",
            limit,
        });
    }

    let overflow = || PayloadError::Overflow {
        what: "frame",
        limit,
    };
    let mut text = FixedString::<PAYLOAD_MAX_SIZE>::new();
    text.push_str(&data).map_err(|_| overflow())?;
    text.push(TAG_DELIMITER).map_err(|_| overflow())?;
    // hex_tag only emits ASCII
    let tag = std::str::from_utf8(&tag).map_err(|_| PayloadError::Format("non-ASCII tag"))?;
    text.push_str(tag).map_err(|_| overflow())?;

    Ok(AuthenticatedFrame {
        text,
        data_len: data.len(),
    })
}

/// Render `T:<temp>,H:<hum>` with one fractional digit each.
///
/// Rust float formatting always uses `.` as the decimal point. Humidity is
/// unsigned on the wire, so negative values are rejected, not clamped.
pub fn canonicalize(reading: &SensorReading) -> Result<DataPart, PayloadError> {
    if !reading.temperature.is_finite() {
        return Err(PayloadError::Format("temperature is not finite"));
    }
    if !reading.humidity.is_finite() {
        return Err(PayloadError::Format("humidity is not finite"));
    }
    if reading.humidity.is_sign_negative() {
        return Err(PayloadError::Format("humidity is negative"));
    }

    let overflow = PayloadError::Overflow {
        what: "data part",
        limit: DATA_PART_MAX_SIZE,
    };
    let mut data = DataPart::new();
    write!(data, "T:{:.1},H:{:.1}", reading.temperature, reading.humidity)
        .map_err(|_| overflow.clone())?;
    // keep the terminator slot free, as the radio side expects
    if data.len() >= DATA_PART_MAX_SIZE {
        return Err(overflow);
    }
    Ok(data)
}

pub fn hmac_sha256(key: &SharedKey, data: &[u8]) -> Result<[u8; HMAC_BIN_SIZE], PayloadError> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).map_err(|_| PayloadError::Auth)?;
    mac.update(data);
    let mut out = [0u8; HMAC_BIN_SIZE];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Lowercase hex, high nibble first. Sized by type, so it cannot come up short.
pub fn hex_tag(mac: &[u8; HMAC_BIN_SIZE]) -> [u8; HMAC_HEX_SIZE] {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = [0u8; HMAC_HEX_SIZE];
    for (i, byte) in mac.iter().enumerate() {
        out[2 * i] = DIGITS[(byte >> 4) as usize];
        out[2 * i + 1] = DIGITS[(byte & 0x0F) as usize];
    }
    out
}
