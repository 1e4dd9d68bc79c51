//! Network-side check of authenticated frames

use hmac::Mac;
use thiserror::Error;

use super::{
    HmacSha256, SensorReading, SharedKey, DATA_PART_MAX_SIZE, HMAC_HEX_SIZE, PAYLOAD_MAX_SIZE,
    TAG_DELIMITER,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
    #[error("authentication tag does not match")]
    BadTag,
}

/// Check a received frame against `key` and return the reading it carries.
///
/// The tag comparison is constant-time.
pub fn verify_frame(frame: &[u8], key: &SharedKey) -> Result<SensorReading, VerifyError> {
    if frame.len() >= PAYLOAD_MAX_SIZE {
        return Err(VerifyError::Malformed("frame too long"));
    }
    let text = std::str::from_utf8(frame).map_err(|_| VerifyError::Malformed("not ASCII"))?;
    let (data, tag) = text
        .rsplit_once(TAG_DELIMITER)
        .ok_or(VerifyError::Malformed("missing '#' delimiter"))?;

    if tag.len() != HMAC_HEX_SIZE || !tag.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(VerifyError::Malformed("tag is not 64 lowercase hex characters"));
    }
    let reading =
        parse_canonical(data).ok_or(VerifyError::Malformed("data part is not T:x.x,H:x.x"))?;

    let expected = hex::decode(tag).map_err(|_| VerifyError::Malformed("tag is not hex"))?;
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).map_err(|_| VerifyError::BadTag)?;
    mac.update(data.as_bytes());
    mac.verify_slice(&expected).map_err(|_| VerifyError::BadTag)?;

    Ok(reading)
}

/// Parse `T:<-?digits>.<digit>,H:<digits>.<digit>`, strictly, within the
/// same 31-byte bound the builder enforces
pub fn parse_canonical(data: &str) -> Option<SensorReading> {
    if data.len() >= DATA_PART_MAX_SIZE {
        return None;
    }
    let rest = data.strip_prefix("T:")?;
    let (temperature, humidity) = rest.split_once(",H:")?;

    let unsigned = temperature.strip_prefix('-').unwrap_or(temperature);
    if !is_one_decimal(unsigned) || !is_one_decimal(humidity) {
        return None;
    }

    Some(SensorReading {
        temperature: temperature.parse().ok()?,
        humidity: humidity.parse().ok()?,
    })
}

fn is_one_decimal(s: &str) -> bool {
    match s.split_once('.') {
        Some((int, frac)) => {
            !int.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.len() == 1
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}
