//! Demo sensor source
//!
//! Produces plausible temperature/humidity values from a xorshift32
//! generator. Not cryptographic and not part of the authenticated path.

use crate::payload::SensorReading;

/// Used when the seed source hands back zero, which xorshift cannot leave
const FALLBACK_SEED: u32 = 0xA5A5_A5A5;

pub const TEMPERATURE_RANGE: (f32, f32) = (-10.0, 40.0);
pub const HUMIDITY_RANGE: (f32, f32) = (10.0, 95.0);

#[derive(Debug, Clone)]
pub struct Xorshift32 {
    state: u32,
}

impl Xorshift32 {
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { FALLBACK_SEED } else { seed },
        }
    }

    /// Seed from the wall clock's sub-second ticks
    pub fn from_clock() -> Self {
        let now = chrono::Utc::now();
        let ticks = now.timestamp_subsec_nanos() ^ (now.timestamp() as u32);
        Self::new(ticks)
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform value in `[min, max]`, rounded to one decimal place
    pub fn range_1dp(&mut self, min: f32, max: f32) -> f32 {
        let u = self.next_u32() as f32 / u32::MAX as f32;
        round_1dp(min + u * (max - min))
    }
}

/// Add half a step and truncate toward zero, as the device firmware does.
/// Negative values therefore round up: -1.27 becomes -1.2.
pub fn round_1dp(v: f32) -> f32 {
    ((v * 10.0 + 0.5) as i32) as f32 / 10.0
}

/// Reading generator owned by the agent loop
#[derive(Debug, Clone)]
pub struct DemoSensor {
    rng: Xorshift32,
}

impl DemoSensor {
    pub fn new(rng: Xorshift32) -> Self {
        Self { rng }
    }

    pub fn read(&mut self) -> SensorReading {
        SensorReading {
            temperature: self.rng.range_1dp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1),
            humidity: self.rng.range_1dp(HUMIDITY_RANGE.0, HUMIDITY_RANGE.1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xorshift_known_sequence() {
        let mut rng = Xorshift32::new(1);
        assert_eq!(rng.next_u32(), 270369);
        assert_eq!(rng.next_u32(), 67634689);
    }

    #[test]
    fn test_zero_seed_replaced() {
        let mut rng = Xorshift32::new(0);
        assert_ne!(rng.next_u32(), 0);
    }

    #[test]
    fn test_round_1dp_truncates_toward_zero() {
        assert_eq!(round_1dp(23.46), 23.5);
        assert_eq!(round_1dp(23.44), 23.4);
        assert_eq!(round_1dp(-1.27), -1.2);
        assert_eq!(round_1dp(-1.33), -1.2);
        assert_eq!(round_1dp(-0.04), 0.0);
    }

    #[test]
    fn test_readings_stay_in_range() {
        let mut sensor = DemoSensor::new(Xorshift32::new(0xDEAD_BEEF));
        for _ in 0..1000 {
            let r = sensor.read();
            assert!((TEMPERATURE_RANGE.0..=TEMPERATURE_RANGE.1).contains(&r.temperature));
            assert!((HUMIDITY_RANGE.0..=HUMIDITY_RANGE.1).contains(&r.humidity));
        }
    }
}
