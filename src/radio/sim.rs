//! In-process radio used when no packet forwarder is configured

use std::time::Duration;

use tracing::{debug, info};

use super::{DeliveryMode, Radio, RadioError};
use crate::lorawan::DeviceIdentity;

/// An uplink the simulated radio accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentUplink {
    pub port: u8,
    pub payload: Vec<u8>,
    pub mode: DeliveryMode,
    pub adr: bool,
}

/// Radio that fails the first `join_failures` joins, then accepts everything
#[derive(Debug, Default)]
pub struct SimulatedRadio {
    join_failures: u32,
    join_latency: Duration,
    started: bool,
    joined: bool,
    adr: bool,
    join_attempts: u32,
    sent: Vec<SentUplink>,
}

impl SimulatedRadio {
    pub fn new(join_failures: u32) -> Self {
        Self {
            join_failures,
            ..Self::default()
        }
    }

    /// Simulated over-the-air time of each join attempt
    pub fn with_join_latency(mut self, latency: Duration) -> Self {
        self.join_latency = latency;
        self
    }

    pub fn join_attempts(&self) -> u32 {
        self.join_attempts
    }

    pub fn sent(&self) -> &[SentUplink] {
        &self.sent
    }
}

impl Radio for SimulatedRadio {
    async fn start(&mut self) -> Result<(), RadioError> {
        self.started = true;
        info!("Simulated radio started");
        Ok(())
    }

    fn enable_adaptive_rate(&mut self, enabled: bool) {
        self.adr = enabled;
    }

    async fn join(&mut self, identity: &DeviceIdentity) -> Result<(), RadioError> {
        if !self.started {
            return Err(RadioError::NotStarted);
        }
        self.join_attempts += 1;
        if !self.join_latency.is_zero() {
            tokio::time::sleep(self.join_latency).await;
        }

        if self.join_attempts <= self.join_failures {
            debug!(
                "Simulated JoinRequest from {} dropped ({}/{})",
                hex::encode(identity.dev_eui),
                self.join_attempts,
                self.join_failures
            );
            return Err(RadioError::Timeout);
        }

        self.joined = true;
        Ok(())
    }

    async fn send(&mut self, port: u8, payload: &[u8], mode: DeliveryMode) -> Result<(), RadioError> {
        if !self.joined {
            return Err(RadioError::NotJoined);
        }
        self.sent.push(SentUplink {
            port,
            payload: payload.to_vec(),
            mode,
            adr: self.adr,
        });
        Ok(())
    }
}
