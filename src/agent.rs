//! The device control loop
//!
//! start radio -> join (supervised) -> forever { read, build frame, send, wait }
//!
//! A radio that will not start, or a join budget that runs out, stops the
//! agent. A frame that cannot be built or sent only costs that one cycle.

use std::time::Duration;

use thiserror::Error;
use tracing::{error, info};

use crate::lorawan::join::{JoinError, JoinPolicy, JoinSupervisor};
use crate::lorawan::DeviceIdentity;
use crate::payload::{build_frame, PayloadError, SensorReading, SharedKey};
use crate::radio::{submit_uplink, DeliveryMode, Radio, RadioError};
use crate::sensor::DemoSensor;
use crate::sleep::Sleeper;

/// Fixed-at-startup behavior of the agent
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub app_port: u8,
    pub delivery: DeliveryMode,
    pub tx_interval: Duration,
    pub join: JoinPolicy,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("radio start failed: {0}")]
    Start(#[source] RadioError),
    #[error("join failed permanently: {0}")]
    Join(#[from] JoinError),
}

impl AgentError {
    pub fn code(&self) -> i32 {
        match self {
            AgentError::Start(e) => e.code(),
            AgentError::Join(e) => e.code(),
        }
    }
}

pub trait ReadingSource {
    fn read(&mut self) -> SensorReading;
}

impl ReadingSource for DemoSensor {
    fn read(&mut self) -> SensorReading {
        DemoSensor::read(self)
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    Sent { len: usize },
    BuildFailed(PayloadError),
    SendFailed(RadioError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub sent: u64,
    pub build_failed: u64,
    pub send_failed: u64,
}

impl CycleStats {
    fn record(&mut self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Sent { .. } => self.sent += 1,
            CycleOutcome::BuildFailed(_) => self.build_failed += 1,
            CycleOutcome::SendFailed(_) => self.send_failed += 1,
        }
    }
}

pub struct Agent<R, S, Src> {
    radio: R,
    sleeper: S,
    source: Src,
    identity: DeviceIdentity,
    key: SharedKey,
    settings: AgentSettings,
    stats: CycleStats,
}

impl<R, S, Src> Agent<R, S, Src>
where
    R: Radio,
    S: Sleeper + Clone,
    Src: ReadingSource,
{
    pub fn new(
        radio: R,
        sleeper: S,
        source: Src,
        identity: DeviceIdentity,
        key: SharedKey,
        settings: AgentSettings,
    ) -> Self {
        Self {
            radio,
            sleeper,
            source,
            identity,
            key,
            settings,
            stats: CycleStats::default(),
        }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    /// Start the radio and run the join supervisor once
    pub async fn connect(&mut self) -> Result<(), AgentError> {
        self.radio.start().await.map_err(|e| {
            error!("Radio start failed: {}", e.code());
            AgentError::Start(e)
        })?;

        let supervisor = JoinSupervisor::new(self.settings.join, self.sleeper.clone());
        supervisor
            .run(&mut self.radio, &self.identity)
            .await
            .map_err(|e| {
                error!("Join failed permanently: {}", e);
                AgentError::from(e)
            })?;

        info!("Joined OK. send loop starting...");
        Ok(())
    }

    /// One telemetry cycle, without the trailing wait
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let reading = self.source.read();
        info!(
            "Temp={:.1} C, Hum={:.1} %RH",
            reading.temperature, reading.humidity
        );

        let outcome = match build_frame(&reading, &self.key) {
            Err(e) => {
                error!("Payload creation failed: {}", e);
                CycleOutcome::BuildFailed(e)
            }
            Ok(frame) => {
                info!("PayloadStr ({} bytes): {}", frame.len(), frame);
                match submit_uplink(
                    &mut self.radio,
                    self.settings.app_port,
                    frame.as_bytes(),
                    self.settings.delivery,
                )
                .await
                {
                    Ok(()) => {
                        info!(
                            "Uplink sent ({}), port={}",
                            self.settings.delivery, self.settings.app_port
                        );
                        CycleOutcome::Sent { len: frame.len() }
                    }
                    Err(e) => {
                        error!("Uplink send failed ({}): {}", e.code(), e);
                        CycleOutcome::SendFailed(e)
                    }
                }
            }
        };

        self.stats.record(&outcome);
        outcome
    }

    /// Connect, then run telemetry cycles. `None` runs forever.
    ///
    /// With a cycle bound the wait after the final cycle is skipped.
    pub async fn run(&mut self, cycles: Option<u64>) -> Result<CycleStats, AgentError> {
        self.connect().await?;

        let mut done = 0u64;
        loop {
            if cycles.is_some_and(|limit| done >= limit) {
                info!(
                    "Completed {} cycles: {} sent, {} build failures, {} send failures",
                    done, self.stats.sent, self.stats.build_failed, self.stats.send_failed
                );
                return Ok(self.stats);
            }
            if done > 0 {
                self.sleeper.sleep(self.settings.tx_interval).await;
            }

            self.run_cycle().await;
            done += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::sim::SimulatedRadio;
    use crate::sensor::Xorshift32;
    use crate::sleep::RecordingSleeper;
    use std::num::NonZeroU32;

    fn settings(max_retries: u32) -> AgentSettings {
        AgentSettings {
            app_port: 1,
            delivery: DeliveryMode::Confirmed,
            tx_interval: Duration::from_secs(60),
            join: JoinPolicy {
                max_retries: NonZeroU32::new(max_retries).unwrap(),
                retry_delay: Duration::from_millis(500),
                adaptive_rate: true,
            },
        }
    }

    fn agent(
        join_failures: u32,
        max_retries: u32,
    ) -> (Agent<SimulatedRadio, RecordingSleeper, DemoSensor>, RecordingSleeper) {
        let sleeper = RecordingSleeper::new();
        let agent = Agent::new(
            SimulatedRadio::new(join_failures),
            sleeper.clone(),
            DemoSensor::new(Xorshift32::new(42)),
            DeviceIdentity::new([1; 8], [2; 8], [3; 16]),
            SharedKey::from_passphrase(b"bench-key").unwrap(),
            settings(max_retries),
        );
        (agent, sleeper)
    }

    #[tokio::test]
    async fn test_bounded_run_sends_each_cycle() {
        let (mut agent, sleeper) = agent(1, 3);
        let stats = agent.run(Some(3)).await.unwrap();

        assert_eq!(stats.sent, 3);
        assert_eq!(agent.radio().sent().len(), 3);
        assert_eq!(
            sleeper.calls(),
            vec![
                Duration::from_millis(500),
                Duration::from_secs(60),
                Duration::from_secs(60),
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_cycles_joins_but_sends_nothing() {
        let (mut agent, sleeper) = agent(0, 3);
        let stats = agent.run(Some(0)).await.unwrap();

        assert_eq!(stats, CycleStats::default());
        assert!(agent.radio().sent().is_empty());
        assert_eq!(agent.radio().join_attempts(), 1);
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn test_single_cycle_does_not_wait() {
        let (mut agent, sleeper) = agent(0, 3);
        let stats = agent.run(Some(1)).await.unwrap();

        assert_eq!(stats.sent, 1);
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn test_join_exhaustion_stops_before_telemetry() {
        let (mut agent, _) = agent(u32::MAX, 2);
        let err = agent.run(Some(3)).await.unwrap_err();

        assert!(matches!(err, AgentError::Join(_)));
        assert_eq!(err.code(), -110);
        assert!(agent.radio().sent().is_empty());
        assert_eq!(agent.radio().join_attempts(), 2);
    }
}
