//! OTAA join supervision
//!
//! Drives a bounded number of join attempts with a fixed delay between
//! them. There is no backoff and no jitter: attempt N+1 starts exactly one
//! `retry_delay` after attempt N failed. The "timeout" reported on failure
//! is the exhausted attempt budget, not a wall-clock deadline.

use std::num::NonZeroU32;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::DeviceIdentity;
use crate::radio::{Radio, RadioError};
use crate::sleep::Sleeper;

/// Progress of one supervisor run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    /// About to make attempt `n` (1-based)
    Attempting(u32),
    Succeeded,
    Exhausted,
}

impl JoinState {
    pub fn start() -> Self {
        JoinState::Attempting(1)
    }

    /// Transition after the current attempt finished. Terminal states are absorbing.
    pub fn advance(self, joined: bool, max_retries: NonZeroU32) -> Self {
        match self {
            JoinState::Attempting(_) if joined => JoinState::Succeeded,
            JoinState::Attempting(n) if n < max_retries.get() => JoinState::Attempting(n + 1),
            JoinState::Attempting(_) => JoinState::Exhausted,
            terminal => terminal,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, JoinState::Attempting(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPolicy {
    pub max_retries: NonZeroU32,
    pub retry_delay: Duration,
    pub adaptive_rate: bool,
}

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("join timed out after {attempts} attempts (last error: {last})")]
    Exhausted { attempts: u32, last: RadioError },
}

impl JoinError {
    /// Timeout-class code, whatever the last attempt reported
    pub fn code(&self) -> i32 {
        RadioError::Timeout.code()
    }
}

pub struct JoinSupervisor<S> {
    policy: JoinPolicy,
    sleeper: S,
}

impl<S: Sleeper> JoinSupervisor<S> {
    pub fn new(policy: JoinPolicy, sleeper: S) -> Self {
        Self { policy, sleeper }
    }

    /// Run the join sequence to success or exhaustion.
    ///
    /// Adaptive rate is configured once before the first attempt. On
    /// success the remaining budget is discarded.
    pub async fn run<R: Radio>(
        &self,
        radio: &mut R,
        identity: &DeviceIdentity,
    ) -> Result<(), JoinError> {
        let max = self.policy.max_retries;
        radio.enable_adaptive_rate(self.policy.adaptive_rate);

        let mut state = JoinState::start();
        let mut last_error = None;

        while let JoinState::Attempting(attempt) = state {
            info!("LoRaWAN join attempt {}/{}", attempt, max);

            let result = radio.join(identity).await;
            state = state.advance(result.is_ok(), max);

            if let Err(e) = result {
                if state.is_terminal() {
                    warn!("Join failed ({}): {}, no attempts left", e.code(), e);
                } else {
                    warn!(
                        "Join failed ({}): {}, retry in {} ms...",
                        e.code(),
                        e,
                        self.policy.retry_delay.as_millis()
                    );
                    self.sleeper.sleep(self.policy.retry_delay).await;
                }
                last_error = Some(e);
            }
        }

        match state {
            JoinState::Succeeded => {
                info!("LoRaWAN join successful");
                Ok(())
            }
            _ => Err(JoinError::Exhausted {
                attempts: max.get(),
                last: last_error.unwrap_or(RadioError::Timeout),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::sim::SimulatedRadio;
    use crate::sleep::RecordingSleeper;

    fn retries(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    fn policy(max: u32) -> JoinPolicy {
        JoinPolicy {
            max_retries: retries(max),
            retry_delay: Duration::from_millis(60_000),
            adaptive_rate: true,
        }
    }

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new([1; 8], [2; 8], [3; 16])
    }

    #[test]
    fn test_transitions() {
        let max = retries(3);
        let s = JoinState::start();
        assert_eq!(s, JoinState::Attempting(1));
        assert_eq!(s.advance(false, max), JoinState::Attempting(2));
        assert_eq!(s.advance(true, max), JoinState::Succeeded);
        assert_eq!(JoinState::Attempting(3).advance(false, max), JoinState::Exhausted);
        assert_eq!(JoinState::Attempting(3).advance(true, max), JoinState::Succeeded);
        assert_eq!(JoinState::Exhausted.advance(true, max), JoinState::Exhausted);
        assert_eq!(JoinState::Succeeded.advance(false, max), JoinState::Succeeded);
    }

    #[test]
    fn test_single_attempt_budget() {
        assert_eq!(JoinState::start().advance(false, retries(1)), JoinState::Exhausted);
    }

    #[tokio::test]
    async fn test_exhaustion_calls_join_max_times_and_sleeps_one_less() {
        for max in 1..=5 {
            let mut radio = SimulatedRadio::new(u32::MAX);
            radio.start().await.unwrap();
            let sleeper = RecordingSleeper::new();
            let supervisor = JoinSupervisor::new(policy(max), sleeper.clone());

            let err = supervisor.run(&mut radio, &identity()).await.unwrap_err();
            let JoinError::Exhausted { attempts, last } = &err;
            assert_eq!(*attempts, max);
            assert!(matches!(last, RadioError::Timeout));
            assert_eq!(err.code(), -110);
            assert_eq!(radio.join_attempts(), max);
            assert_eq!(sleeper.calls().len(), (max - 1) as usize);
            assert!(sleeper
                .calls()
                .iter()
                .all(|d| *d == Duration::from_millis(60_000)));
        }
    }

    #[tokio::test]
    async fn test_success_on_attempt_k_stops_there() {
        for k in 1..=4 {
            let mut radio = SimulatedRadio::new(k - 1);
            radio.start().await.unwrap();
            let sleeper = RecordingSleeper::new();
            let supervisor = JoinSupervisor::new(policy(4), sleeper.clone());

            supervisor.run(&mut radio, &identity()).await.unwrap();
            assert_eq!(radio.join_attempts(), k);
            assert_eq!(sleeper.calls().len(), (k - 1) as usize);
        }
    }

    #[tokio::test]
    async fn test_adaptive_rate_applied_before_joining() {
        let mut radio = SimulatedRadio::new(0);
        radio.start().await.unwrap();
        let supervisor = JoinSupervisor::new(policy(1), RecordingSleeper::new());
        supervisor.run(&mut radio, &identity()).await.unwrap();

        radio
            .send(1, b"ping", crate::radio::DeliveryMode::Unconfirmed)
            .await
            .unwrap();
        assert!(radio.sent()[0].adr);
    }
}
