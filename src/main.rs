use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lora_sentinel::agent::{Agent, AgentSettings};
use lora_sentinel::config::{self, RadioMode};
use lora_sentinel::lorawan::join::JoinPolicy;
use lora_sentinel::radio::sim::SimulatedRadio;
use lora_sentinel::radio::Radio;
use lora_sentinel::sensor::{DemoSensor, Xorshift32};
use lora_sentinel::sleep::TokioSleeper;

#[derive(Parser)]
#[command(name = "lora-sentinel")]
#[command(about = "LoRaWAN field-device agent with HMAC-authenticated telemetry")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Stop after this many telemetry cycles (default: run forever)
    #[arg(long)]
    cycles: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_exists = cli.config.exists();
    let config = config::Config::load_or_default(&cli.config)?;

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    if !config_exists {
        warn!("Config file {:?} not found, using default configuration", cli.config);
    }

    info!("=== lora-sentinel v{} start ===", env!("CARGO_PKG_VERSION"));

    let settings = AgentSettings {
        app_port: config.lorawan.app_port,
        delivery: config.lorawan.delivery_mode(),
        tx_interval: config.lorawan.tx_interval(),
        join: JoinPolicy {
            max_retries: NonZeroU32::new(config.lorawan.join_max_retries)
                .ok_or_else(|| anyhow::anyhow!("lorawan.join_max_retries must be at least 1"))?,
            retry_delay: config.lorawan.join_retry_interval(),
            adaptive_rate: config.lorawan.adr,
        },
    };

    match config.radio.mode {
        RadioMode::Simulated => {
            let sim = &config.radio.simulated;
            info!(
                "Using simulated radio ({} failing join attempts)",
                sim.join_failures
            );
            let radio = SimulatedRadio::new(sim.join_failures)
                .with_join_latency(Duration::from_millis(sim.join_latency_ms));
            run_agent(radio, &config, settings, cli.cycles).await
        }
        #[cfg(feature = "gwmp")]
        RadioMode::Gwmp => {
            let gwmp = config
                .radio
                .gwmp
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("radio.mode = \"gwmp\" needs [radio.gwmp]"))?;
            let radio = lora_sentinel::udp::GwmpRadio::from_config(gwmp)?;
            run_agent(radio, &config, settings, cli.cycles).await
        }
        #[cfg(not(feature = "gwmp"))]
        RadioMode::Gwmp => Err(anyhow::anyhow!(
            "radio.mode = \"gwmp\" but the gwmp feature is not enabled"
        )),
    }
}

async fn run_agent<R: Radio>(
    radio: R,
    config: &config::Config,
    settings: AgentSettings,
    cycles: Option<u64>,
) -> anyhow::Result<()> {
    let mut agent = Agent::new(
        radio,
        TokioSleeper,
        DemoSensor::new(Xorshift32::from_clock()),
        config.identity()?,
        config.shared_key()?,
        settings,
    );

    match agent.run(cycles).await {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("Agent stopped ({}): {}", e.code(), e);
            Err(e.into())
        }
    }
}
