//! Uplink verifier
//!
//! Listens as a Semtech UDP packet-forwarder endpoint, ACKs every
//! PUSH_DATA, decodes the LoRaWAN uplinks inside and checks the
//! authenticated `data#tag` frame each data uplink carries.
//!
//! Usage: cargo run --bin uplink-verify -- --bind 0.0.0.0:1680 --key <passphrase>

use std::net::SocketAddr;
use std::path::PathBuf;

use base64::Engine;
use clap::Parser;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use lora_sentinel::config::Config;
use lora_sentinel::lorawan::{self, LoRaWANFrame};
use lora_sentinel::payload::{verify_frame, SharedKey};
use lora_sentinel::udp::protocol::{GwmpPacket, PushDataPayload};

#[derive(Parser)]
#[command(name = "uplink-verify")]
#[command(about = "Verify HMAC-authenticated telemetry uplinks from a GWMP forwarder")]
#[command(version)]
struct Cli {
    /// UDP address to listen on
    #[arg(short, long, default_value = "0.0.0.0:1680")]
    bind: String,

    /// Shared key passphrase (overrides the config file)
    #[arg(short, long)]
    key: Option<String>,

    /// Config file to take security.hmac_key from
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_exists = cli.config.exists();
    let config = Config::load_or_default(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    if !config_exists {
        warn!("Config file {:?} not found, using default configuration", cli.config);
    }

    let key = match cli.key {
        Some(passphrase) => SharedKey::from_passphrase(passphrase.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid --key: {}", e))?,
        None => config.shared_key()?,
    };

    let socket = UdpSocket::bind(&cli.bind).await?;
    info!("uplink-verify listening on {}", cli.bind);

    let mut buf = vec![0u8; 65535];
    loop {
        let (len, src) = socket.recv_from(&mut buf).await?;
        debug!("Received {} bytes from {}", len, src);

        match GwmpPacket::parse(&buf[..len]) {
            Ok(packet) => handle_packet(&socket, src, packet, &key).await,
            Err(e) => warn!("Failed to parse GWMP packet from {}: {}", src, e),
        }
    }
}

async fn handle_packet(socket: &UdpSocket, src: SocketAddr, packet: GwmpPacket, key: &SharedKey) {
    match packet {
        GwmpPacket::PushData {
            random_token,
            gateway_eui,
            json_payload,
        } => {
            info!(
                "PUSH_DATA from gateway {} (token: 0x{:04x})",
                hex::encode(gateway_eui),
                random_token
            );

            let ack = GwmpPacket::push_ack(random_token);
            if let Err(e) = socket.send_to(&ack, src).await {
                error!("Failed to send PUSH_ACK to {}: {}", src, e);
            }

            let payload = match serde_json::from_str::<PushDataPayload>(&json_payload) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to parse PUSH_DATA JSON: {}", e);
                    debug!("  Raw JSON: {}", json_payload);
                    return;
                }
            };

            for rxpk in payload.rxpk.unwrap_or_default() {
                let phy = match base64::engine::general_purpose::STANDARD.decode(&rxpk.data) {
                    Ok(phy) => phy,
                    Err(e) => {
                        warn!("  Failed to base64 decode rxpk data: {}", e);
                        continue;
                    }
                };
                match lorawan::decode_phy_payload(&phy) {
                    Ok(frame) => {
                        info!("  LoRaWAN: {}", frame);
                        check_uplink(&frame, key);
                    }
                    Err(e) => warn!("  Failed to decode LoRaWAN frame: {}", e),
                }
            }
        }
        GwmpPacket::PullData {
            random_token,
            gateway_eui,
        } => {
            debug!(
                "PULL_DATA from gateway {} (token: 0x{:04x})",
                hex::encode(gateway_eui),
                random_token
            );
            let ack = GwmpPacket::pull_ack(random_token);
            if let Err(e) = socket.send_to(&ack, src).await {
                error!("Failed to send PULL_ACK to {}: {}", src, e);
            }
        }
        GwmpPacket::PushAck { random_token } => {
            debug!("PUSH_ACK (token: 0x{:04x})", random_token);
        }
    }
}

fn check_uplink(frame: &LoRaWANFrame, key: &SharedKey) {
    let LoRaWANFrame::Data {
        dev_addr,
        fcnt,
        frm_payload,
        ..
    } = frame
    else {
        return;
    };

    match verify_frame(frm_payload, key) {
        Ok(reading) => info!(
            "  VERIFIED DevAddr={:08X} FCnt={}: Temp={:.1} C, Hum={:.1} %RH",
            dev_addr, fcnt, reading.temperature, reading.humidity
        ),
        Err(e) => warn!("  REJECTED DevAddr={:08X} FCnt={}: {}", dev_addr, fcnt, e),
    }
}

