//! Packet-forwarder radio
//!
//! Emulates the device's radio by acting as a Semtech UDP gateway: every
//! frame the device would put on the air is wrapped into a PUSH_DATA rxpk
//! and sent to a network server (or a bridge such as `uplink-verify`).
//! A matching PUSH_ACK within the timeout counts as delivery.
//!
//! Join here means "JoinRequest acknowledged by the forwarder endpoint";
//! the bench server hands out a static DevAddr instead of a JoinAccept.

pub mod protocol;

use std::time::Duration;

use base64::Engine;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::config::GwmpRadioConfig;
use crate::lorawan::encoder::{build_join_request, UplinkBuilder};
use crate::lorawan::keys::join_request_mic;
use crate::lorawan::{decode_fixed, DeviceIdentity};
use crate::radio::{DeliveryMode, Radio, RadioError};
use protocol::{GatewayEui, GwmpPacket, PushDataPayload, Rxpk};

/// EU868 channel 0
const UPLINK_FREQ_MHZ: f64 = 868.1;
const UPLINK_DATR: &str = "SF7BW125";

pub struct GwmpRadio {
    server: String,
    gateway_eui: GatewayEui,
    dev_addr: u32,
    ack_timeout: Duration,
    socket: Option<UdpSocket>,
    token: u16,
    dev_nonce: u16,
    fcnt: u16,
    adr: bool,
    joined: bool,
}

impl GwmpRadio {
    pub fn from_config(config: &GwmpRadioConfig) -> anyhow::Result<Self> {
        let dev_addr: [u8; 4] = decode_fixed(&config.dev_addr, "radio.gwmp.dev_addr")?;
        Ok(Self {
            server: config.server.clone(),
            gateway_eui: decode_fixed(&config.gateway_eui, "radio.gwmp.gateway_eui")?,
            dev_addr: u32::from_be_bytes(dev_addr),
            ack_timeout: Duration::from_millis(config.ack_timeout_ms),
            socket: None,
            token: 0,
            dev_nonce: 0,
            fcnt: 0,
            adr: false,
            joined: false,
        })
    }

    /// Wrap a PHY payload into PUSH_DATA and wait for its PUSH_ACK
    async fn push(&mut self, phy: &[u8]) -> Result<(), RadioError> {
        let socket = self.socket.as_ref().ok_or(RadioError::NotStarted)?;

        self.token = self.token.wrapping_add(1);
        let token = self.token;

        let now = chrono::Utc::now();
        let rxpk = Rxpk {
            time: Some(now.to_rfc3339()),
            tmst: Some(now.timestamp_subsec_micros()),
            freq: UPLINK_FREQ_MHZ,
            lsnr: Some(9.0),
            rssi: -60.0,
            modu: Some("LORA".to_string()),
            datr: UPLINK_DATR.to_string(),
            codr: Some("4/5".to_string()),
            size: phy.len() as u16,
            data: base64::engine::general_purpose::STANDARD.encode(phy),
        };
        let payload = PushDataPayload {
            rxpk: Some(vec![rxpk]),
            stat: None,
        };
        let datagram = GwmpPacket::push_data(token, &self.gateway_eui, &payload)
            .map_err(|e| RadioError::Protocol(e.to_string()))?;

        socket.send(&datagram).await?;
        debug!("PUSH_DATA sent to {} (token: 0x{:04x})", self.server, token);

        tokio::time::timeout(self.ack_timeout, wait_for_ack(socket, token))
            .await
            .map_err(|_| RadioError::Timeout)?
    }
}

async fn wait_for_ack(socket: &UdpSocket, token: u16) -> Result<(), RadioError> {
    let mut buf = [0u8; 64];
    loop {
        let len = socket.recv(&mut buf).await?;
        match GwmpPacket::parse(&buf[..len]) {
            Ok(GwmpPacket::PushAck { random_token }) if random_token == token => return Ok(()),
            Ok(other) => debug!("Ignoring {:?} while waiting for token 0x{:04x}", other, token),
            Err(e) => warn!("Failed to parse GWMP packet from server: {}", e),
        }
    }
}

impl Radio for GwmpRadio {
    async fn start(&mut self) -> Result<(), RadioError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(self.server.as_str()).await?;
        info!(
            "GWMP radio up: gateway {} -> {}",
            hex::encode(self.gateway_eui),
            self.server
        );
        self.socket = Some(socket);
        Ok(())
    }

    fn enable_adaptive_rate(&mut self, enabled: bool) {
        self.adr = enabled;
    }

    async fn join(&mut self, identity: &DeviceIdentity) -> Result<(), RadioError> {
        let dev_nonce = self.dev_nonce;
        self.dev_nonce = self.dev_nonce.wrapping_add(1);

        let mic = join_request_mic(identity, dev_nonce);
        let phy = build_join_request(identity, dev_nonce, mic);
        self.push(&phy).await?;

        self.joined = true;
        info!(
            "JoinRequest acknowledged (DevNonce={}), DevAddr={:08X}",
            dev_nonce, self.dev_addr
        );
        Ok(())
    }

    async fn send(&mut self, port: u8, payload: &[u8], mode: DeliveryMode) -> Result<(), RadioError> {
        if !self.joined {
            return Err(RadioError::NotJoined);
        }

        let fcnt = self.fcnt;
        self.fcnt = self.fcnt.wrapping_add(1);

        let phy = UplinkBuilder::new(
            mode == DeliveryMode::Confirmed,
            self.dev_addr,
            fcnt,
            port,
            payload.to_vec(),
        )
        .with_adr(self.adr)
        .build();

        self.push(&phy).await
    }
}
