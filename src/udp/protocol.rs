//! Semtech UDP Packet Forwarder Protocol (GWMP)
//!
//! Reference: https://github.com/Lora-net/packet_forwarder/blob/master/PROTOCOL.TXT
//!
//! The protocol uses a simple binary header followed by JSON payload.
//! All multi-byte integers are big-endian (network byte order).

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Protocol version (always 0x02)
pub const PROTOCOL_VERSION: u8 = 0x02;

/// Packet types (identifier byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    PushData = 0x00,
    PushAck = 0x01,
    PullData = 0x02,
    PullResp = 0x03,
    PullAck = 0x04,
    TxAck = 0x05,
}

impl TryFrom<u8> for PacketType {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(PacketType::PushData),
            0x01 => Ok(PacketType::PushAck),
            0x02 => Ok(PacketType::PullData),
            0x03 => Ok(PacketType::PullResp),
            0x04 => Ok(PacketType::PullAck),
            0x05 => Ok(PacketType::TxAck),
            _ => Err(anyhow::anyhow!("Unknown packet type: 0x{:02x}", value)),
        }
    }
}

/// Gateway identifier (EUI-64, 8 bytes)
pub type GatewayEui = [u8; 8];

/// Parsed GWMP packet
#[derive(Debug, PartialEq, Eq)]
pub enum GwmpPacket {
    PushData {
        random_token: u16,
        gateway_eui: GatewayEui,
        json_payload: String,
    },
    PushAck {
        random_token: u16,
    },
    PullData {
        random_token: u16,
        gateway_eui: GatewayEui,
    },
}

/// Rxpk (received packet) entry of a PUSH_DATA JSON payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rxpk {
    /// UTC time of packet reception (ISO 8601)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Concentrator timestamp (microseconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmst: Option<u32>,
    /// Frequency in MHz
    pub freq: f64,
    /// LoRa signal-to-noise ratio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lsnr: Option<f64>,
    /// RSSI in dBm
    pub rssi: f64,
    /// Modulation (LORA or FSK)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modu: Option<String>,
    /// LoRa datarate identifier (e.g., "SF7BW125")
    pub datr: String,
    /// LoRa coding rate (e.g., "4/5")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codr: Option<String>,
    /// RF packet payload size in bytes
    pub size: u16,
    /// Base64 encoded RF packet payload
    pub data: String,
}

/// Push data JSON wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct PushDataPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rxpk: Option<Vec<Rxpk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat: Option<serde_json::Value>,
}

impl GwmpPacket {
    /// Parse a raw UDP datagram into a GWMP packet
    pub fn parse(data: &[u8]) -> anyhow::Result<Self> {
        if data.len() < 4 {
            return Err(anyhow::anyhow!("Packet too short: {} bytes", data.len()));
        }

        let mut buf = data;

        let version = buf.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(anyhow::anyhow!(
                "Unsupported protocol version: 0x{:02x}",
                version
            ));
        }

        let random_token = buf.get_u16();
        let packet_type = PacketType::try_from(buf.get_u8())?;

        match packet_type {
            PacketType::PushData => {
                if buf.remaining() < 8 {
                    return Err(anyhow::anyhow!("PUSH_DATA too short for gateway EUI"));
                }
                let mut gateway_eui = [0u8; 8];
                buf.copy_to_slice(&mut gateway_eui);

                let json_payload = String::from_utf8(buf.to_vec())
                    .map_err(|e| anyhow::anyhow!("Invalid UTF-8 in JSON payload: {}", e))?;

                Ok(GwmpPacket::PushData {
                    random_token,
                    gateway_eui,
                    json_payload,
                })
            }
            PacketType::PushAck => Ok(GwmpPacket::PushAck { random_token }),
            PacketType::PullData => {
                if buf.remaining() < 8 {
                    return Err(anyhow::anyhow!("PULL_DATA too short for gateway EUI"));
                }
                let mut gateway_eui = [0u8; 8];
                buf.copy_to_slice(&mut gateway_eui);

                Ok(GwmpPacket::PullData {
                    random_token,
                    gateway_eui,
                })
            }
            _ => Err(anyhow::anyhow!(
                "Unexpected packet type for parsing: {:?}",
                packet_type
            )),
        }
    }

    /// Build a PUSH_DATA datagram carrying `payload` as JSON
    pub fn push_data(
        random_token: u16,
        gateway_eui: &GatewayEui,
        payload: &PushDataPayload,
    ) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(payload)?;
        let mut buf = BytesMut::with_capacity(12 + json.len());
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u16(random_token);
        buf.put_u8(PacketType::PushData as u8);
        buf.put_slice(gateway_eui);
        buf.put_slice(&json);
        Ok(buf.to_vec())
    }

    /// Build a PUSH_ACK response
    pub fn push_ack(random_token: u16) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u16(random_token);
        buf.put_u8(PacketType::PushAck as u8);
        buf.to_vec()
    }

    /// Build a PULL_ACK response
    pub fn pull_ack(random_token: u16) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u16(random_token);
        buf.put_u8(PacketType::PullAck as u8);
        buf.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EUI: GatewayEui = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00, 0x11];

    fn rxpk() -> Rxpk {
        Rxpk {
            time: None,
            tmst: Some(1000),
            freq: 868.1,
            lsnr: Some(7.5),
            rssi: -65.0,
            modu: Some("LORA".to_string()),
            datr: "SF7BW125".to_string(),
            codr: Some("4/5".to_string()),
            size: 3,
            data: "AQID".to_string(),
        }
    }

    #[test]
    fn test_push_data_parses_back() {
        let payload = PushDataPayload {
            rxpk: Some(vec![rxpk()]),
            stat: None,
        };
        let datagram = GwmpPacket::push_data(0x1234, &EUI, &payload).unwrap();
        assert_eq!(&datagram[..4], &[0x02, 0x12, 0x34, 0x00]);

        match GwmpPacket::parse(&datagram).unwrap() {
            GwmpPacket::PushData {
                random_token,
                gateway_eui,
                json_payload,
            } => {
                assert_eq!(random_token, 0x1234);
                assert_eq!(gateway_eui, EUI);
                let parsed: PushDataPayload = serde_json::from_str(&json_payload).unwrap();
                let rx = &parsed.rxpk.unwrap()[0];
                assert_eq!(rx.data, "AQID");
                assert_eq!(rx.size, 3);
                assert!(!json_payload.contains("\"time\""));
            }
            other => panic!("Expected PushData, got {:?}", other),
        }
    }

    #[test]
    fn test_push_ack_parses() {
        let ack = GwmpPacket::push_ack(0xBEEF);
        assert_eq!(ack, vec![0x02, 0xBE, 0xEF, 0x01]);
        assert_eq!(
            GwmpPacket::parse(&ack).unwrap(),
            GwmpPacket::PushAck {
                random_token: 0xBEEF
            }
        );
    }

    #[test]
    fn test_pull_data_parses() {
        let mut datagram = vec![0x02, 0x00, 0x07, 0x02];
        datagram.extend_from_slice(&EUI);
        assert_eq!(
            GwmpPacket::parse(&datagram).unwrap(),
            GwmpPacket::PullData {
                random_token: 7,
                gateway_eui: EUI
            }
        );
    }

    #[test]
    fn test_wrong_version_rejected() {
        assert!(GwmpPacket::parse(&[0x01, 0x00, 0x00, 0x01]).is_err());
    }

    #[test]
    fn test_truncated_packet_rejected() {
        assert!(GwmpPacket::parse(&[0x02, 0x00]).is_err());
        assert!(GwmpPacket::parse(&[0x02, 0x00, 0x01, 0x00, 0xAA]).is_err());
    }
}
