pub mod encoder;
pub mod join;
#[cfg(feature = "gwmp")]
pub mod keys;

use std::fmt;

/// OTAA identity provisioned into the device (LoRaWAN 1.0.3)
///
/// Lengths are fixed by the protocol. The value is never mutated after
/// construction and is handed to the radio as a whole on each join.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub dev_eui: [u8; 8],
    pub join_eui: [u8; 8],
    pub app_key: [u8; 16],
}

impl DeviceIdentity {
    pub fn new(dev_eui: [u8; 8], join_eui: [u8; 8], app_key: [u8; 16]) -> Self {
        Self {
            dev_eui,
            join_eui,
            app_key,
        }
    }

    /// Parse the identity from big-endian hex strings as shown by network servers
    pub fn from_hex(dev_eui: &str, join_eui: &str, app_key: &str) -> anyhow::Result<Self> {
        Ok(Self {
            dev_eui: decode_fixed(dev_eui, "dev_eui")?,
            join_eui: decode_fixed(join_eui, "join_eui")?,
            app_key: decode_fixed(app_key, "app_key")?,
        })
    }
}

// AppKey stays out of logs
impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("dev_eui", &hex::encode(self.dev_eui))
            .field("join_eui", &hex::encode(self.join_eui))
            .field("app_key", &"<redacted>")
            .finish()
    }
}

pub(crate) fn decode_fixed<const N: usize>(input: &str, field: &str) -> anyhow::Result<[u8; N]> {
    let mut out = [0u8; N];
    hex::decode_to_slice(input.trim(), &mut out).map_err(|e| {
        anyhow::anyhow!(
            "{} must be {} hex characters ({}): {:?}",
            field,
            N * 2,
            e,
            input
        )
    })?;
    Ok(out)
}

/// LoRaWAN MAC Header (MHDR) - Message Type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MType {
    JoinRequest,
    JoinAccept,
    UnconfirmedDataUp,
    UnconfirmedDataDown,
    ConfirmedDataUp,
    ConfirmedDataDown,
    RejoinRequest,
    Proprietary,
}

impl MType {
    /// MHDR byte with Major = LoRaWAN R1
    pub fn mhdr(self) -> u8 {
        let bits: u8 = match self {
            MType::JoinRequest => 0b000,
            MType::JoinAccept => 0b001,
            MType::UnconfirmedDataUp => 0b010,
            MType::UnconfirmedDataDown => 0b011,
            MType::ConfirmedDataUp => 0b100,
            MType::ConfirmedDataDown => 0b101,
            MType::RejoinRequest => 0b110,
            MType::Proprietary => 0b111,
        };
        bits << 5
    }
}

impl From<u8> for MType {
    fn from(mhdr: u8) -> Self {
        match (mhdr >> 5) & 0x07 {
            0b000 => MType::JoinRequest,
            0b001 => MType::JoinAccept,
            0b010 => MType::UnconfirmedDataUp,
            0b011 => MType::UnconfirmedDataDown,
            0b100 => MType::ConfirmedDataUp,
            0b101 => MType::ConfirmedDataDown,
            0b110 => MType::RejoinRequest,
            _ => MType::Proprietary,
        }
    }
}

impl fmt::Display for MType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Frame Control byte (FCtrl) for uplink
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FCtrl {
    pub adr: bool,
    pub adr_ack_req: bool,
    pub ack: bool,
    pub class_b: bool,
    pub f_opts_len: u8,
}

impl FCtrl {
    pub fn to_byte(&self) -> u8 {
        let mut byte = self.f_opts_len & 0x0F;
        if self.adr {
            byte |= 0x80;
        }
        if self.adr_ack_req {
            byte |= 0x40;
        }
        if self.ack {
            byte |= 0x20;
        }
        if self.class_b {
            byte |= 0x10;
        }
        byte
    }
}

impl From<u8> for FCtrl {
    fn from(byte: u8) -> Self {
        Self {
            adr: (byte & 0x80) != 0,
            adr_ack_req: (byte & 0x40) != 0,
            ack: (byte & 0x20) != 0,
            class_b: (byte & 0x10) != 0,
            f_opts_len: byte & 0x0F,
        }
    }
}

/// Decoded LoRaWAN MAC frame
#[derive(Debug, Clone)]
pub enum LoRaWANFrame {
    /// Data frame (up or down)
    Data {
        mtype: MType,
        dev_addr: u32,
        fctrl: FCtrl,
        fcnt: u16,
        f_port: Option<u8>,
        frm_payload: Vec<u8>,
        mic: u32,
    },
    JoinRequest {
        join_eui: u64,
        dev_eui: u64,
        dev_nonce: u16,
        mic: u32,
    },
    /// Anything a device agent has no reason to look inside
    Other { mtype: MType, len: usize },
}

impl fmt::Display for LoRaWANFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoRaWANFrame::Data {
                mtype,
                dev_addr,
                fctrl,
                fcnt,
                f_port,
                frm_payload,
                mic,
            } => {
                write!(
                    f,
                    "{} DevAddr={:08X} FCnt={} FPort={} Payload={} bytes MIC={:08X} ADR={}",
                    mtype,
                    dev_addr,
                    fcnt,
                    f_port.map(|p| p.to_string()).unwrap_or("-".to_string()),
                    frm_payload.len(),
                    mic,
                    fctrl.adr,
                )
            }
            LoRaWANFrame::JoinRequest {
                join_eui,
                dev_eui,
                dev_nonce,
                mic,
            } => {
                write!(
                    f,
                    "JoinRequest JoinEUI={:016X} DevEUI={:016X} DevNonce={} MIC={:08X}",
                    join_eui, dev_eui, dev_nonce, mic
                )
            }
            LoRaWANFrame::Other { mtype, len } => write!(f, "{} ({} bytes)", mtype, len),
        }
    }
}

/// Decode a LoRaWAN PHY payload (raw bytes after base64 decode)
pub fn decode_phy_payload(data: &[u8]) -> anyhow::Result<LoRaWANFrame> {
    if data.is_empty() {
        return Err(anyhow::anyhow!("Empty PHY payload"));
    }

    let mtype = MType::from(data[0]);

    match mtype {
        MType::JoinRequest => decode_join_request(data),
        MType::UnconfirmedDataUp
        | MType::UnconfirmedDataDown
        | MType::ConfirmedDataUp
        | MType::ConfirmedDataDown => decode_data_frame(mtype, data),
        _ => Ok(LoRaWANFrame::Other {
            mtype,
            len: data.len(),
        }),
    }
}

fn decode_join_request(data: &[u8]) -> anyhow::Result<LoRaWANFrame> {
    // MHDR(1) + JoinEUI(8) + DevEUI(8) + DevNonce(2) + MIC(4) = 23 bytes
    if data.len() != 23 {
        return Err(anyhow::anyhow!(
            "JoinRequest must be 23 bytes, got {}",
            data.len()
        ));
    }

    let join_eui = u64::from_le_bytes(data[1..9].try_into()?);
    let dev_eui = u64::from_le_bytes(data[9..17].try_into()?);
    let dev_nonce = u16::from_le_bytes(data[17..19].try_into()?);
    let mic = u32::from_le_bytes(data[19..23].try_into()?);

    Ok(LoRaWANFrame::JoinRequest {
        join_eui,
        dev_eui,
        dev_nonce,
        mic,
    })
}

fn decode_data_frame(mtype: MType, data: &[u8]) -> anyhow::Result<LoRaWANFrame> {
    // Minimum: MHDR(1) + DevAddr(4) + FCtrl(1) + FCnt(2) + MIC(4) = 12 bytes
    if data.len() < 12 {
        return Err(anyhow::anyhow!(
            "Data frame too short: {} bytes (minimum 12)",
            data.len()
        ));
    }

    let dev_addr = u32::from_le_bytes(data[1..5].try_into()?);
    let fctrl = FCtrl::from(data[5]);
    let fcnt = u16::from_le_bytes(data[6..8].try_into()?);

    let f_opts_end = 8 + fctrl.f_opts_len as usize;
    let mic_start = data.len() - 4;
    if f_opts_end > mic_start {
        return Err(anyhow::anyhow!(
            "FOpts length {} exceeds available data",
            fctrl.f_opts_len
        ));
    }

    let (f_port, frm_payload) = if f_opts_end < mic_start {
        (Some(data[f_opts_end]), data[f_opts_end + 1..mic_start].to_vec())
    } else {
        (None, vec![])
    };

    let mic = u32::from_le_bytes(data[mic_start..].try_into()?);

    Ok(LoRaWANFrame::Data {
        mtype,
        dev_addr,
        fctrl,
        fcnt,
        f_port,
        frm_payload,
        mic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_hex() {
        let id = DeviceIdentity::from_hex(
            "A1B2C3D4E5F60718",
            "089c6993276dd9a2",
            "2b7e151628aed2a6abf7158809cf4f3c",
        )
        .unwrap();
        assert_eq!(id.dev_eui, [0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6, 0x07, 0x18]);
        assert_eq!(id.app_key[15], 0x3C);
    }

    #[test]
    fn test_identity_wrong_length_fails() {
        let result = DeviceIdentity::from_hex(
            "A1B2C3D4E5F607",
            "089c6993276dd9a2",
            "2b7e151628aed2a6abf7158809cf4f3c",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_identity_debug_redacts_key() {
        let id = DeviceIdentity::new([1; 8], [2; 8], [0xAB; 16]);
        let shown = format!("{:?}", id);
        assert!(shown.contains("0101010101010101"));
        assert!(!shown.contains("abab"));
    }

    #[test]
    fn test_mhdr_roundtrip() {
        for mtype in [
            MType::JoinRequest,
            MType::UnconfirmedDataUp,
            MType::ConfirmedDataUp,
            MType::Proprietary,
        ] {
            assert_eq!(MType::from(mtype.mhdr()), mtype);
        }
        assert_eq!(MType::ConfirmedDataUp.mhdr(), 0x80);
    }

    #[test]
    fn test_decode_unconfirmed_data_up() {
        let data: Vec<u8> = vec![
            0x40, // MHDR
            0x04, 0x03, 0x02, 0x01, // DevAddr (LE)
            0x80, // FCtrl (ADR)
            0x01, 0x00, // FCnt (LE)
            0x01, // FPort
            0xAA, 0xBB, // FRMPayload
            0xEF, 0xBE, 0xAD, 0xDE, // MIC (LE)
        ];

        match decode_phy_payload(&data).unwrap() {
            LoRaWANFrame::Data {
                mtype,
                dev_addr,
                fctrl,
                fcnt,
                f_port,
                frm_payload,
                mic,
            } => {
                assert_eq!(mtype, MType::UnconfirmedDataUp);
                assert_eq!(dev_addr, 0x01020304);
                assert!(fctrl.adr);
                assert_eq!(fcnt, 1);
                assert_eq!(f_port, Some(1));
                assert_eq!(frm_payload, vec![0xAA, 0xBB]);
                assert_eq!(mic, 0xDEADBEEF);
            }
            other => panic!("Expected Data frame, got {}", other),
        }
    }

    #[test]
    fn test_empty_payload_fails() {
        assert!(decode_phy_payload(&[]).is_err());
    }

    #[test]
    fn test_too_short_data_frame_fails() {
        let data: Vec<u8> = vec![0x40, 0x01, 0x02, 0x03, 0x04];
        assert!(decode_phy_payload(&data).is_err());
    }
}
