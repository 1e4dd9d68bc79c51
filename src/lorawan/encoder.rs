//! LoRaWAN frame encoder for device-originated frames
//!
//! Builds raw LoRaWAN PHY payloads the way a device radio would emit them.
//! The output bytes are base64-encoded and placed inside the GWMP
//! PUSH_DATA rxpk JSON when the agent runs against a packet forwarder.
//!
//! Data uplink structure:
//!   MHDR(1) | DevAddr(4,LE) | FCtrl(1) | FCnt(2,LE) | [FPort(1) | FRMPayload(N)] | MIC(4,LE)
//!
//! JoinRequest structure:
//!   MHDR(1) | JoinEUI(8,LE) | DevEUI(8,LE) | DevNonce(2,LE) | MIC(4,LE)

use super::{DeviceIdentity, FCtrl, MType};

/// Parameters for building a LoRaWAN data uplink
#[derive(Debug, Clone)]
pub struct UplinkBuilder {
    /// UnconfirmedDataUp or ConfirmedDataUp
    pub mtype: MType,
    pub dev_addr: u32,
    pub fctrl: FCtrl,
    /// Frame counter (16-bit, managed by the radio)
    pub fcnt: u16,
    /// FPort (application port, 1-223 for application data)
    pub f_port: u8,
    pub payload: Vec<u8>,
}

impl UplinkBuilder {
    pub fn new(confirmed: bool, dev_addr: u32, fcnt: u16, f_port: u8, payload: Vec<u8>) -> Self {
        Self {
            mtype: if confirmed {
                MType::ConfirmedDataUp
            } else {
                MType::UnconfirmedDataUp
            },
            dev_addr,
            fctrl: FCtrl::default(),
            fcnt,
            f_port,
            payload,
        }
    }

    pub fn with_adr(mut self, adr: bool) -> Self {
        self.fctrl.adr = adr;
        self
    }

    /// Build the raw PHY payload bytes.
    ///
    /// The MIC is left as zeros: computing it needs the NwkSKey derived from
    /// a JoinAccept, which the bench forwarder never delivers.
    pub fn build(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(13 + self.payload.len());

        frame.push(self.mtype.mhdr());
        frame.extend_from_slice(&self.dev_addr.to_le_bytes());
        frame.push(self.fctrl.to_byte());
        frame.extend_from_slice(&self.fcnt.to_le_bytes());

        if !self.payload.is_empty() {
            frame.push(self.f_port);
            frame.extend_from_slice(&self.payload);
        }

        frame.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        frame
    }
}

/// Build a JoinRequest PHY payload. `mic` is computed by the caller over
/// the first 19 bytes (see [`join_request_body`]).
pub fn build_join_request(identity: &DeviceIdentity, dev_nonce: u16, mic: [u8; 4]) -> Vec<u8> {
    let mut frame = join_request_body(identity, dev_nonce);
    frame.extend_from_slice(&mic);
    frame
}

/// MHDR | JoinEUI | DevEUI | DevNonce, the bytes covered by the join MIC
pub fn join_request_body(identity: &DeviceIdentity, dev_nonce: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(23);
    body.push(MType::JoinRequest.mhdr());
    // EUIs are provisioned big-endian but travel little-endian
    body.extend(identity.join_eui.iter().rev());
    body.extend(identity.dev_eui.iter().rev());
    body.extend_from_slice(&dev_nonce.to_le_bytes());
    body
}
