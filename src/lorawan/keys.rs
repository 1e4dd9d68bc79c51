//! AppKey-based MIC computation for JoinRequest frames
//!
//! MIC = aes128_cmac(AppKey, MHDR | JoinEUI | DevEUI | DevNonce)[0..4]

use aes::Aes128;
use aes::cipher::KeyInit;
use cmac::{Cmac, Mac};

use super::encoder::join_request_body;
use super::DeviceIdentity;

/// Compute the 4-byte JoinRequest MIC, in wire order
pub fn join_request_mic(identity: &DeviceIdentity, dev_nonce: u16) -> [u8; 4] {
    let mut mac = <Cmac<Aes128> as KeyInit>::new((&identity.app_key).into());
    mac.update(&join_request_body(identity, dev_nonce));
    let full = mac.finalize().into_bytes();

    let mut mic = [0u8; 4];
    mic.copy_from_slice(&full[..4]);
    mic
}
