pub mod agent;
pub mod config;
pub mod lorawan;
pub mod payload;
pub mod radio;
pub mod sensor;
pub mod sleep;
#[cfg(feature = "gwmp")]
pub mod udp;
