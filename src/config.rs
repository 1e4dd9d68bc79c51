use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::lorawan::DeviceIdentity;
use crate::payload::SharedKey;
use crate::radio::DeliveryMode;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    pub lorawan: LorawanConfig,
    pub security: SecurityConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    pub logging: LoggingConfig,
}

/// OTAA identifiers, hex encoded. Must match the network server's records.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub dev_eui: String,
    pub join_eui: String,
    pub app_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LorawanConfig {
    pub app_port: u8,
    pub confirmed: bool,
    pub adr: bool,
    pub tx_interval_secs: u64,
    pub join_retry_interval_ms: u64,
    pub join_max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// ASCII passphrase used as the HMAC-SHA256 key (at most 32 bytes)
    pub hmac_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioMode {
    #[default]
    Simulated,
    Gwmp,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RadioConfig {
    #[serde(default)]
    pub mode: RadioMode,
    #[serde(default)]
    pub simulated: SimulatedRadioConfig,
    pub gwmp: Option<GwmpRadioConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulatedRadioConfig {
    /// Number of join attempts that fail before one succeeds
    #[serde(default)]
    pub join_failures: u32,
    #[serde(default)]
    pub join_latency_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GwmpRadioConfig {
    /// Network server / bridge address, e.g. "127.0.0.1:1680"
    pub server: String,
    pub gateway_eui: String,
    /// Device address assigned to this device by the bench network server
    pub dev_addr: String,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
}

fn default_ack_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    /// Load `path`, using the built-in defaults only when the file does not
    /// exist. A file that exists but fails to read, parse or validate is an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content)
                .map_err(|e| anyhow::anyhow!("Invalid config file {:?}: {}", path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::anyhow!("Failed to read config file {:?}: {}", path, e)),
        }
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.lorawan.join_max_retries == 0 {
            anyhow::bail!("lorawan.join_max_retries must be at least 1");
        }
        // FPort 0 is reserved for MAC commands, 224+ for test/RFU
        if !(1..=223).contains(&self.lorawan.app_port) {
            anyhow::bail!(
                "lorawan.app_port must be in 1..=223, got {}",
                self.lorawan.app_port
            );
        }
        self.identity()?;
        self.shared_key()?;
        if self.radio.mode == RadioMode::Gwmp && self.radio.gwmp.is_none() {
            anyhow::bail!("radio.mode = \"gwmp\" requires a [radio.gwmp] section");
        }
        Ok(())
    }

    pub fn identity(&self) -> anyhow::Result<DeviceIdentity> {
        DeviceIdentity::from_hex(
            &self.device.dev_eui,
            &self.device.join_eui,
            &self.device.app_key,
        )
    }

    pub fn shared_key(&self) -> anyhow::Result<SharedKey> {
        SharedKey::from_passphrase(self.security.hmac_key.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid security.hmac_key: {}", e))
    }
}

impl LorawanConfig {
    pub fn delivery_mode(&self) -> DeliveryMode {
        if self.confirmed {
            DeliveryMode::Confirmed
        } else {
            DeliveryMode::Unconfirmed
        }
    }

    pub fn tx_interval(&self) -> Duration {
        Duration::from_secs(self.tx_interval_secs)
    }

    pub fn join_retry_interval(&self) -> Duration {
        Duration::from_millis(self.join_retry_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig {
                dev_eui: "a1b2c3d4e5f60718".to_string(),
                join_eui: "089c6993276dd9a2".to_string(),
                app_key: "2b7e151628aed2a6abf7158809cf4f3c".to_string(),
            },
            lorawan: LorawanConfig {
                app_port: 1,
                confirmed: true,
                adr: true,
                tx_interval_secs: 60,
                join_retry_interval_ms: 60_000,
                join_max_retries: 10,
            },
            // Development key only; production keys come from provisioning
            security: SecurityConfig {
                hmac_key: "SensecapStm32WL55SecretKey2024".to_string(),
            },
            radio: RadioConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[device]
dev_eui = "a1b2c3d4e5f60718"
join_eui = "089c6993276dd9a2"
app_key = "2b7e151628aed2a6abf7158809cf4f3c"

[lorawan]
app_port = 2
confirmed = false
adr = false
tx_interval_secs = 30
join_retry_interval_ms = 5000
join_max_retries = 3

[security]
hmac_key = "bench-key"

[radio]
mode = "gwmp"

[radio.gwmp]
server = "127.0.0.1:1680"
gateway_eui = "aabbccddeeff0011"
dev_addr = "260b1234"

[logging]
level = "debug"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.lorawan.app_port, 2);
        assert_eq!(config.lorawan.delivery_mode(), DeliveryMode::Unconfirmed);
        assert_eq!(config.lorawan.join_retry_interval(), Duration::from_millis(5000));
        assert_eq!(config.radio.mode, RadioMode::Gwmp);
        let gwmp = config.radio.gwmp.as_ref().unwrap();
        assert_eq!(gwmp.ack_timeout_ms, 2000);
        assert_eq!(config.identity().unwrap().dev_eui[0], 0xA1);
    }

    #[test]
    fn test_radio_section_is_optional() {
        let without_radio = SAMPLE.replace("mode = \"gwmp\"", "").replace(
            "[radio.gwmp]\nserver = \"127.0.0.1:1680\"\ngateway_eui = \"aabbccddeeff0011\"\ndev_addr = \"260b1234\"\n",
            "",
        );
        let config = Config::parse(&without_radio).unwrap();
        assert_eq!(config.radio.mode, RadioMode::Simulated);
        assert_eq!(config.radio.simulated.join_failures, 0);
    }

    #[test]
    fn test_zero_retries_rejected() {
        let bad = SAMPLE.replace("join_max_retries = 3", "join_max_retries = 0");
        assert!(Config::parse(&bad).is_err());
    }

    #[test]
    fn test_reserved_port_rejected() {
        let bad = SAMPLE.replace("app_port = 2", "app_port = 0");
        assert!(Config::parse(&bad).is_err());
    }

    #[test]
    fn test_oversized_key_rejected() {
        let bad = SAMPLE.replace(
            "hmac_key = \"bench-key\"",
            "hmac_key = \"0123456789abcdef0123456789abcdef0\"",
        );
        assert!(Config::parse(&bad).is_err());
    }

    fn write_temp_config(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "lora-sentinel-{}-{}.toml",
            name,
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("lora-sentinel-does-not-exist.toml");
        let config = Config::load_or_default(&path).unwrap();
        assert_eq!(config.lorawan.join_max_retries, 10);
    }

    #[test]
    fn test_invalid_key_file_is_rejected_not_replaced() {
        let bad = SAMPLE.replace(
            "hmac_key = \"bench-key\"",
            "hmac_key = \"0123456789abcdef0123456789abcdef0\"",
        );
        let path = write_temp_config("bad-key", &bad);
        let result = Config::load_or_default(&path);
        std::fs::remove_file(&path).ok();

        let err = result.unwrap_err().to_string();
        assert!(err.contains("hmac_key"), "unexpected error: {}", err);
    }

    #[test]
    fn test_malformed_toml_is_rejected() {
        let path = write_temp_config("typo", "[lorawan\napp_port = 1\n");
        let result = Config::load_or_default(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn test_valid_file_is_used() {
        let path = write_temp_config("valid", SAMPLE);
        let config = Config::load_or_default(&path);
        std::fs::remove_file(&path).ok();
        assert_eq!(config.unwrap().security.hmac_key, "bench-key");
    }

    #[test]
    fn test_default_matches_reference_device() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lorawan.join_max_retries, 10);
        assert_eq!(config.lorawan.tx_interval(), Duration::from_secs(60));
        assert_eq!(config.lorawan.delivery_mode(), DeliveryMode::Confirmed);
    }
}
