use std::time::Duration;

use anyhow::{bail, Result};

/// Top-level configuration for the thermoor agent.
#[derive(Debug, Clone)]
pub struct Config {
    /// Serial device the sensor bus is attached to.
    pub device: String,

    /// Serial port baud rate. Default: 9600.
    pub speed: u32,

    /// Sampling cycle length. Default: 10s.
    pub interval: Duration,

    /// Zabbix delivery configuration.
    pub zabbix: ZabbixConfig,
}

/// Zabbix trapper destination configuration.
#[derive(Debug, Clone)]
pub struct ZabbixConfig {
    /// Zabbix server address.
    pub server: String,

    /// Zabbix trapper port. Default: 10051.
    pub port: u16,

    /// Name of the host as registered in Zabbix.
    pub host: String,

    /// Item key base name; the sensor address is appended as a key
    /// argument, e.g. `thermal_monitor[28FF]`. Default: "thermal_monitor".
    pub key: String,
}

// --- Default value functions ---

pub fn default_speed() -> u32 {
    9600
}

pub fn default_interval() -> Duration {
    Duration::from_secs(10)
}

pub fn default_port() -> u16 {
    10051
}

pub fn default_key() -> String {
    "thermal_monitor".to_string()
}

impl Config {
    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.device.is_empty() {
            bail!("device is required");
        }

        if self.speed == 0 {
            bail!("speed must be positive");
        }

        if self.interval.is_zero() {
            bail!("interval must be positive");
        }

        if self.zabbix.server.is_empty() {
            bail!("zabbix server address is required");
        }

        if self.zabbix.host.is_empty() {
            bail!("zabbix host name is required");
        }

        if self.zabbix.key.is_empty() {
            bail!("item key base name is required");
        }

        Ok(())
    }
}
