use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating mode of the device. Unrecognized values are kept verbatim so they
/// can be reported and written back unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Mode {
    Standalone,
    Simulator,
    Subscriber,
    Publisher,
    Unknown(String),
}

impl Mode {
    pub fn parse(value: &str) -> Self {
        match value {
            "Standalone" => Mode::Standalone,
            "Simulator" => Mode::Simulator,
            "Subscriber" => Mode::Subscriber,
            "Publisher" => Mode::Publisher,
            other => Mode::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Mode::Standalone => "Standalone",
            Mode::Simulator => "Simulator",
            Mode::Subscriber => "Subscriber",
            Mode::Publisher => "Publisher",
            Mode::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Mode::Unknown(_))
    }

    pub fn all() -> [Mode; 4] {
        [
            Mode::Standalone,
            Mode::Simulator,
            Mode::Subscriber,
            Mode::Publisher,
        ]
    }
}

impl From<String> for Mode {
    fn from(value: String) -> Self {
        Mode::parse(&value)
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysConfig {
    pub mode: Mode,
    /// Power level (W) that switches the relays on.
    pub limit: i64,
    pub alarm_on_time: i64,
    pub alarm_timeout: i64,
    /// Seconds after relay-on before the alarm fires if power is still high.
    pub alarm_delay: i64,
    pub lower_pow_limit: i64,
    pub relay_timeout: i64,
    pub connection_timeout: i64,
    pub alarm_pin: String,
    pub relay_pins: String,
    pub cycle_time: i64,
}

impl Default for SysConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Simulator,
            limit: 5000,
            alarm_on_time: 15,
            alarm_timeout: 60,
            alarm_delay: 40,
            lower_pow_limit: 4000,
            relay_timeout: 300,
            connection_timeout: 300,
            alarm_pin: "J8:3".to_string(),
            relay_pins: "J8:11; J8:13".to_string(),
            cycle_time: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusConfig {
    pub ip: String,
    pub port: i64,
    pub timeout: i64,
    pub acq_time: i64,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            ip: "192.168.1.45".to_string(),
            port: 1502,
            timeout: 5,
            acq_time: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker_ip: String,
    pub username: String,
    pub password: String,
    pub port: i64,
    pub topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_ip: "192.168.1.54".to_string(),
            username: "username".to_string(),
            password: "password".to_string(),
            port: 1883,
            topic: "Power".to_string(),
        }
    }
}

/// The document exchanged on `/config`. Older devices call the first
/// section `user`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    #[serde(alias = "user")]
    pub sys: SysConfig,
    pub modbus: ModbusConfig,
    pub mqtt: MqttConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub load: i64,
    #[serde(rename = "PV")]
    pub pv: i64,
    pub grid: i64,
    pub status: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualCommand {
    pub pin: String,
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mode_keeps_unknown_values() {
        let mode: Mode = serde_json::from_value(json!("Turbo")).unwrap();
        assert_eq!(mode, Mode::Unknown("Turbo".into()));
        assert_eq!(serde_json::to_value(&mode).unwrap(), json!("Turbo"));
        assert!(!mode.is_known());
    }

    #[test]
    fn device_config_accepts_legacy_user_section() {
        let config: DeviceConfig = serde_json::from_value(json!({
            "user": { "mode": "Subscriber", "alarm_pin": "A1" },
            "mqtt": { "topic": "Load" }
        }))
        .unwrap();
        assert_eq!(config.sys.mode, Mode::Subscriber);
        assert_eq!(config.sys.alarm_pin, "A1");
        assert_eq!(config.sys.limit, 5000);
        assert_eq!(config.mqtt.topic, "Load");
        assert_eq!(config.modbus, ModbusConfig::default());
    }

    #[test]
    fn telemetry_uses_pv_key() {
        let sample = TelemetrySample {
            load: 3,
            pv: 1,
            grid: 2,
            status: "NA".into(),
        };
        let value = serde_json::to_value(&sample).unwrap();
        assert_eq!(value, json!({"load": 3, "PV": 1, "grid": 2, "status": "NA"}));
    }
}
