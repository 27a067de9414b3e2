use serde::{Deserialize, Serialize};

use crate::types::ThermostatMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub scan_interval_secs: u64,
    pub price_refresh_interval_secs: u64,
    pub price_timeout_ms: u64,
    pub device_write_timeout_ms: u64,
    pub history_timeout_ms: u64,
    pub history_lookback_hours: u64,
    pub history_failure_escalation: u32,
    pub dry_run: bool,
    pub control_mode: ThermostatMode,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 60,
            price_refresh_interval_secs: 300,
            price_timeout_ms: 5_000,
            device_write_timeout_ms: 5_000,
            history_timeout_ms: 10_000,
            history_lookback_hours: 7 * 24,
            history_failure_escalation: 5,
            dry_run: true,
            control_mode: ThermostatMode::Cool,
        }
    }
}

impl ControlConfig {
    /// Number of scan cycles between price refreshes, rounded up.
    pub fn price_refresh_cycles(&self) -> u64 {
        let scan = self.scan_interval_secs.max(1);
        self.price_refresh_interval_secs.div_ceil(scan).max(1)
    }

    pub fn sanitize(&mut self) {
        self.scan_interval_secs = self.scan_interval_secs.clamp(1, 3_600);
        self.price_refresh_interval_secs = self
            .price_refresh_interval_secs
            .clamp(self.scan_interval_secs, 86_400);
        self.price_timeout_ms = self.price_timeout_ms.clamp(100, 60_000);
        self.device_write_timeout_ms = self.device_write_timeout_ms.clamp(100, 60_000);
        self.history_timeout_ms = self.history_timeout_ms.clamp(100, 120_000);
        self.history_lookback_hours = self.history_lookback_hours.clamp(1, 90 * 24);
        self.history_failure_escalation = self.history_failure_escalation.max(1);
    }
}

/// Constants of the cycling penalty, the optimization model and the write throttle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub fan_cycle_penalty: f64,
    pub compressor_cycle_penalty: f64,
    pub startup_cost: f64,
    pub comfort_band_f: f64,
    pub min_runtime_hours: f64,
    pub max_runtime_hours: f64,
    pub min_target_temp_f: f64,
    pub max_target_temp_f: f64,
    pub max_undershoot_f: f64,
    pub default_target_temp_f: f64,
    pub update_threshold_f: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            fan_cycle_penalty: 2.0,
            compressor_cycle_penalty: 5.0,
            startup_cost: 10.0,
            comfort_band_f: 2.0,
            min_runtime_hours: 0.5,
            max_runtime_hours: 6.0,
            min_target_temp_f: 74.0,
            max_target_temp_f: 78.0,
            max_undershoot_f: 1.0,
            default_target_temp_f: 76.0,
            update_threshold_f: 0.5,
        }
    }
}

impl PolicyConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        let non_negative = |value: f64, fallback: f64| {
            if value.is_finite() && value >= 0.0 {
                value
            } else {
                fallback
            }
        };

        self.fan_cycle_penalty = non_negative(self.fan_cycle_penalty, defaults.fan_cycle_penalty);
        self.compressor_cycle_penalty =
            non_negative(self.compressor_cycle_penalty, defaults.compressor_cycle_penalty);
        self.startup_cost = non_negative(self.startup_cost, defaults.startup_cost);
        self.comfort_band_f = non_negative(self.comfort_band_f, defaults.comfort_band_f);
        self.max_undershoot_f = non_negative(self.max_undershoot_f, defaults.max_undershoot_f);
        self.update_threshold_f =
            non_negative(self.update_threshold_f, defaults.update_threshold_f);

        self.max_runtime_hours = non_negative(self.max_runtime_hours, defaults.max_runtime_hours)
            .clamp(0.0, 24.0);
        self.min_runtime_hours = non_negative(self.min_runtime_hours, defaults.min_runtime_hours)
            .min(self.max_runtime_hours);

        if !(self.min_target_temp_f.is_finite()
            && self.max_target_temp_f.is_finite()
            && self.min_target_temp_f <= self.max_target_temp_f)
        {
            self.min_target_temp_f = defaults.min_target_temp_f;
            self.max_target_temp_f = defaults.max_target_temp_f;
        }
        if !self.default_target_temp_f.is_finite() {
            self.default_target_temp_f = defaults.default_target_temp_f;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceSourceConfig {
    pub url: String,
    pub region: String,
    pub fallback_price: f64,
}

impl Default for PriceSourceConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openenergydata.org/electricity_price".to_string(),
            region: "LA".to_string(),
            fallback_price: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub db_path: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            db_path: "thermostat_data.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// `{device}` is replaced by the device id (the thermostat's address).
    pub url_template: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            url_template: "http://{device}/tstat".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub price: PriceSourceConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub devices: DeviceConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.control.sanitize();
        self.policy.sanitize();
        if !self.price.fallback_price.is_finite() {
            self.price.fallback_price = PriceSourceConfig::default().fallback_price;
        }
        if !self.devices.url_template.contains("{device}") {
            self.devices.url_template = DeviceConfig::default().url_template;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_refresh_cycles_rounds_up() {
        let mut control = ControlConfig::default();
        assert_eq!(control.price_refresh_cycles(), 5);

        control.price_refresh_interval_secs = 301;
        assert_eq!(control.price_refresh_cycles(), 6);

        control.price_refresh_interval_secs = 30;
        assert_eq!(control.price_refresh_cycles(), 1);
    }

    #[test]
    fn sanitize_keeps_refresh_no_faster_than_scan() {
        let mut control = ControlConfig {
            scan_interval_secs: 120,
            price_refresh_interval_secs: 10,
            ..ControlConfig::default()
        };
        control.sanitize();

        assert_eq!(control.price_refresh_interval_secs, 120);
        assert_eq!(control.price_refresh_cycles(), 1);
    }

    #[test]
    fn policy_sanitize_restores_broken_bounds() {
        let mut policy = PolicyConfig {
            min_target_temp_f: 80.0,
            max_target_temp_f: 70.0,
            startup_cost: f64::NAN,
            min_runtime_hours: 9.0,
            max_runtime_hours: 6.0,
            ..PolicyConfig::default()
        };
        policy.sanitize();

        assert_eq!(policy.min_target_temp_f, 74.0);
        assert_eq!(policy.max_target_temp_f, 78.0);
        assert_eq!(policy.startup_cost, 10.0);
        assert_eq!(policy.min_runtime_hours, 6.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let raw = r#"{"control": {"scan_interval_secs": 30, "price_refresh_interval_secs": 90,
            "price_timeout_ms": 1000, "device_write_timeout_ms": 1000, "history_timeout_ms": 1000,
            "history_lookback_hours": 24, "history_failure_escalation": 3, "dry_run": false,
            "control_mode": "COOL"}}"#;
        let mut runtime: RuntimeConfig = serde_json::from_str(raw).unwrap();
        runtime.sanitize();

        assert!(!runtime.control.dry_run);
        assert_eq!(runtime.control.price_refresh_cycles(), 3);
        assert_eq!(runtime.policy.update_threshold_f, 0.5);
        assert_eq!(runtime.price.fallback_price, 0.15);
        assert_eq!(runtime.devices.url_template, "http://{device}/tstat");
    }

    #[test]
    fn sections_with_only_some_keys_keep_the_rest() {
        let raw = r#"{"control": {"dry_run": false}, "policy": {"update_threshold_f": 1.0}}"#;
        let runtime: RuntimeConfig = serde_json::from_str(raw).unwrap();

        assert!(!runtime.control.dry_run);
        assert_eq!(runtime.control.scan_interval_secs, 60);
        assert_eq!(runtime.policy.update_threshold_f, 1.0);
        assert_eq!(runtime.policy.startup_cost, 10.0);
        assert_eq!(runtime.price.region, "LA");
    }
}
