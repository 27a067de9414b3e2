use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HvacState {
    Off,
    Heat,
    Cool,
}

impl HvacState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heat => "HEAT",
            Self::Cool => "COOL",
        }
    }

    /// Decodes the thermostat's `tstate` field.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Off),
            1 => Some(Self::Heat),
            2 => Some(Self::Cool),
            _ => None,
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, Self::Heat | Self::Cool)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FanState {
    Off,
    On,
}

impl FanState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }

    /// Decodes the thermostat's `fstate` field.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Off),
            1 => Some(Self::On),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThermostatMode {
    Off,
    Heat,
    Cool,
    Auto,
}

impl ThermostatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heat => "HEAT",
            Self::Cool => "COOL",
            Self::Auto => "AUTO",
        }
    }

    /// Value of the `tmode` field in a device write.
    pub fn code(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Heat => 1,
            Self::Cool => 2,
            Self::Auto => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReading {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "currentTemp")]
    pub current_temp: f64,
    #[serde(rename = "targetTemp")]
    pub target_temp: Option<f64>,
    #[serde(rename = "hvacState")]
    pub hvac_state: HvacState,
    #[serde(rename = "fanState")]
    pub fan_state: FanState,
    #[serde(rename = "observedAt")]
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub value: f64,
    #[serde(rename = "obtainedAt")]
    pub obtained_at: DateTime<Utc>,
    #[serde(rename = "isFallback")]
    pub is_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "compressorOn")]
    pub compressor_on: bool,
    #[serde(rename = "runtimeHours")]
    pub runtime_hours: f64,
    #[serde(rename = "targetTemp")]
    pub target_temp: f64,
    #[serde(rename = "objectiveCost")]
    pub objective_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedSetting {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "targetTemp")]
    pub target_temp: f64,
    pub mode: ThermostatMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThrottleDecision {
    FirstWrite,
    DeltaExceeded { delta: f64 },
    WithinThreshold { delta: f64 },
    WriteFailed { delta: Option<f64>, error: String },
}

impl ThrottleDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstWrite => "FIRST_WRITE",
            Self::DeltaExceeded { .. } => "DELTA_EXCEEDED",
            Self::WithinThreshold { .. } => "WITHIN_THRESHOLD",
            Self::WriteFailed { .. } => "WRITE_FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionOutcome {
    Recommended {
        result: OptimizationResult,
        throttle: ThrottleDecision,
        applied: bool,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceDecision {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "currentTemp")]
    pub current_temp: f64,
    #[serde(rename = "cyclingPenalty")]
    pub cycling_penalty: f64,
    pub outcome: DecisionOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    pub price: Option<PriceSample>,
    #[serde(rename = "priceRefreshed")]
    pub price_refreshed: bool,
    pub devices: Vec<DeviceDecision>,
    pub skipped: Option<String>,
}

impl CycleReport {
    pub fn applied_count(&self) -> usize {
        self.devices
            .iter()
            .filter(|decision| {
                matches!(
                    decision.outcome,
                    DecisionOutcome::Recommended { applied: true, .. }
                )
            })
            .count()
    }
}
