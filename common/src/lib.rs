pub mod config;
pub mod cycling;
pub mod error;
pub mod optimizer;
pub mod ports;
pub mod price;
pub mod scheduler;
pub mod throttle;
pub mod topics;
pub mod types;

pub use config::{
    ControlConfig, DeviceConfig, HistoryConfig, NetworkConfig, PolicyConfig, PriceSourceConfig,
    RuntimeConfig,
};
pub use cycling::{CyclingDetector, CyclingState};
pub use error::{DeviceWriteError, HistoryError, PriceError, SolverError};
pub use optimizer::OptimizationEngine;
pub use ports::{DeviceControl, HistoryStore, PriceSource};
pub use price::PriceOracle;
pub use scheduler::{ControlLoop, ShutdownHandle};
pub use throttle::{ActuationThrottle, ThrottleOutcome};
pub use topics::*;
pub use types::{
    AppliedSetting, CycleReport, DecisionOutcome, DeviceDecision, DeviceReading, FanState,
    HvacState, OptimizationResult, PriceSample, ThermostatMode, ThrottleDecision,
};
