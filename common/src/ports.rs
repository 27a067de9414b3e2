//! Boundaries to the outside world. The control loop only talks to the
//! history store, the price feed and the thermostats through these traits.

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    error::{DeviceWriteError, HistoryError, PriceError},
    types::{DeviceReading, ThermostatMode},
};

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current price in currency per kWh.
    async fn current_price(&self) -> Result<f64, PriceError>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Readings newer than `lookback`, grouped by device, most recent first.
    async fn load_readings(&self, lookback: Duration) -> Result<Vec<DeviceReading>, HistoryError>;
}

#[async_trait]
pub trait DeviceControl: Send + Sync {
    async fn write_setting(
        &self,
        device_id: &str,
        mode: ThermostatMode,
        target_temp_f: f64,
    ) -> Result<(), DeviceWriteError>;
}
