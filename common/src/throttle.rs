use std::{collections::HashMap, time::Duration};

use tracing::{info, warn};

use crate::{
    error::DeviceWriteError,
    ports::DeviceControl,
    types::{AppliedSetting, OptimizationResult, ThermostatMode, ThrottleDecision},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleOutcome {
    pub applied: bool,
    pub decision: ThrottleDecision,
}

/// Gates device writes behind a target-temperature hysteresis and remembers
/// the last setting each device accepted.
#[derive(Debug, Clone)]
pub struct ActuationThrottle {
    threshold_f: f64,
    mode: ThermostatMode,
    dry_run: bool,
    write_timeout: Duration,
    applied: HashMap<String, AppliedSetting>,
}

impl ActuationThrottle {
    pub fn new(
        threshold_f: f64,
        mode: ThermostatMode,
        dry_run: bool,
        write_timeout: Duration,
    ) -> Self {
        Self {
            threshold_f,
            mode,
            dry_run,
            write_timeout,
            applied: HashMap::new(),
        }
    }

    pub fn applied(&self, device_id: &str) -> Option<&AppliedSetting> {
        self.applied.get(device_id)
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn maybe_apply(
        &mut self,
        devices: &dyn DeviceControl,
        result: &OptimizationResult,
    ) -> ThrottleOutcome {
        let device_id = result.device_id.as_str();
        let delta = self
            .applied
            .get(device_id)
            .map(|last| (result.target_temp - last.target_temp).abs());

        let decision = match delta {
            None => ThrottleDecision::FirstWrite,
            Some(delta) if delta > self.threshold_f => ThrottleDecision::DeltaExceeded { delta },
            Some(delta) => {
                return ThrottleOutcome {
                    applied: false,
                    decision: ThrottleDecision::WithinThreshold { delta },
                };
            }
        };

        match self.write(devices, device_id, result.target_temp).await {
            Ok(()) => {
                self.applied.insert(
                    device_id.to_string(),
                    AppliedSetting {
                        device_id: device_id.to_string(),
                        target_temp: result.target_temp,
                        mode: self.mode,
                    },
                );
                ThrottleOutcome {
                    applied: true,
                    decision,
                }
            }
            Err(err) => {
                warn!("failed to update thermostat {device_id}: {err:#}");
                ThrottleOutcome {
                    applied: false,
                    decision: ThrottleDecision::WriteFailed {
                        delta,
                        error: err.to_string(),
                    },
                }
            }
        }
    }

    async fn write(
        &self,
        devices: &dyn DeviceControl,
        device_id: &str,
        target_temp_f: f64,
    ) -> Result<(), DeviceWriteError> {
        if self.dry_run {
            info!(
                "dry-run: thermostat {device_id} mode {} target {target_temp_f:.2}F",
                self.mode.as_str()
            );
            return Ok(());
        }

        let write = devices.write_setting(device_id, self.mode, target_temp_f);
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DeviceWriteError::Timeout(
                    self.write_timeout.as_millis().try_into().unwrap_or(u64::MAX),
                ))
            }
        }

        info!(
            "thermostat {device_id} updated: mode {} target {target_temp_f:.2}F",
            self.mode.as_str()
        );
        Ok(())
    }
}
