use std::collections::HashMap;

use crate::{
    config::PolicyConfig,
    types::{FanState, HvacState},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclingState {
    pub last_fan_state: FanState,
    pub last_hvac_state: HvacState,
}

/// Remembers the last observed fan/HVAC state per device and prices the
/// start-ups seen since then.
#[derive(Debug, Clone)]
pub struct CyclingDetector {
    fan_cycle_penalty: f64,
    compressor_cycle_penalty: f64,
    states: HashMap<String, CyclingState>,
}

impl CyclingDetector {
    pub fn new(policy: &PolicyConfig) -> Self {
        Self {
            fan_cycle_penalty: policy.fan_cycle_penalty,
            compressor_cycle_penalty: policy.compressor_cycle_penalty,
            states: HashMap::new(),
        }
    }

    pub fn penalty(&mut self, device_id: &str, fan_state: FanState, hvac_state: HvacState) -> f64 {
        let next = CyclingState {
            last_fan_state: fan_state,
            last_hvac_state: hvac_state,
        };

        let Some(previous) = self.states.insert(device_id.to_string(), next) else {
            return 0.0;
        };

        let mut penalty = 0.0;
        if previous.last_fan_state == FanState::Off && fan_state == FanState::On {
            penalty += self.fan_cycle_penalty;
        }
        if previous.last_hvac_state == HvacState::Off && hvac_state.is_running() {
            penalty += self.compressor_cycle_penalty;
        }
        penalty
    }

    pub fn state(&self, device_id: &str) -> Option<&CyclingState> {
        self.states.get(device_id)
    }
}
