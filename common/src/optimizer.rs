use good_lp::{
    constraint, microlp, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel,
};

use crate::{
    config::PolicyConfig,
    error::SolverError,
    types::{DeviceReading, OptimizationResult, PriceSample},
};

/// Builds and solves one small mixed-integer model per device.
///
/// Variables are the compressor switch (binary), the runtime in hours and the
/// recommended target temperature. The objective is the startup cost of the
/// compressor plus the energy price of the runtime plus the cycling penalty
/// already incurred by the device. Devices never share a model.
#[derive(Debug, Clone)]
pub struct OptimizationEngine {
    policy: PolicyConfig,
}

impl OptimizationEngine {
    pub fn new(policy: PolicyConfig) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn optimize(
        &self,
        device_id: &str,
        price: &PriceSample,
        reading: &DeviceReading,
        cycling_penalty: f64,
    ) -> Result<OptimizationResult, SolverError> {
        if !reading.current_temp.is_finite() {
            return Err(SolverError::InvalidInput(format!(
                "current temperature {} is not finite",
                reading.current_temp
            )));
        }
        if !price.value.is_finite() {
            return Err(SolverError::InvalidInput(format!(
                "price {} is not finite",
                price.value
            )));
        }
        if !cycling_penalty.is_finite() {
            return Err(SolverError::InvalidInput(format!(
                "cycling penalty {cycling_penalty} is not finite"
            )));
        }

        let policy = &self.policy;
        let device_target = reading
            .target_temp
            .filter(|temp| temp.is_finite())
            .unwrap_or(policy.default_target_temp_f);

        let mut vars = ProblemVariables::new();
        let compressor = vars.add(variable().binary());
        let runtime = vars.add(variable().min(0.0).max(policy.max_runtime_hours));
        let target = vars.add(
            variable()
                .min(policy.min_target_temp_f)
                .max(policy.max_target_temp_f),
        );

        let objective: Expression = policy.startup_cost * compressor + price.value * runtime;

        // Running the compressor pulls the reachable target down by the comfort band.
        let band = policy.comfort_band_f;
        let target_ceiling = reading.current_temp + band;
        let target_floor = device_target - policy.max_undershoot_f;

        let solution = vars
            .minimise(objective)
            .using(microlp)
            .with(constraint!(target + band * compressor <= target_ceiling))
            .with(constraint!(runtime >= policy.min_runtime_hours))
            .with(constraint!(runtime <= policy.max_runtime_hours))
            .with(constraint!(target >= target_floor))
            .solve()
            .map_err(SolverError::from)?;

        let compressor_on = solution.value(compressor) > 0.5;
        let runtime_hours = solution
            .value(runtime)
            .clamp(0.0, policy.max_runtime_hours);
        let target_temp = solution
            .value(target)
            .clamp(policy.min_target_temp_f, policy.max_target_temp_f);

        let startup = if compressor_on { policy.startup_cost } else { 0.0 };
        let objective_cost = startup + runtime_hours * price.value + cycling_penalty;

        Ok(OptimizationResult {
            device_id: device_id.to_string(),
            compressor_on,
            runtime_hours,
            target_temp,
            objective_cost,
        })
    }
}

impl From<ResolutionError> for SolverError {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::Infeasible => Self::Infeasible,
            ResolutionError::Unbounded => Self::Unbounded,
            other => Self::Backend(other.to_string()),
        }
    }
}
