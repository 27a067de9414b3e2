use std::time::Duration;

use chrono::Utc;
use tokio::{sync::watch, time::Instant};
use tracing::{error, info, warn};

use crate::{
    config::RuntimeConfig,
    cycling::CyclingDetector,
    error::HistoryError,
    optimizer::OptimizationEngine,
    ports::{DeviceControl, HistoryStore, PriceSource},
    price::PriceOracle,
    throttle::ActuationThrottle,
    types::{CycleReport, DecisionOutcome, DeviceDecision, DeviceReading, PriceSample},
};

/// Requests termination of a running [`ControlLoop`]. The loop observes it
/// between cycles and while sleeping, never in the middle of a device.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

pub struct ControlLoop {
    scan_interval: Duration,
    price_refresh_cycles: u64,
    history_lookback: Duration,
    history_timeout: Duration,
    history_failure_escalation: u32,

    price_oracle: PriceOracle,
    cycling: CyclingDetector,
    engine: OptimizationEngine,
    throttle: ActuationThrottle,
    history: Box<dyn HistoryStore>,
    devices: Box<dyn DeviceControl>,

    cycle: u64,
    price: Option<PriceSample>,
    history_failures: u32,
    reports: watch::Sender<Option<CycleReport>>,
}

impl ControlLoop {
    pub fn new(
        config: &RuntimeConfig,
        price_source: Box<dyn PriceSource>,
        history: Box<dyn HistoryStore>,
        devices: Box<dyn DeviceControl>,
    ) -> Self {
        let control = &config.control;
        let (reports, _) = watch::channel(None);

        Self {
            scan_interval: Duration::from_secs(control.scan_interval_secs),
            price_refresh_cycles: control.price_refresh_cycles(),
            history_lookback: Duration::from_secs(control.history_lookback_hours * 3_600),
            history_timeout: Duration::from_millis(control.history_timeout_ms),
            history_failure_escalation: control.history_failure_escalation,
            price_oracle: PriceOracle::new(
                price_source,
                config.price.fallback_price,
                Duration::from_millis(control.price_timeout_ms),
            ),
            cycling: CyclingDetector::new(&config.policy),
            engine: OptimizationEngine::new(config.policy.clone()),
            throttle: ActuationThrottle::new(
                config.policy.update_threshold_f,
                control.control_mode,
                control.dry_run,
                Duration::from_millis(control.device_write_timeout_ms),
            ),
            history,
            devices,
            cycle: 0,
            price: None,
            history_failures: 0,
            reports,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<CycleReport>> {
        self.reports.subscribe()
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Consecutive cycles skipped because the history store failed.
    pub fn history_failures(&self) -> u32 {
        self.history_failures
    }

    pub fn cycling(&self) -> &CyclingDetector {
        &self.cycling
    }

    pub fn throttle(&self) -> &ActuationThrottle {
        &self.throttle
    }

    /// Runs cycles at the scan cadence until `shutdown` flips to true or its
    /// handle is dropped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "control loop started: scan every {}s, price every {} cycles, dry-run {}",
            self.scan_interval.as_secs(),
            self.price_refresh_cycles,
            self.throttle.is_dry_run()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let next_cycle = Instant::now() + self.scan_interval;
            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep_until(next_cycle) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("control loop stopped after {} cycles", self.cycle);
    }

    /// One full pass over the fleet, without any pacing delay.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let cycle = self.cycle;
        self.cycle = self.cycle.saturating_add(1);
        let started_at = Utc::now();
        info!("running HVAC optimization cycle {cycle}");

        let mut price_refreshed = false;
        if self.price.is_none() || cycle % self.price_refresh_cycles == 0 {
            self.price = Some(self.price_oracle.get_price().await);
            price_refreshed = true;
        }

        let mut report = CycleReport {
            cycle,
            started_at,
            price: self.price,
            price_refreshed,
            devices: Vec::new(),
            skipped: None,
        };

        let readings = match self.load_readings().await {
            Ok(readings) => {
                self.history_failures = 0;
                readings
            }
            Err(err) => {
                self.history_failures = self.history_failures.saturating_add(1);
                if self.history_failures >= self.history_failure_escalation {
                    error!(
                        "history store unavailable for {} consecutive cycles: {err:#}",
                        self.history_failures
                    );
                } else {
                    warn!("skipping cycle {cycle}, history store unavailable: {err:#}");
                }
                report.skipped = Some(err.to_string());
                self.publish(&report);
                return report;
            }
        };

        if let Some(price) = report.price {
            for reading in latest_per_device(readings) {
                let decision = self.decide(&price, &reading).await;
                report.devices.push(decision);
            }
        }

        info!(
            "cycle {cycle} done: {} devices, {} writes",
            report.devices.len(),
            report.applied_count()
        );
        self.publish(&report);
        report
    }

    async fn decide(&mut self, price: &PriceSample, reading: &DeviceReading) -> DeviceDecision {
        let device_id = reading.device_id.as_str();
        let cycling_penalty = self
            .cycling
            .penalty(device_id, reading.fan_state, reading.hvac_state);

        let outcome = match self
            .engine
            .optimize(device_id, price, reading, cycling_penalty)
        {
            Ok(result) => {
                info!(
                    device = device_id,
                    compressor_on = result.compressor_on,
                    runtime_hours = result.runtime_hours,
                    target_temp = result.target_temp,
                    "thermostat {device_id}: compressor {}, runtime {:.2} hrs, temp {:.2}F",
                    if result.compressor_on { "ON" } else { "OFF" },
                    result.runtime_hours,
                    result.target_temp
                );

                let throttled = self
                    .throttle
                    .maybe_apply(self.devices.as_ref(), &result)
                    .await;
                info!(
                    device = device_id,
                    applied = throttled.applied,
                    "throttle decision for {device_id}: {}",
                    throttled.decision.as_str()
                );

                DecisionOutcome::Recommended {
                    result,
                    throttle: throttled.decision,
                    applied: throttled.applied,
                }
            }
            Err(err) => {
                warn!("skipping thermostat {device_id} this cycle: {err:#}");
                DecisionOutcome::Skipped {
                    reason: err.to_string(),
                }
            }
        };

        DeviceDecision {
            device_id: device_id.to_string(),
            current_temp: reading.current_temp,
            cycling_penalty,
            outcome,
        }
    }

    async fn load_readings(&self) -> Result<Vec<DeviceReading>, HistoryError> {
        match tokio::time::timeout(
            self.history_timeout,
            self.history.load_readings(self.history_lookback),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(HistoryError::Timeout(
                self.history_timeout
                    .as_millis()
                    .try_into()
                    .unwrap_or(u64::MAX),
            )),
        }
    }

    fn publish(&self, report: &CycleReport) {
        self.reports.send_replace(Some(report.clone()));
    }
}

impl std::fmt::Debug for ControlLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLoop")
            .field("cycle", &self.cycle)
            .field("price", &self.price)
            .field("history_failures", &self.history_failures)
            .finish_non_exhaustive()
    }
}

/// Keeps the first (most recent) reading of each device, in first-seen order.
pub fn latest_per_device(readings: Vec<DeviceReading>) -> Vec<DeviceReading> {
    let mut seen = std::collections::HashSet::new();
    readings
        .into_iter()
        .filter(|reading| seen.insert(reading.device_id.clone()))
        .collect()
}
