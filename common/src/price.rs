use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::{error::PriceError, ports::PriceSource, types::PriceSample};

/// Wraps a live price feed and never fails: any error or timeout yields the
/// configured fallback price flagged with `is_fallback`.
pub struct PriceOracle {
    source: Box<dyn PriceSource>,
    fallback_price: f64,
    timeout: Duration,
}

impl PriceOracle {
    pub fn new(source: Box<dyn PriceSource>, fallback_price: f64, timeout: Duration) -> Self {
        Self {
            source,
            fallback_price,
            timeout,
        }
    }

    pub fn fallback_price(&self) -> f64 {
        self.fallback_price
    }

    pub async fn get_price(&self) -> PriceSample {
        let fetched = match tokio::time::timeout(self.timeout, self.source.current_price()).await {
            Ok(result) => result,
            Err(_) => Err(PriceError::Timeout(
                self.timeout.as_millis().try_into().unwrap_or(u64::MAX),
            )),
        };

        match fetched.and_then(validate_price) {
            Ok(value) => {
                info!("updated electricity price: ${value:.2}/kWh");
                PriceSample {
                    value,
                    obtained_at: Utc::now(),
                    is_fallback: false,
                }
            }
            Err(err) => {
                warn!(
                    "price source unavailable, using fallback ${:.2}/kWh: {err:#}",
                    self.fallback_price
                );
                PriceSample {
                    value: self.fallback_price,
                    obtained_at: Utc::now(),
                    is_fallback: true,
                }
            }
        }
    }
}

impl std::fmt::Debug for PriceOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceOracle")
            .field("fallback_price", &self.fallback_price)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn validate_price(value: f64) -> Result<f64, PriceError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PriceError::Malformed(format!("price {value} is not finite")))
    }
}
