use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};

use hvac_optimizer_common::{DeviceControl, DeviceWriteError, ThermostatMode};

/// Writes setpoints to Wi-Fi thermostats that expose `POST /tstat`.
#[derive(Debug, Clone)]
pub struct HttpThermostatClient {
    client: Client,
    url_template: String,
}

impl HttpThermostatClient {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url_template: url_template.into(),
        })
    }

    fn url_for(&self, device_id: &str) -> String {
        self.url_template.replace("{device}", device_id)
    }
}

/// `{"tmode": 2, "t_cool": 76.0}`; heating and other modes set `t_heat`.
pub fn setpoint_payload(mode: ThermostatMode, target_temp_f: f64) -> Value {
    let key = if mode == ThermostatMode::Cool {
        "t_cool"
    } else {
        "t_heat"
    };
    let mut payload = Map::new();
    payload.insert("tmode".to_string(), json!(mode.code()));
    payload.insert(key.to_string(), json!(target_temp_f));
    Value::Object(payload)
}

#[async_trait]
impl DeviceControl for HttpThermostatClient {
    async fn write_setting(
        &self,
        device_id: &str,
        mode: ThermostatMode,
        target_temp_f: f64,
    ) -> Result<(), DeviceWriteError> {
        let response = self
            .client
            .post(self.url_for(device_id))
            .json(&setpoint_payload(mode, target_temp_f))
            .send()
            .await
            .map_err(|err| DeviceWriteError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeviceWriteError::Status(status.as_u16()))
        }
    }
}
