use std::{io::ErrorKind, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{net::TcpListener, sync::watch};
use tracing::{error, info, warn};

use hvac_optimizer_common::{
    device_decision_topic, ControlLoop, CycleReport, RuntimeConfig, ShutdownHandle,
    TOPIC_OPTIMIZER_CYCLE, TOPIC_OPTIMIZER_STATUS,
};

use crate::{
    devices::HttpThermostatClient, history::SqliteHistoryStore, price_feed::HttpPriceSource,
};

#[derive(Clone)]
struct AppState {
    reports: watch::Receiver<Option<CycleReport>>,
    config: Arc<RuntimeConfig>,
}

#[derive(Debug, Clone)]
struct ConfigStore {
    runtime_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::from_env();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime, |key| std::env::var(key).ok());
    runtime.sanitize();
    info!(
        "loaded config from {}: history {}, price {}",
        store.runtime_path.display(),
        runtime.history.db_path,
        runtime.price.url
    );

    let control = &runtime.control;
    let price_source = HttpPriceSource::new(
        runtime.price.url.clone(),
        runtime.price.region.clone(),
        Duration::from_millis(control.price_timeout_ms),
    )
    .context("failed to build price client")?;
    let devices = HttpThermostatClient::new(
        runtime.devices.url_template.clone(),
        Duration::from_millis(control.device_write_timeout_ms),
    )
    .context("failed to build thermostat client")?;
    let history = SqliteHistoryStore::new(runtime.history.db_path.clone());

    let mut control_loop = ControlLoop::new(
        &runtime,
        Box::new(price_source),
        Box::new(history),
        Box::new(devices),
    );
    let reports = control_loop.subscribe();

    let mut mqtt_options = MqttOptions::new(
        "hvac-optimizer-controller",
        runtime.network.mqtt_host.clone(),
        runtime.network.mqtt_port,
    );
    if !runtime.network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(
            runtime.network.mqtt_user.clone(),
            runtime.network.mqtt_pass.clone(),
        );
    }
    mqtt_options.set_last_will(rumqttc::LastWill::new(
        TOPIC_OPTIMIZER_STATUS,
        "offline",
        QoS::AtLeastOnce,
        true,
    ));
    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    mqtt.publish(TOPIC_OPTIMIZER_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to queue optimizer online status")?;

    spawn_mqtt_loop(eventloop);
    spawn_report_publish_loop(mqtt.clone(), reports.clone());

    let http_port = runtime.network.http_port;
    let app_state = AppState {
        reports,
        config: Arc::new(runtime),
    };
    let app = router(app_state);
    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind status server at {addr}"))?;
    info!("status api listening on http://{addr}");
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!("status api stopped: {err}");
        }
    });

    let (shutdown_handle, shutdown) = ShutdownHandle::new();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(err) => warn!("failed to listen for ctrl-c: {err}"),
        }
        shutdown_handle.stop();
    });

    control_loop.run(shutdown).await;

    if let Err(err) = mqtt
        .publish(TOPIC_OPTIMIZER_STATUS, QoS::AtLeastOnce, true, "offline")
        .await
    {
        warn!("failed to publish offline status: {err}");
    }
    Ok(())
}

fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/config", get(handle_get_config))
        .with_state(app_state)
}

fn spawn_mqtt_loop(mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_report_publish_loop(mqtt: AsyncClient, mut reports: watch::Receiver<Option<CycleReport>>) {
    tokio::spawn(async move {
        while reports.changed().await.is_ok() {
            let Some(report) = reports.borrow_and_update().clone() else {
                continue;
            };

            match serde_json::to_vec(&report) {
                Ok(body) => {
                    if let Err(err) = mqtt
                        .publish(TOPIC_OPTIMIZER_CYCLE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("cycle report publish failed: {err}");
                    }
                }
                Err(err) => warn!("cycle report serialization failed: {err}"),
            }

            for decision in &report.devices {
                let body = match serde_json::to_vec(decision) {
                    Ok(body) => body,
                    Err(err) => {
                        warn!("decision serialization failed: {err}");
                        continue;
                    }
                };
                if let Err(err) = mqtt
                    .publish(
                        device_decision_topic(&decision.device_id),
                        QoS::AtLeastOnce,
                        true,
                        body,
                    )
                    .await
                {
                    warn!("decision publish for {} failed: {err}", decision.device_id);
                }
            }
        }
    });
}

async fn handle_get_status(State(state): State<AppState>) -> axum::response::Response {
    let latest = state.reports.borrow().clone();
    match latest {
        Some(report) => Json(report).into_response(),
        None => error_response(StatusCode::SERVICE_UNAVAILABLE, "no cycle has completed yet"),
    }
}

async fn handle_get_config(State(state): State<AppState>) -> axum::response::Response {
    Json(redacted_config(&state.config)).into_response()
}

fn redacted_config(config: &RuntimeConfig) -> RuntimeConfig {
    let mut view = config.clone();
    if !view.network.mqtt_pass.is_empty() {
        view.network.mqtt_pass = "********".to_string();
    }
    view
}

impl ConfigStore {
    fn from_env() -> Self {
        let data_dir = std::env::var("HVAC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.hvac-optimizer"));
        Self::new(data_dir)
    }

    fn new(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: data_dir.join("runtime.json"),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(&self.runtime_path).await {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
                .with_context(|| format!("invalid config in {}", self.runtime_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn apply_env_overrides(runtime: &mut RuntimeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("MQTT_HOST") {
        runtime.network.mqtt_host = host;
    }
    if let Some(port) = lookup("MQTT_PORT").and_then(|value| value.parse::<u16>().ok()) {
        runtime.network.mqtt_port = port;
    }
    if let Some(user) = lookup("MQTT_USER") {
        runtime.network.mqtt_user = user;
        runtime.network.mqtt_pass = lookup("MQTT_PASS").unwrap_or_default();
    }
    if let Some(port) = lookup("HVAC_HTTP_PORT").and_then(|value| value.parse::<u16>().ok()) {
        runtime.network.http_port = port;
    }
    if let Some(dry_run) = lookup("HVAC_DRY_RUN").and_then(|value| parse_flag(&value)) {
        runtime.control.dry_run = dry_run;
    }
    if let Some(path) = lookup("HVAC_HISTORY_DB") {
        runtime.history.db_path = path;
    }
    if let Some(url) = lookup("HVAC_PRICE_URL") {
        runtime.price.url = url;
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn env_overrides_replace_stored_values() {
        let mut runtime = RuntimeConfig::default();
        apply_env_overrides(
            &mut runtime,
            env(&[
                ("MQTT_HOST", "broker.local"),
                ("MQTT_PORT", "8883"),
                ("MQTT_USER", "hvac"),
                ("MQTT_PASS", "secret"),
                ("HVAC_DRY_RUN", "false"),
                ("HVAC_HISTORY_DB", "/var/lib/hvac/scan.db"),
            ]),
        );

        assert_eq!(runtime.network.mqtt_host, "broker.local");
        assert_eq!(runtime.network.mqtt_port, 8883);
        assert_eq!(runtime.network.mqtt_user, "hvac");
        assert_eq!(runtime.network.mqtt_pass, "secret");
        assert!(!runtime.control.dry_run);
        assert_eq!(runtime.history.db_path, "/var/lib/hvac/scan.db");
    }

    #[test]
    fn unparseable_env_values_are_ignored() {
        let mut runtime = RuntimeConfig::default();
        apply_env_overrides(
            &mut runtime,
            env(&[("MQTT_PORT", "not-a-port"), ("HVAC_DRY_RUN", "maybe")]),
        );

        assert_eq!(runtime.network.mqtt_port, 1883);
        assert!(runtime.control.dry_run);
    }

    #[tokio::test]
    async fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());

        let runtime = store.load_runtime_config().await.unwrap();

        assert_eq!(runtime.control.scan_interval_secs, 60);
    }

    #[tokio::test]
    async fn stored_config_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut stored = RuntimeConfig::default();
        stored.policy.update_threshold_f = 1.0;
        stored.price.region = "SF".to_string();
        tokio::fs::write(
            dir.path().join("runtime.json"),
            serde_json::to_vec_pretty(&stored).unwrap(),
        )
        .await
        .unwrap();

        let runtime = ConfigStore::new(dir.path().to_path_buf())
            .load_runtime_config()
            .await
            .unwrap();

        assert_eq!(runtime.policy.update_threshold_f, 1.0);
        assert_eq!(runtime.price.region, "SF");
    }

    #[tokio::test]
    async fn corrupt_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("runtime.json"), b"{not json")
            .await
            .unwrap();

        let result = ConfigStore::new(dir.path().to_path_buf())
            .load_runtime_config()
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn status_is_unavailable_before_first_cycle() {
        let (_tx, reports) = watch::channel(None);
        let state = AppState {
            reports,
            config: Arc::new(RuntimeConfig::default()),
        };

        let response = handle_get_status(State(state)).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn status_serves_latest_report() {
        let (tx, reports) = watch::channel(None);
        tx.send_replace(Some(CycleReport {
            cycle: 4,
            started_at: Utc::now(),
            price: None,
            price_refreshed: false,
            devices: Vec::new(),
            skipped: None,
        }));
        let state = AppState {
            reports,
            config: Arc::new(RuntimeConfig::default()),
        };

        let response = handle_get_status(State(state)).await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn config_view_hides_mqtt_password() {
        let mut runtime = RuntimeConfig::default();
        runtime.network.mqtt_pass = "hunter2".to_string();

        let view = redacted_config(&runtime);

        assert_eq!(view.network.mqtt_pass, "********");
        assert_eq!(runtime.network.mqtt_pass, "hunter2");
    }
}
