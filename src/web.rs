use crate::config::AppConfig;
use crate::model::{DeviceConfig, ManualCommand, Mode, TelemetrySample};
use crate::page::Page;
use crate::simulator::ModeRunner;
use crate::sync;
use crate::ui;
use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket};
use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, broadcast};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub device: Arc<RwLock<DeviceConfig>>,
    pub telemetry_tx: broadcast::Sender<TelemetrySample>,
    pub runner: Arc<ModeRunner>,
    pub manual_pins: Arc<RwLock<BTreeMap<String, bool>>>,
}

impl AppState {
    pub fn new(config: AppConfig, device: DeviceConfig) -> Self {
        let (telemetry_tx, _) = broadcast::channel(64);
        Self {
            config: Arc::new(config),
            device: Arc::new(RwLock::new(device)),
            runner: Arc::new(ModeRunner::new(telemetry_tx.clone())),
            telemetry_tx,
            manual_pins: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/config", get(get_config).post(update_config))
        .route("/shutdown", post(shutdown))
        .route("/ws", get(ws_live))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState) -> Result<()> {
    let addr: SocketAddr = state
        .config
        .http_bind
        .parse()
        .with_context(|| format!("Invalid HTTP_BIND '{}'", state.config.http_bind))?;
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Panel listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(graceful_shutdown())
        .await?;

    Ok(())
}

async fn graceful_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down http server");
}

async fn index(State(state): State<AppState>) -> Result<impl IntoResponse, (StatusCode, String)> {
    let config = state.device.read().await.clone();
    let document = serde_json::to_value(&config).map_err(|err| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode config: {err}"),
        )
    })?;
    let mut page = Page::device_layout();
    sync::populate(&mut page, &document).map_err(|err| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to build page: {err}"),
        )
    })?;
    Ok(Html(ui::render_html(&page)))
}

async fn get_config(State(state): State<AppState>) -> Json<DeviceConfig> {
    Json(state.device.read().await.clone())
}

async fn update_config(
    State(state): State<AppState>,
    Json(body): Json<DeviceConfig>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Updating config for mode {}", body.sys.mode);
    {
        let mut device = state.device.write().await;
        apply_update(&mut device, &body);
    }
    state.runner.start(&body.sys).await;
    Ok(StatusCode::OK)
}

/// Stores only the sections the posted mode uses.
pub fn apply_update(device: &mut DeviceConfig, update: &DeviceConfig) {
    match &update.sys.mode {
        Mode::Standalone => {
            device.sys = update.sys.clone();
            device.modbus = update.modbus.clone();
        }
        Mode::Simulator => {
            device.sys = update.sys.clone();
        }
        Mode::Subscriber => {
            device.sys = update.sys.clone();
            device.mqtt = update.mqtt.clone();
        }
        Mode::Publisher => {
            device.modbus = update.modbus.clone();
            device.mqtt = update.mqtt.clone();
        }
        Mode::Unknown(raw) => {
            tracing::warn!("Not storing anything for unknown mode '{raw}'");
        }
    }
}

async fn shutdown(State(state): State<AppState>) -> Result<impl IntoResponse, (StatusCode, String)> {
    let command = state.config.shutdown_command.clone();
    tokio::task::spawn_blocking(move || run_shutdown(&command))
        .await
        .map_err(|err| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Task join error: {err}"),
            )
        })?
        .map_err(|err| {
            tracing::error!("Shutdown failed: {err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Shutdown failed: {err}"),
            )
        })?;

    tracing::info!("Shutdown requested via UI");
    Ok(StatusCode::ACCEPTED)
}

fn run_shutdown(command: &[String]) -> Result<()> {
    let (program, args) = command
        .split_first()
        .context("Shutdown command is empty")?;
    let status = std::process::Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("Failed to run {program}"))?;

    if status.success() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{program} exited with status {status}"))
    }
}

async fn ws_live(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: AppState) {
    let mut rx = state.telemetry_tx.subscribe();
    loop {
        tokio::select! {
            sample = rx.recv() => match sample {
                Ok(sample) => {
                    let Some(payload) = encode_sample(&sample) else {
                        continue;
                    };
                    if socket.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Socket lagging, skipped {skipped} samples");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => handle_command(&state, &text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!("Websocket failed: {err}");
                    break;
                }
            },
        }
    }
}

fn encode_sample(sample: &TelemetrySample) -> Option<String> {
    match serde_json::to_string(sample) {
        Ok(payload) => Some(payload),
        Err(err) => {
            tracing::debug!("Skipping sample that failed to encode: {err}");
            None
        }
    }
}

async fn handle_command(state: &AppState, text: &str) {
    match serde_json::from_str::<ManualCommand>(text) {
        Ok(command) => {
            tracing::info!(
                "Manual command: pin {} -> {}",
                command.pin,
                if command.enabled { "on" } else { "off" }
            );
            state
                .manual_pins
                .write()
                .await
                .insert(command.pin, command.enabled);
        }
        Err(err) => tracing::warn!("Ignoring socket message {text:?}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(mode: Mode) -> DeviceConfig {
        let mut config = DeviceConfig::default();
        config.sys.mode = mode;
        config.sys.alarm_pin = "X1".into();
        config.modbus.port = 9;
        config.mqtt.topic = "Other".into();
        config
    }

    #[test]
    fn update_stores_sections_for_mode() {
        let mut device = DeviceConfig::default();
        apply_update(&mut device, &update(Mode::Simulator));
        assert_eq!(device.sys.alarm_pin, "X1");
        assert_eq!(device.modbus.port, 1502);
        assert_eq!(device.mqtt.topic, "Power");

        let mut device = DeviceConfig::default();
        apply_update(&mut device, &update(Mode::Standalone));
        assert_eq!(device.sys.mode, Mode::Standalone);
        assert_eq!(device.modbus.port, 9);
        assert_eq!(device.mqtt.topic, "Power");

        let mut device = DeviceConfig::default();
        apply_update(&mut device, &update(Mode::Subscriber));
        assert_eq!(device.modbus.port, 1502);
        assert_eq!(device.mqtt.topic, "Other");
    }

    #[test]
    fn publisher_update_keeps_sys() {
        let mut device = DeviceConfig::default();
        apply_update(&mut device, &update(Mode::Publisher));
        assert_eq!(device.sys, DeviceConfig::default().sys);
        assert_eq!(device.modbus.port, 9);
        assert_eq!(device.mqtt.topic, "Other");
    }

    #[test]
    fn unknown_mode_update_changes_nothing() {
        let mut device = DeviceConfig::default();
        apply_update(&mut device, &update(Mode::Unknown("Turbo".into())));
        assert_eq!(device, DeviceConfig::default());
    }

    #[test]
    fn sample_encodes_with_dashboard_keys() {
        let sample = TelemetrySample {
            load: 70,
            pv: 30,
            grid: 40,
            status: "NA".into(),
        };
        let payload = encode_sample(&sample).unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&payload).unwrap(),
            serde_json::json!({"load": 70, "PV": 30, "grid": 40, "status": "NA"})
        );
    }

    #[test]
    fn empty_shutdown_command_is_an_error() {
        assert!(run_shutdown(&[]).is_err());
    }
}
