//! Live socket to the device: telemetry in, manual commands out.
//!
//! [`LiveChannel`] is the connection state machine and is driven one event at
//! a time by its owner. [`connect`] runs the actual websocket on a task and
//! feeds the owner through a channel.

use crate::codec::display_text;
use crate::error::{PanelError, PanelResult};
use crate::model::ManualCommand;
use crate::page::Dashboard;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

pub const SOCKET_PATH: &str = "/ws";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Frame(String),
    Error(String),
    Closed,
}

#[derive(Debug, Deserialize)]
struct TelemetryFrame {
    load: Option<Value>,
    #[serde(rename = "PV")]
    pv: Option<Value>,
    grid: Option<Value>,
    status: Option<Value>,
}

#[derive(Debug)]
pub struct LiveChannel {
    state: ChannelState,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

impl LiveChannel {
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            state: ChannelState::Connecting,
            outbound: Some(outbound),
        }
    }

    pub fn detached() -> Self {
        Self {
            state: ChannelState::Closed,
            outbound: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn handle(&mut self, event: ChannelEvent, dashboard: &mut Dashboard) {
        match event {
            ChannelEvent::Opened => {
                if self.state == ChannelState::Connecting {
                    tracing::info!("Live channel open");
                    self.state = ChannelState::Open;
                }
            }
            ChannelEvent::Frame(text) => {
                if self.state != ChannelState::Open {
                    tracing::debug!("Dropping frame received while {:?}", self.state);
                    return;
                }
                if let Err(err) = apply_frame(&text, dashboard) {
                    tracing::warn!("Discarding telemetry frame: {err}");
                }
            }
            ChannelEvent::Error(reason) => {
                tracing::warn!("Live channel error: {reason}");
                self.close();
            }
            ChannelEvent::Closed => {
                if self.state != ChannelState::Closed {
                    tracing::info!("Live channel closed");
                }
                self.close();
            }
        }
    }

    /// Closing is final; a new channel is needed to reconnect.
    pub fn close(&mut self) {
        self.state = ChannelState::Closed;
        self.outbound = None;
    }

    pub fn send(&self, command: &ManualCommand) -> PanelResult<()> {
        let outbound = match (&self.state, &self.outbound) {
            (ChannelState::Open, Some(outbound)) => outbound,
            _ => {
                return Err(PanelError::Transport(format!(
                    "live channel is {:?}, command for {} not sent",
                    self.state, command.pin
                )));
            }
        };
        let text = serde_json::to_string(command)?;
        outbound
            .send(text)
            .map_err(|_| PanelError::Transport("live channel writer has stopped".into()))
    }
}

/// Updates the dashboard from one telemetry frame. Keys that are missing or
/// null keep their previous text.
pub fn apply_frame(text: &str, dashboard: &mut Dashboard) -> PanelResult<()> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(PanelError::Protocol("telemetry frame is not an object".into()));
    }
    let frame: TelemetryFrame = serde_json::from_value(value)?;
    let targets = [
        (frame.load, &mut dashboard.load),
        (frame.pv, &mut dashboard.pv),
        (frame.grid, &mut dashboard.grid),
        (frame.status, &mut dashboard.status),
    ];
    for (value, label) in targets {
        if let Some(value) = value {
            *label = display_text(&value);
        }
    }
    Ok(())
}

pub fn socket_url(page_url: &str) -> PanelResult<String> {
    let (scheme, rest) = page_url
        .split_once("://")
        .ok_or_else(|| PanelError::Protocol(format!("no scheme in page url '{page_url}'")))?;
    let socket_scheme = match scheme.to_ascii_lowercase().as_str() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(PanelError::Protocol(format!(
                "unsupported page scheme '{other}'"
            )));
        }
    };
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(PanelError::Protocol(format!("no host in page url '{page_url}'")));
    }
    Ok(format!("{socket_scheme}://{host}{SOCKET_PATH}"))
}

/// Opens the websocket on a background task. Returns the outbound sender for
/// [`LiveChannel::new`] and the event stream to feed into
/// [`LiveChannel::handle`]. The stream always ends with [`ChannelEvent::Closed`].
pub fn connect(
    url: String,
) -> (
    mpsc::UnboundedSender<String>,
    mpsc::UnboundedReceiver<ChannelEvent>,
) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(drive(url, out_rx, event_tx));
    (out_tx, event_rx)
}

async fn drive(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(err) => {
            let _ = events.send(ChannelEvent::Error(format!("connect {url}: {err}")));
            let _ = events.send(ChannelEvent::Closed);
            return;
        }
    };
    let _ = events.send(ChannelEvent::Opened);
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some(text) => {
                    if let Err(err) = sink.send(Message::Text(text)).await {
                        let _ = events.send(ChannelEvent::Error(err.to_string()));
                        break;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if events.send(ChannelEvent::Frame(text)).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    let _ = events.send(ChannelEvent::Error(err.to_string()));
                    break;
                }
            },
        }
    }
    let _ = events.send(ChannelEvent::Closed);
}
