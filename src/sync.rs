use crate::codec::{collect, decode};
use crate::error::{PanelError, PanelResult};
use crate::live::{ChannelEvent, ChannelState, LiveChannel};
use crate::mode;
use crate::model::Mode;
use crate::page::{Page, SectionId};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

#[async_trait]
pub trait ConfigApi: Send + Sync {
    async fn fetch_config(&self) -> PanelResult<Value>;
    async fn store_config(&self, config: &Value) -> PanelResult<()>;
    async fn shutdown(&self) -> PanelResult<()>;
}

#[derive(Clone, Debug)]
pub struct HttpConfigApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpConfigApi {
    pub fn new(base_url: impl Into<String>) -> PanelResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { base_url, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl ConfigApi for HttpConfigApi {
    async fn fetch_config(&self) -> PanelResult<Value> {
        let res = self.client.get(self.url("/config")).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(PanelError::Transport(format!("GET /config returned {status}")));
        }
        res.json::<Value>()
            .await
            .map_err(|err| PanelError::Protocol(format!("config body: {err}")))
    }

    async fn store_config(&self, config: &Value) -> PanelResult<()> {
        let res = self
            .client
            .post(self.url("/config"))
            .json(config)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            return Err(PanelError::Transport(format!("POST /config returned {status}")));
        }
        Ok(())
    }

    async fn shutdown(&self) -> PanelResult<()> {
        let res = self.client.post(self.url("/shutdown")).send().await?;
        tracing::debug!("Shutdown request answered with {}", res.status());
        Ok(())
    }
}

/// Naming of the first config section, which differs between device
/// generations. Older devices also have no modbus section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Generation {
    #[default]
    Current,
    Legacy,
}

impl Generation {
    pub fn sys_key(self) -> &'static str {
        match self {
            Generation::Current => "sys",
            Generation::Legacy => "user",
        }
    }
}

struct LoadedConfig<'a> {
    generation: Generation,
    sys: &'a Map<String, Value>,
    modbus: Option<&'a Map<String, Value>>,
    mqtt: Option<&'a Map<String, Value>>,
}

impl<'a> LoadedConfig<'a> {
    fn parse(config: &'a Value) -> PanelResult<Self> {
        let root = config
            .as_object()
            .ok_or_else(|| PanelError::Protocol("config is not an object".into()))?;
        let (generation, sys) = match (root.get("sys"), root.get("user")) {
            (Some(sys), _) => (Generation::Current, sys),
            (None, Some(user)) => (Generation::Legacy, user),
            (None, None) => {
                return Err(PanelError::Protocol("config has no sys section".into()));
            }
        };
        let sys = sys
            .as_object()
            .ok_or_else(|| PanelError::Protocol("sys section is not an object".into()))?;
        Ok(Self {
            generation,
            sys,
            modbus: section(root, "modbus")?,
            mqtt: section(root, "mqtt")?,
        })
    }

    fn mode(&self) -> Option<Mode> {
        self.sys.get("mode").and_then(Value::as_str).map(Mode::parse)
    }
}

fn section<'a>(
    root: &'a Map<String, Value>,
    name: &str,
) -> PanelResult<Option<&'a Map<String, Value>>> {
    match root.get(name) {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(PanelError::Protocol(format!(
            "{name} section is not an object"
        ))),
    }
}

pub struct ConfigSyncClient<A> {
    api: A,
    generation: Generation,
}

impl<A: ConfigApi> ConfigSyncClient<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            generation: Generation::default(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub async fn load(&mut self, page: &mut Page) -> PanelResult<()> {
        let config = match self.api.fetch_config().await {
            Ok(config) => config,
            Err(err) => {
                report(page, "Loading configuration", &err);
                return Err(err);
            }
        };
        match populate(page, &config) {
            Ok(generation) => {
                self.generation = generation;
                Ok(())
            }
            Err(err) => {
                tracing::warn!("Ignoring configuration response: {err}");
                Err(err)
            }
        }
    }

    /// Collects the page, sends it to the device and rebuilds the manual
    /// controls from what was collected, whether or not the device accepted it.
    pub async fn save(&mut self, page: &mut Page) -> PanelResult<()> {
        let mut sys = collect(&page.sys);
        sys.insert("mode".into(), Value::String(page.mode_selector.clone()));

        let mut payload = Map::new();
        payload.insert(
            self.generation.sys_key().into(),
            Value::Object(sys.clone()),
        );
        if self.generation == Generation::Current {
            payload.insert("modbus".into(), Value::Object(collect(&page.modbus)));
        }
        payload.insert("mqtt".into(), Value::Object(collect(&page.mqtt)));

        let result = self.api.store_config(&Value::Object(payload)).await;
        match &result {
            Ok(()) => {
                tracing::info!("Configuration saved (mode {})", page.mode_selector);
                page.alert = None;
            }
            Err(err) => report(page, "Saving configuration", err),
        }
        page.manual.rebuild(&sys);
        result
    }

    pub async fn shutdown(&self, page: &mut Page) -> PanelResult<()> {
        let result = self.api.shutdown().await;
        if let Err(err) = &result {
            report(page, "Shutdown request", err);
        }
        result
    }
}

/// Writes a full configuration document into `page`: section fields, mode
/// selector, manual-enabled latch, manual controls and visibility. The
/// document is validated first so a bad one changes nothing.
pub fn populate(page: &mut Page, config: &Value) -> PanelResult<Generation> {
    let loaded = LoadedConfig::parse(config)?;
    apply_config(page, &loaded);
    Ok(loaded.generation)
}

fn apply_config(page: &mut Page, loaded: &LoadedConfig<'_>) {
    decode(SectionId::Sys.prefix(), loaded.sys, &mut page.sys);
    if let Some(modbus) = loaded.modbus {
        decode(SectionId::Modbus.prefix(), modbus, &mut page.modbus);
    }
    if let Some(mqtt) = loaded.mqtt {
        decode(SectionId::Mqtt.prefix(), mqtt, &mut page.mqtt);
    }
    match loaded.mode() {
        Some(mode) => {
            page.mode_selector = mode.to_string();
            mode::latch_manual(page, &mode);
        }
        None => tracing::warn!("Configuration has no mode, keeping selector"),
    }
    page.manual.build(loaded.sys);
    // An unknown mode is logged by the policy and leaves visibility as it was.
    let _ = mode::apply(page);
    page.alert = None;
}

fn report(page: &mut Page, action: &str, err: &PanelError) {
    tracing::error!("{action} failed: {err}");
    page.alert = Some(format!("{action} failed: {err}"));
}

pub struct ControlPanel<A> {
    pub page: Page,
    sync: ConfigSyncClient<A>,
    channel: LiveChannel,
}

impl<A: ConfigApi> ControlPanel<A> {
    pub fn new(page: Page, api: A, channel: LiveChannel) -> Self {
        Self {
            page,
            sync: ConfigSyncClient::new(api),
            channel,
        }
    }

    pub async fn load(&mut self) -> PanelResult<()> {
        self.sync.load(&mut self.page).await
    }

    pub async fn save(&mut self) -> PanelResult<()> {
        self.sync.save(&mut self.page).await
    }

    pub async fn shutdown(&mut self) -> PanelResult<()> {
        self.sync.shutdown(&mut self.page).await
    }

    pub fn on_mode_change(&mut self, value: &str) {
        self.page.mode_selector = value.to_string();
        let _ = mode::apply(&mut self.page);
    }

    pub fn toggle_manual(&mut self, pin: &str, enabled: bool) {
        let Some(command) = self.page.manual.set(pin, enabled) else {
            tracing::debug!("No manual control for pin {pin}");
            return;
        };
        if let Err(err) = self.channel.send(&command) {
            tracing::warn!("Manual command not delivered: {err}");
        }
    }

    pub fn on_channel_event(&mut self, event: ChannelEvent) {
        self.channel.handle(event, &mut self.page.dashboard);
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn sync(&self) -> &ConfigSyncClient<A> {
        &self.sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Visibility;
    use crate::page::InputKind;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeApi {
        response: Mutex<Option<PanelResult<Value>>>,
        stored: Mutex<Vec<Value>>,
        fail_store: bool,
    }

    impl FakeApi {
        fn serving(config: Value) -> Self {
            let api = Self::default();
            api.respond(Ok(config));
            api
        }

        fn respond(&self, response: PanelResult<Value>) {
            *self.response.lock().unwrap() = Some(response);
        }
    }

    #[async_trait]
    impl ConfigApi for FakeApi {
        async fn fetch_config(&self) -> PanelResult<Value> {
            self.response
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(PanelError::Transport("no response queued".into())))
        }

        async fn store_config(&self, config: &Value) -> PanelResult<()> {
            self.stored.lock().unwrap().push(config.clone());
            if self.fail_store {
                Err(PanelError::Transport("POST /config returned 500".into()))
            } else {
                Ok(())
            }
        }

        async fn shutdown(&self) -> PanelResult<()> {
            Ok(())
        }
    }

    fn device_config(mode: &str) -> Value {
        json!({
            "sys": {
                "mode": mode,
                "limit": 5000,
                "alarm_pin": "A1",
                "relay_pins": "R1;R2;R3"
            },
            "modbus": { "ip": "10.0.0.2", "port": 1502 },
            "mqtt": { "broker_ip": "10.0.0.3", "topic": "Power" }
        })
    }

    fn input_value(page: &Page, section: SectionId, id: &str) -> String {
        page.section(section)
            .find(id)
            .and_then(|row| row.input.as_ref())
            .map(|input| input.value().to_string())
            .unwrap()
    }

    #[tokio::test]
    async fn load_populates_page_and_applies_policy() {
        let mut client = ConfigSyncClient::new(FakeApi::serving(device_config("Simulator")));
        let mut page = Page::device_layout();
        client.load(&mut page).await.unwrap();

        assert_eq!(input_value(&page, SectionId::Sys, "sys-limit"), "5000");
        assert_eq!(input_value(&page, SectionId::Modbus, "modbus-ip"), "10.0.0.2");
        assert_eq!(input_value(&page, SectionId::Mqtt, "mqtt-topic"), "Power");
        assert_eq!(page.mode_selector, "Simulator");
        assert!(page.manual_enabled);
        assert_eq!(page.manual.len(), 4);
        assert_eq!(
            page.visibility,
            Visibility {
                sys: true,
                modbus: false,
                mqtt: false,
                manual: true
            }
        );
    }

    #[tokio::test]
    async fn failed_load_leaves_page_untouched() {
        let api = FakeApi::serving(device_config("Standalone"));
        let mut client = ConfigSyncClient::new(api);
        let mut page = Page::device_layout();
        client.load(&mut page).await.unwrap();
        let before = page.clone();

        client
            .api()
            .respond(Err(PanelError::Transport("GET /config returned 503".into())));
        let err = client.load(&mut page).await.unwrap_err();
        assert!(matches!(err, PanelError::Transport(_)));
        assert!(page.alert.is_some());
        page.alert = None;
        assert_eq!(page, before);
    }

    #[tokio::test]
    async fn malformed_response_is_ignored() {
        let api = FakeApi::serving(json!({"modbus": {"ip": "1.2.3.4"}}));
        let mut client = ConfigSyncClient::new(api);
        let mut page = Page::device_layout();
        let before = page.clone();
        assert!(matches!(
            client.load(&mut page).await,
            Err(PanelError::Protocol(_))
        ));
        assert_eq!(page, before);
    }

    #[tokio::test]
    async fn unknown_mode_keeps_visibility() {
        let mut client = ConfigSyncClient::new(FakeApi::serving(device_config("Subscriber")));
        let mut page = Page::device_layout();
        client.load(&mut page).await.unwrap();
        let visible = page.visibility;

        client.api().respond(Ok(device_config("Hover")));
        client.load(&mut page).await.unwrap();
        assert_eq!(page.mode_selector, "Hover");
        assert_eq!(page.visibility, visible);
    }

    #[tokio::test]
    async fn save_posts_sections_and_rebuilds_manual_rows() {
        let mut client = ConfigSyncClient::new(FakeApi::serving(device_config("Simulator")));
        let mut page = Page::device_layout();
        client.load(&mut page).await.unwrap();

        let pins = page.sys.find_mut("sys-relay_pins").unwrap();
        pins.input.as_mut().unwrap().set_value("R1");
        let limit = page.sys.find_mut("sys-limit").unwrap();
        assert_eq!(limit.input.as_ref().unwrap().kind(), InputKind::Number);
        limit.input.as_mut().unwrap().set_value("");
        page.mode_selector = "Standalone".into();

        client.save(&mut page).await.unwrap();
        let stored = client.api().stored.lock().unwrap().clone();
        assert_eq!(stored.len(), 1);
        let body = &stored[0];
        assert_eq!(body["sys"]["mode"], json!("Standalone"));
        assert_eq!(body["sys"]["relay_pins"], json!("R1"));
        assert_eq!(body["sys"]["limit"], Value::Null);
        assert_eq!(body["modbus"]["port"], json!(1502));
        assert_eq!(body["mqtt"]["broker_ip"], json!("10.0.0.3"));
        assert_eq!(page.manual.pins().collect::<Vec<_>>(), ["A1", "R1"]);
    }

    #[tokio::test]
    async fn failed_save_still_rebuilds_manual_rows() {
        let api = FakeApi {
            fail_store: true,
            ..FakeApi::default()
        };
        api.respond(Ok(device_config("Simulator")));
        let mut client = ConfigSyncClient::new(api);
        let mut page = Page::device_layout();
        client.load(&mut page).await.unwrap();

        let pins = page.sys.find_mut("sys-relay_pins").unwrap();
        pins.input.as_mut().unwrap().set_value("R7;R8");
        assert!(client.save(&mut page).await.is_err());
        assert!(page.alert.is_some());
        assert_eq!(page.manual.pins().collect::<Vec<_>>(), ["A1", "R7", "R8"]);
    }

    #[tokio::test]
    async fn legacy_config_is_saved_in_legacy_shape() {
        let api = FakeApi::serving(json!({
            "user": { "mode": "Subscriber", "alarm_pin": "A1", "relay_pins": "" },
            "mqtt": { "topic": "Load" }
        }));
        let mut client = ConfigSyncClient::new(api);
        let mut page = Page::device_layout();
        client.load(&mut page).await.unwrap();
        assert_eq!(client.generation(), Generation::Legacy);

        client.save(&mut page).await.unwrap();
        let stored = client.api().stored.lock().unwrap().clone();
        let body = stored[0].as_object().unwrap();
        assert!(body.contains_key("user"));
        assert!(!body.contains_key("sys"));
        assert!(!body.contains_key("modbus"));
        assert_eq!(body["user"]["mode"], json!("Subscriber"));
    }

    #[tokio::test]
    async fn panel_forwards_toggles_only_when_open() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut panel = ControlPanel::new(
            Page::device_layout(),
            FakeApi::serving(device_config("Simulator")),
            LiveChannel::new(tx),
        );
        panel.load().await.unwrap();

        panel.toggle_manual("R1", true);
        assert!(rx.try_recv().is_err());

        panel.on_channel_event(ChannelEvent::Opened);
        panel.toggle_manual("R1", true);
        let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame, json!({"pin": "R1", "enabled": true}));
        assert!(panel.page.manual.get("R1").unwrap().enabled);

        panel.on_channel_event(ChannelEvent::Closed);
        panel.toggle_manual("R2", true);
        assert!(rx.try_recv().is_err());
        assert_eq!(panel.channel_state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn mode_change_recomputes_visibility() {
        let mut panel = ControlPanel::new(
            Page::device_layout(),
            FakeApi::serving(device_config("Standalone")),
            LiveChannel::detached(),
        );
        panel.load().await.unwrap();
        assert!(!panel.page.manual_enabled);

        panel.on_mode_change("Simulator");
        assert!(!panel.page.visibility.manual);
        assert!(!panel.page.visibility.modbus);

        panel.on_mode_change("Publisher");
        assert!(!panel.page.visibility.sys);
        assert!(panel.page.visibility.mqtt);
    }
}
