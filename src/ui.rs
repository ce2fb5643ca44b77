use crate::manual::ManualControl;
use crate::mode::{self, Visibility};
use crate::model::Mode;
use crate::page::{Dashboard, FieldRow, InputKind, Page, RowContainer, SectionId};
use dioxus::core::NoOpMutations;
use dioxus::prelude::*;
use std::collections::BTreeMap;

#[derive(Props, Clone, PartialEq)]
pub struct AppProps {
    pub page: Page,
}

pub fn render_html(page: &Page) -> String {
    let mut app = VirtualDom::new_with_props(App, AppProps { page: page.clone() });
    // Build the tree before rendering to avoid SSR panics.
    let mut noop = NoOpMutations {};
    let _ = app.rebuild(&mut noop);
    format!("<!DOCTYPE html>{}", dioxus_ssr::render(&mut app))
}

fn visibility_table(page: &Page) -> String {
    let table: BTreeMap<String, Visibility> = Mode::all()
        .into_iter()
        .filter_map(|m| {
            let vis = mode::visibility(&m, page.manual_enabled)?;
            Some((m.to_string(), vis))
        })
        .collect();
    serde_json::to_string(&table).unwrap_or_else(|_| "{}".to_string())
}

fn region_class(visible: bool) -> &'static str {
    if visible { "card" } else { "card hidden" }
}

#[component]
fn App(props: AppProps) -> Element {
    let page = &props.page;
    let styles = r#"
* { box-sizing: border-box; }
body, html { margin: 0; padding: 0; background: #0b0d13; }
.page { min-height: 100vh; display: flex; justify-content: center; padding: 36px 18px; color: #e9ecf5; font-family: "Inter", system-ui, -apple-system, sans-serif; }
.shell { width: min(820px, 100%); display: flex; flex-direction: column; gap: 12px; }
.title { font-size: 26px; margin: 0; }
.subtitle { margin: 0; color: #9aa4bc; font-size: 15px; }
.card { width: 100%; background: linear-gradient(145deg, #161a23, #0f1219); border: 1px solid #1f2230; border-radius: 16px; padding: 22px; }
.hidden { display: none; }
.card-title { margin: 0 0 12px 0; font-size: 20px; }
.form-row { display: flex; align-items: center; justify-content: space-between; gap: 12px; padding: 8px 0; border-bottom: 1px solid #1a1e29; }
.form-row input[type=text], .form-row input[type=number], .mode-select { width: 220px; padding: 8px 10px; border-radius: 8px; border: 1px solid #262b38; background: #0f1118; color: #e9ecf5; }
.form-row input[type=checkbox] { width: 18px; height: 18px; }
.dashboard { display: grid; grid-template-columns: repeat(auto-fit, minmax(160px, 1fr)); gap: 10px; }
.metric { background: #10141d; border: 1px solid #1f2230; border-radius: 12px; padding: 12px; }
.metric-name { color: #8f98ac; font-size: 13px; }
.metric-value { font-size: 22px; font-weight: 700; }
.actions { display: flex; gap: 10px; }
.primary, .danger { flex: 1; padding: 12px 14px; border-radius: 10px; border: none; font-weight: 800; cursor: pointer; }
.primary { background: linear-gradient(135deg, #ff5f7a, #ff3c5a); color: #0b0d12; }
.danger { background: #161925; border: 1px solid #ff4f64; color: #ff90a3; }
.status { margin-top: 10px; color: #ffb5c2; font-size: 14px; min-height: 18px; }
"#;

    let script = r#"
(() => {
  const root = document.getElementById('panel');
  const table = JSON.parse(root.dataset.visibility || '{}');
  const select = document.getElementById('mode-select');
  const alertBox = document.getElementById('alert');
  const regions = { sys: 'sys-config', modbus: 'modbus-config', mqtt: 'mqtt-config', manual: 'manual-config' };

  function applyVisibility() {
    const vis = table[select.value];
    if (!vis) { console.warn('unrecognized mode', select.value); return; }
    Object.entries(regions).forEach(([key, id]) => {
      document.getElementById(id).classList.toggle('hidden', !vis[key]);
    });
  }

  function collect(id) {
    const out = {};
    document.querySelectorAll(`#${id} .form-row`).forEach((row) => {
      const parts = row.id.split('-');
      const input = row.querySelector('input');
      if (!input || parts.length !== 2) return;
      if (input.type === 'checkbox') out[parts[1]] = input.checked;
      else if (input.type === 'number') out[parts[1]] = input.value === '' ? null : Number(input.value);
      else out[parts[1]] = input.value;
    });
    return out;
  }

  async function save() {
    const sys = collect('sys-config');
    sys.mode = select.value;
    const body = { sys, modbus: collect('modbus-config'), mqtt: collect('mqtt-config') };
    try {
      const res = await fetch('/config', { method: 'POST', headers: { 'Content-Type': 'application/json' }, body: JSON.stringify(body) });
      if (!res.ok) throw new Error(`status ${res.status}`);
      alertBox.textContent = '';
    } catch (err) {
      alertBox.textContent = `Saving configuration failed: ${err.message}`;
    } finally {
      rebuildManual(sys);
    }
  }

  function manualEntries(sys) {
    const out = [];
    const alarm = String(sys.alarm_pin ?? '').trim();
    if (alarm) out.push([alarm, 'Alarm pin']);
    String(sys.relay_pins ?? '').split(';').map((pin) => pin.trim()).filter((pin) => pin)
      .forEach((pin) => out.push([pin, 'Relay pin']));
    return out;
  }

  function rebuildManual(sys) {
    const region = document.getElementById('manual-config');
    region.querySelectorAll('.form-row').forEach((row) => row.remove());
    manualEntries(sys).forEach(([pin, label]) => {
      const row = document.createElement('div');
      row.className = 'form-row';
      const text = document.createElement('label');
      text.textContent = `${label} ${pin}`;
      const input = document.createElement('input');
      input.type = 'checkbox';
      input.dataset.pin = pin;
      bindManual(input);
      row.append(text, input);
      region.append(row);
    });
  }

  const scheme = window.location.protocol === 'https:' ? 'wss' : 'ws';
  const ws = new WebSocket(`${scheme}://${window.location.host}/ws`);
  ws.onopen = () => console.log('live channel open');
  ws.onclose = () => console.log('live channel closed');
  ws.onerror = () => console.log('live channel error');
  ws.onmessage = (event) => {
    let data;
    try { data = JSON.parse(event.data); } catch (err) { console.warn('bad frame', err); return; }
    const labels = { load: 'load-label', PV: 'pv-label', grid: 'grid-label', status: 'status-label' };
    Object.entries(labels).forEach(([key, id]) => {
      if (data[key] !== undefined && data[key] !== null) document.getElementById(id).textContent = data[key];
    });
  };

  function bindManual(input) {
    input.addEventListener('change', () => {
      try {
        ws.send(JSON.stringify({ pin: input.dataset.pin, enabled: input.checked }));
      } catch (err) {
        console.warn('manual command not sent', err);
      }
    });
  }

  document.querySelectorAll('#manual-config input[data-pin]').forEach(bindManual);

  select.addEventListener('change', applyVisibility);
  document.getElementById('save-btn').addEventListener('click', save);
  document.getElementById('shutdown-btn').addEventListener('click', async () => {
    try { await fetch('/shutdown', { method: 'POST' }); } catch (err) { alertBox.textContent = `Shutdown request failed: ${err.message}`; }
  });
})();
"#;

    let table = visibility_table(page);
    let vis = page.visibility;
    let sys_class = region_class(vis.sys);
    let modbus_class = region_class(vis.modbus);
    let mqtt_class = region_class(vis.mqtt);
    let manual_class = region_class(vis.manual);
    let mut options: Vec<(String, bool)> = Mode::all()
        .iter()
        .map(|m| (m.to_string(), m.as_str() == page.mode_selector))
        .collect();
    if !page.selected_mode().is_known() {
        options.push((page.mode_selector.clone(), true));
    }
    let alert = page.alert.clone().unwrap_or_default();
    let Dashboard { load, pv, grid, status } = page.dashboard.clone();
    let controls = page.manual.controls().to_vec();

    rsx! {
        div { id: "panel", class: "page", "data-visibility": "{table}",
            meta { name: "viewport", content: "width=device-width, initial-scale=1" }
            div { class: "shell",
                h1 { class: "title", "Relay panel" }
                p { class: "subtitle", "Power monitoring and relay control" }
                div { id: "screen-dashboard", class: "card",
                    h2 { class: "card-title", "Live" }
                    div { class: "dashboard",
                        Metric { id: "load-label", name: "Load", value: load }
                        Metric { id: "pv-label", name: "PV", value: pv }
                        Metric { id: "grid-label", name: "Grid", value: grid }
                        Metric { id: "status-label", name: "Status", value: status }
                    }
                }
                div { class: "card",
                    h2 { class: "card-title", "Operating mode" }
                    select { id: "mode-select", class: "mode-select",
                        for (name, selected) in options {
                            option { value: "{name}", selected: selected, "{name}" }
                        }
                    }
                }
                Region { id: SectionId::Sys, class: sys_class, rows: page.sys.clone() }
                Region { id: SectionId::Modbus, class: modbus_class, rows: page.modbus.clone() }
                Region { id: SectionId::Mqtt, class: mqtt_class, rows: page.mqtt.clone() }
                div { id: "manual-config", class: "{manual_class}",
                    h2 { class: "card-title", "Manual control" }
                    for control in controls {
                        ManualRow { control: control }
                    }
                }
                div { class: "card",
                    div { class: "actions",
                        button { id: "save-btn", class: "primary", "Save" }
                        button { id: "shutdown-btn", class: "danger", "Shutdown" }
                    }
                    div { id: "alert", class: "status", "{alert}" }
                }
            }
        }
        style { "{styles}" }
        script { "{script}" }
    }
}

#[component]
fn Metric(id: &'static str, name: &'static str, value: String) -> Element {
    rsx! {
        div { class: "metric",
            div { class: "metric-name", "{name}" }
            div { id: "{id}", class: "metric-value", "{value}" }
        }
    }
}

#[component]
fn Region(id: SectionId, class: &'static str, rows: RowContainer) -> Element {
    let region_id = format!("{}-config", id.prefix());
    let title = id.title();
    rsx! {
        div { id: "{region_id}", class: "{class}",
            h2 { class: "card-title", "{title}" }
            for row in rows.rows().to_vec() {
                FieldRowView { row: row }
            }
        }
    }
}

#[component]
fn FieldRowView(row: FieldRow) -> Element {
    let label = row.label.clone();
    let field = match row.input.as_ref() {
        Some(field) => {
            let value = field.value().to_string();
            let checked = field.checked();
            match field.kind() {
                InputKind::Toggle => rsx! { input { r#type: "checkbox", checked: checked } },
                InputKind::Number => rsx! { input { r#type: "number", value: "{value}" } },
                InputKind::Text => rsx! { input { r#type: "text", value: "{value}" } },
            }
        }
        None => rsx! {},
    };
    rsx! {
        div { id: "{row.id}", class: "form-row",
            label { "{label}" }
            {field}
        }
    }
}

#[component]
fn ManualRow(control: ManualControl) -> Element {
    let label = format!("{} {}", control.label(), control.pin);
    rsx! {
        div { class: "form-row",
            label { "{label}" }
            input { r#type: "checkbox", "data-pin": "{control.pin}", checked: control.enabled }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeviceConfig;
    use crate::sync::populate;

    fn loaded_page(mode: Mode) -> Page {
        let mut config = DeviceConfig::default();
        config.sys.mode = mode;
        let mut page = Page::device_layout();
        populate(&mut page, &serde_json::to_value(&config).unwrap()).unwrap();
        page
    }

    #[test]
    fn renders_rows_and_manual_controls() {
        let html = render_html(&loaded_page(Mode::Simulator));
        assert!(html.contains("id=\"sys-limit\""));
        assert!(html.contains("value=\"5000\""));
        assert!(html.contains("data-pin=\"J8:3\""));
        assert!(html.contains("data-pin=\"J8:13\""));
        assert!(html.contains("id=\"modbus-config\" class=\"card hidden\""));
    }

    #[test]
    fn page_script_rebuilds_manual_rows_after_every_save() {
        let html = render_html(&loaded_page(Mode::Simulator));
        assert!(html.contains("finally {\n      rebuildManual(sys);"));
        assert!(!html.contains("location.reload"));
    }

    #[test]
    fn publisher_hides_sys_region() {
        let html = render_html(&loaded_page(Mode::Publisher));
        assert!(html.contains("id=\"sys-config\" class=\"card hidden\""));
        assert!(html.contains("id=\"mqtt-config\" class=\"card\""));
        assert!(html.contains("id=\"manual-config\" class=\"card hidden\""));
    }
}
