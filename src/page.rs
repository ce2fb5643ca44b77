use crate::manual::ManualControlPanel;
use crate::mode::Visibility;
use crate::model::Mode;

pub const ID_SEPARATOR: char = '-';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Number,
    Toggle,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Input {
    kind: InputKind,
    value: String,
    checked: bool,
}

impl Input {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            kind: InputKind::Text,
            value: value.into(),
            checked: false,
        }
    }

    pub fn number(value: impl Into<String>) -> Self {
        Self {
            kind: InputKind::Number,
            value: value.into(),
            checked: false,
        }
    }

    pub fn toggle(checked: bool) -> Self {
        Self {
            kind: InputKind::Toggle,
            value: String::new(),
            checked,
        }
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn checked(&self) -> bool {
        self.checked
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn set_checked(&mut self, checked: bool) {
        self.checked = checked;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldRow {
    pub id: String,
    pub label: String,
    pub input: Option<Input>,
}

impl FieldRow {
    pub fn new(id: impl Into<String>, label: impl Into<String>, input: Input) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            input: Some(input),
        }
    }

    /// Splits the identifier into `(prefix, key)`. Anything other than exactly
    /// two segments yields `None`.
    pub fn binding(&self) -> Option<(&str, &str)> {
        let mut parts = self.id.split(ID_SEPARATOR);
        let prefix = parts.next()?;
        let key = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Some((prefix, key))
    }
}

pub fn row_id(prefix: &str, key: &str) -> String {
    format!("{prefix}{ID_SEPARATOR}{key}")
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowContainer {
    rows: Vec<FieldRow>,
}

impl RowContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<FieldRow>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: FieldRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[FieldRow] {
        &self.rows
    }

    pub fn find(&self, id: &str) -> Option<&FieldRow> {
        self.rows.iter().find(|row| row.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut FieldRow> {
        self.rows.iter_mut().find(|row| row.id == id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SectionId {
    Sys,
    Modbus,
    Mqtt,
}

impl SectionId {
    pub const ALL: [SectionId; 3] = [SectionId::Sys, SectionId::Modbus, SectionId::Mqtt];

    pub fn prefix(self) -> &'static str {
        match self {
            SectionId::Sys => "sys",
            SectionId::Modbus => "modbus",
            SectionId::Mqtt => "mqtt",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            SectionId::Sys => "System",
            SectionId::Modbus => "Modbus",
            SectionId::Mqtt => "MQTT",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Dashboard {
    pub load: String,
    pub pv: String,
    pub grid: String,
    pub status: String,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self {
            load: "-".to_string(),
            pv: "-".to_string(),
            grid: "-".to_string(),
            status: "-".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    pub sys: RowContainer,
    pub modbus: RowContainer,
    pub mqtt: RowContainer,
    pub mode_selector: String,
    pub manual: ManualControlPanel,
    /// Set when a loaded configuration was in Simulator mode.
    pub manual_enabled: bool,
    pub visibility: Visibility,
    pub dashboard: Dashboard,
    pub alert: Option<String>,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            sys: RowContainer::new(),
            modbus: RowContainer::new(),
            mqtt: RowContainer::new(),
            mode_selector: Mode::Simulator.to_string(),
            manual: ManualControlPanel::new(),
            manual_enabled: false,
            visibility: Visibility::default(),
            dashboard: Dashboard::default(),
            alert: None,
        }
    }
}

impl Page {
    pub fn device_layout() -> Self {
        Self {
            sys: layout_rows(SectionId::Sys, SYS_FIELDS),
            modbus: layout_rows(SectionId::Modbus, MODBUS_FIELDS),
            mqtt: layout_rows(SectionId::Mqtt, MQTT_FIELDS),
            ..Self::default()
        }
    }

    pub fn section(&self, id: SectionId) -> &RowContainer {
        match id {
            SectionId::Sys => &self.sys,
            SectionId::Modbus => &self.modbus,
            SectionId::Mqtt => &self.mqtt,
        }
    }

    pub fn section_mut(&mut self, id: SectionId) -> &mut RowContainer {
        match id {
            SectionId::Sys => &mut self.sys,
            SectionId::Modbus => &mut self.modbus,
            SectionId::Mqtt => &mut self.mqtt,
        }
    }

    pub fn selected_mode(&self) -> Mode {
        Mode::parse(&self.mode_selector)
    }
}

type FieldSpec = (&'static str, &'static str, InputKind);

const SYS_FIELDS: &[FieldSpec] = &[
    ("limit", "Power limit (W)", InputKind::Number),
    ("lower_pow_limit", "Lower power limit (W)", InputKind::Number),
    ("alarm_delay", "Alarm delay (s)", InputKind::Number),
    ("alarm_on_time", "Alarm on time (s)", InputKind::Number),
    ("alarm_timeout", "Alarm timeout (s)", InputKind::Number),
    ("relay_timeout", "Relay timeout (s)", InputKind::Number),
    ("connection_timeout", "Connection timeout (s)", InputKind::Number),
    ("cycle_time", "Cycle time (s)", InputKind::Number),
    ("alarm_pin", "Alarm pin", InputKind::Text),
    ("relay_pins", "Relay pins (separated by ;)", InputKind::Text),
];

const MODBUS_FIELDS: &[FieldSpec] = &[
    ("ip", "Inverter IP", InputKind::Text),
    ("port", "Port", InputKind::Number),
    ("timeout", "Timeout (s)", InputKind::Number),
    ("acq_time", "Acquisition time (s)", InputKind::Number),
];

const MQTT_FIELDS: &[FieldSpec] = &[
    ("broker_ip", "Broker IP", InputKind::Text),
    ("port", "Port", InputKind::Number),
    ("username", "Username", InputKind::Text),
    ("password", "Password", InputKind::Text),
    ("topic", "Topic", InputKind::Text),
];

fn layout_rows(section: SectionId, fields: &[FieldSpec]) -> RowContainer {
    let rows = fields
        .iter()
        .map(|(key, label, kind)| {
            let input = match kind {
                InputKind::Text => Input::text(""),
                InputKind::Number => Input::number(""),
                InputKind::Toggle => Input::toggle(false),
            };
            FieldRow::new(row_id(section.prefix(), key), *label, input)
        })
        .collect();
    RowContainer::with_rows(rows)
}
