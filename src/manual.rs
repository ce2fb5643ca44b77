//! Toggle rows for driving the alarm and relay pins by hand.
//!
//! The list is derived from the `alarm_pin` and `relay_pins` keys of the sys
//! section and is thrown away and rebuilt on every load or save.

use crate::codec::display_text;
use crate::model::ManualCommand;
use serde_json::{Map, Value};

pub const RELAY_PIN_SEPARATOR: char = ';';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinRole {
    Alarm,
    Relay,
}

impl PinRole {
    pub fn label(self) -> &'static str {
        match self {
            PinRole::Alarm => "Alarm pin",
            PinRole::Relay => "Relay pin",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManualEntry {
    pub pin: String,
    pub role: PinRole,
}

/// Alarm pin first, then relay pins in listed order. Duplicates are kept.
/// A missing or blank `alarm_pin` yields no alarm row.
pub fn entries(sys: &Map<String, Value>) -> Vec<ManualEntry> {
    let mut out = Vec::new();
    match sys.get("alarm_pin").map(display_text) {
        Some(pin) if !pin.trim().is_empty() => out.push(ManualEntry {
            pin: pin.trim().to_string(),
            role: PinRole::Alarm,
        }),
        _ => tracing::debug!("No alarm pin configured"),
    }
    if let Some(pins) = sys.get("relay_pins").map(display_text) {
        out.extend(
            pins.split(RELAY_PIN_SEPARATOR)
                .map(str::trim)
                .filter(|pin| !pin.is_empty())
                .map(|pin| ManualEntry {
                    pin: pin.to_string(),
                    role: PinRole::Relay,
                }),
        );
    }
    out
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManualControl {
    pub pin: String,
    pub role: PinRole,
    pub enabled: bool,
}

impl ManualControl {
    pub fn label(&self) -> &'static str {
        self.role.label()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManualControlPanel {
    controls: Vec<ManualControl>,
}

impl ManualControlPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&mut self, sys: &Map<String, Value>) -> usize {
        self.controls.clear();
        self.controls
            .extend(entries(sys).into_iter().map(|entry| ManualControl {
                pin: entry.pin,
                role: entry.role,
                enabled: false,
            }));
        tracing::debug!("Built {} manual controls", self.controls.len());
        self.controls.len()
    }

    pub fn rebuild(&mut self, sys: &Map<String, Value>) -> usize {
        self.build(sys)
    }

    pub fn controls(&self) -> &[ManualControl] {
        &self.controls
    }

    pub fn get(&self, pin: &str) -> Option<&ManualControl> {
        self.controls.iter().find(|control| control.pin == pin)
    }

    pub fn pins(&self) -> impl Iterator<Item = &str> {
        self.controls.iter().map(|control| control.pin.as_str())
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// Flips every row for `pin` and returns the single command describing the
    /// interaction, or `None` when no row carries that pin.
    pub fn set(&mut self, pin: &str, enabled: bool) -> Option<ManualCommand> {
        let mut found = false;
        for control in self.controls.iter_mut().filter(|c| c.pin == pin) {
            control.enabled = enabled;
            found = true;
        }
        found.then(|| ManualCommand {
            pin: pin.to_string(),
            enabled,
        })
    }
}
