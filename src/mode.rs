use crate::error::{PanelError, PanelResult};
use crate::model::Mode;
use crate::page::Page;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Visibility {
    pub sys: bool,
    pub modbus: bool,
    pub mqtt: bool,
    pub manual: bool,
}

impl Default for Visibility {
    fn default() -> Self {
        Self {
            sys: true,
            modbus: true,
            mqtt: true,
            manual: false,
        }
    }
}

pub fn visibility(mode: &Mode, manual_enabled: bool) -> Option<Visibility> {
    let visibility = match mode {
        Mode::Simulator => Visibility {
            sys: true,
            modbus: false,
            mqtt: false,
            manual: manual_enabled,
        },
        Mode::Standalone => Visibility {
            sys: true,
            modbus: true,
            mqtt: false,
            manual: false,
        },
        Mode::Subscriber => Visibility {
            sys: true,
            modbus: false,
            mqtt: true,
            manual: false,
        },
        Mode::Publisher => Visibility {
            sys: false,
            modbus: true,
            mqtt: true,
            manual: false,
        },
        Mode::Unknown(_) => return None,
    };
    Some(visibility)
}

/// Recomputes the page visibility from its mode selector. An unrecognized
/// mode is logged and leaves the previous visibility in place.
pub fn apply(page: &mut Page) -> PanelResult<Visibility> {
    let mode = page.selected_mode();
    match visibility(&mode, page.manual_enabled) {
        Some(next) => {
            page.visibility = next;
            Ok(next)
        }
        None => {
            tracing::warn!("Cannot derive visibility for mode '{mode}', keeping current layout");
            Err(PanelError::Policy(mode.to_string()))
        }
    }
}

pub fn latch_manual(page: &mut Page, loaded: &Mode) {
    if *loaded == Mode::Simulator {
        page.manual_enabled = true;
    }
}
