//! Control panel for a power-monitoring relay device.
//!
//! The panel side (`page`, `codec`, `mode`, `manual`, `live`, `sync`) keeps a
//! model of the configuration page in step with the device. The device side
//! (`web`, `simulator`, `ui`) serves that page, the `/config` document and the
//! live socket.

pub mod codec;
pub mod config;
pub mod error;
pub mod live;
pub mod manual;
pub mod mode;
pub mod model;
pub mod page;
pub mod simulator;
pub mod sync;
pub mod ui;
pub mod web;

pub use error::{PanelError, PanelResult};
