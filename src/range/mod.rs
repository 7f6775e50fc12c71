//! Committing an exact date window to the host's validation-heavy range
//! widget: encoding/order decisions plus the state machine that drives the
//! widget through them.

pub mod controller;
pub mod encoding;

pub use controller::{ControllerState, RangeConfig, RangeController};
pub use encoding::{choose_order, detect_encoding, format_date, format_window};
