use std::sync::Arc;

use crate::error::HardwareError;
use crate::gpio::{GpioBackend, GpioLine};

/// Switches the suppression window of one line between off and a fixed
/// default. The interval is set, never toggled, so repeated calls settle
/// on the same value.
pub struct DebounceController<B: GpioBackend> {
    line: Arc<GpioLine<B>>,
    default_ms: u32,
}

impl<B: GpioBackend> DebounceController<B> {
    pub fn new(line: Arc<GpioLine<B>>, default_ms: u32) -> Self {
        Self { line, default_ms }
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), HardwareError> {
        let interval = if enabled { self.default_ms } else { 0 };
        self.line.set_debounce(interval)
    }

    pub fn is_enabled(&self) -> bool {
        self.line.debounce_ms() != 0
    }

    pub fn interval_ms(&self) -> u32 {
        self.line.debounce_ms()
    }

    pub fn default_ms(&self) -> u32 {
        self.default_ms
    }
}
