use std::sync::Arc;
use std::time::Duration;

use log::info;
use parking_lot::Mutex;
use serde::Serialize;

use crate::debounce::DebounceController;
use crate::error::AppError;
use crate::gpio::{GpioBackend, GpioLine};
use crate::state::SharedStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    NumberPresses,
    IsDebounce,
    IsDtmfPd,
    DtmfDetected,
    LedOn,
    LastTime,
    DiffTime,
    DtmfData(usize),
    DtmfDigit,
}

#[derive(Debug, Clone, Copy)]
pub struct PropertyEndpoint {
    pub name: &'static str,
    pub access: Access,
    pub attribute: Attribute,
}

const fn endpoint(name: &'static str, access: Access, attribute: Attribute) -> PropertyEndpoint {
    PropertyEndpoint {
        name,
        access,
        attribute,
    }
}

pub const ENDPOINTS: [PropertyEndpoint; 12] = [
    endpoint("numberPresses", Access::ReadWrite, Attribute::NumberPresses),
    endpoint("isDTMFpd", Access::ReadWrite, Attribute::IsDtmfPd),
    endpoint("DTMFdetected", Access::ReadOnly, Attribute::DtmfDetected),
    endpoint("ledOn", Access::ReadOnly, Attribute::LedOn),
    endpoint("lastTime", Access::ReadOnly, Attribute::LastTime),
    endpoint("diffTime", Access::ReadOnly, Attribute::DiffTime),
    endpoint("isDebounce", Access::ReadWrite, Attribute::IsDebounce),
    endpoint("DTMFdata1", Access::ReadOnly, Attribute::DtmfData(0)),
    endpoint("DTMFdata2", Access::ReadOnly, Attribute::DtmfData(1)),
    endpoint("DTMFdata3", Access::ReadOnly, Attribute::DtmfData(2)),
    endpoint("DTMFdata4", Access::ReadOnly, Attribute::DtmfData(3)),
    endpoint("DTMFdigit", Access::ReadOnly, Attribute::DtmfDigit),
];

pub fn find_endpoint(name: &str) -> Option<&'static PropertyEndpoint> {
    ENDPOINTS.iter().find(|ep| ep.name == name)
}

#[derive(Debug, Clone, Copy)]
struct Flags {
    debounce_enabled: bool,
    power_down_enabled: bool,
}

/// Named read/write endpoints over the receiver state.
///
/// Writes parse like `sscanf("%d")`: leading whitespace and a sign are
/// accepted, trailing text is ignored, and input without a leading integer
/// is accepted as a no-op.
pub struct PropertySurface<B: GpioBackend> {
    group: String,
    status: Arc<SharedStatus>,
    detected: Arc<GpioLine<B>>,
    power_down: Arc<GpioLine<B>>,
    debounce: DebounceController<B>,
    flags: Mutex<Flags>,
}

impl<B: GpioBackend> PropertySurface<B> {
    pub fn new(
        group: String,
        status: Arc<SharedStatus>,
        detected: Arc<GpioLine<B>>,
        power_down: Arc<GpioLine<B>>,
        debounce: DebounceController<B>,
    ) -> Self {
        let flags = Flags {
            debounce_enabled: debounce.is_enabled(),
            power_down_enabled: false,
        };

        Self {
            group,
            status,
            detected,
            power_down,
            debounce,
            flags: Mutex::new(flags),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn status(&self) -> &Arc<SharedStatus> {
        &self.status
    }

    pub fn get(&self, name: &str) -> Result<String, AppError> {
        let ep = find_endpoint(name).ok_or_else(|| AppError::NotFoundAttribute(name.into()))?;
        self.show(ep.attribute)
    }

    /// Applies a textual write and returns the number of bytes consumed.
    pub fn set(&self, name: &str, input: &str) -> Result<usize, AppError> {
        let ep = find_endpoint(name).ok_or_else(|| AppError::NotFoundAttribute(name.into()))?;
        if ep.access == Access::ReadOnly {
            return Err(AppError::PermissionDenied(format!(
                "{} is read-only",
                ep.name
            )));
        }

        let Some(value) = parse_leading_int(input) else {
            return Ok(input.len());
        };

        match ep.attribute {
            Attribute::NumberPresses => {
                if let Ok(count) = u64::try_from(value) {
                    self.status.set_press_count(count);
                }
            }
            Attribute::IsDebounce => self.store_debounce(value != 0)?,
            Attribute::IsDtmfPd => self.store_power_down(value != 0)?,
            _ => {
                return Err(AppError::PermissionDenied(format!(
                    "{} is read-only",
                    ep.name
                )));
            }
        }

        Ok(input.len())
    }

    /// Every endpoint with its current value, in table order. A field that
    /// cannot be read carries its own error.
    pub fn values(&self) -> Vec<(&'static str, Result<String, AppError>)> {
        ENDPOINTS
            .iter()
            .map(|ep| (ep.name, self.show(ep.attribute)))
            .collect()
    }

    fn show(&self, attribute: Attribute) -> Result<String, AppError> {
        let snap = self.status.snapshot();
        let value = match attribute {
            Attribute::NumberPresses => snap.press_count.to_string(),
            Attribute::IsDebounce => u8::from(self.flags.lock().debounce_enabled).to_string(),
            Attribute::IsDtmfPd => u8::from(self.flags.lock().power_down_enabled).to_string(),
            Attribute::DtmfDetected => u8::from(self.detected.read_level()?).to_string(),
            Attribute::LedOn => u8::from(snap.indicator_on).to_string(),
            Attribute::LastTime => format_time_of_day(snap.last_event_time),
            Attribute::DiffTime => format_elapsed(snap.time_since_prev),
            Attribute::DtmfData(i) => u8::from(snap.data_bits[i]).to_string(),
            Attribute::DtmfDigit => snap.digit.to_string(),
        };
        Ok(value + "\n")
    }

    fn store_debounce(&self, enabled: bool) -> Result<(), AppError> {
        let mut flags = self.flags.lock();
        self.debounce.set_enabled(enabled)?;
        flags.debounce_enabled = enabled;
        info!(
            "{}: debounce {}",
            self.group,
            if enabled { "on" } else { "off" }
        );
        Ok(())
    }

    fn store_power_down(&self, enabled: bool) -> Result<(), AppError> {
        let mut flags = self.flags.lock();
        self.power_down.write_level(enabled)?;
        if enabled {
            self.debounce.set_enabled(false)?;
            flags.debounce_enabled = false;
        }
        flags.power_down_enabled = enabled;
        info!(
            "{}: power-down {}",
            self.group,
            if enabled { "set" } else { "cleared" }
        );
        Ok(())
    }
}

fn parse_leading_int(input: &str) -> Option<i64> {
    let s = input.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|v| sign * v)
}

/// `HH:MM:SS.nnnnnnnnn` of the wall-clock time, UTC.
pub fn format_time_of_day(t: Duration) -> String {
    let secs = t.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:09}",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60,
        t.subsec_nanos()
    )
}

/// `S.nnnnnnnnn` seconds with nanosecond precision.
pub fn format_elapsed(d: Duration) -> String {
    format!("{}.{:09}", d.as_secs(), d.subsec_nanos())
}
