use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::warn;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::config::EdgeDetect;
use crate::error::HardwareError;
use crate::gpio::{
    Direction, EdgeEvent, EdgeHandler, GpioBackend, IrqReturn, LineSettings, realtime_now,
};

const MOCK_GPIO_LINE_COUNT: u32 = 128;

/// In-memory GPIO controller.
///
/// Physical levels outlive claims so that tests can inspect an output after
/// its line has been released. Input levels are driven with
/// [`MockGpioBackend::set_input`], which raises edges through the attached
/// handler the way a real interrupt controller would.
pub struct MockGpioBackend {
    line_count: u32,
    lines: RwLock<FxHashMap<u32, MockLine>>, // claimed lines, keyed by offset
    levels: RwLock<FxHashMap<u32, bool>>,
    reject_edge_attach: AtomicBool,
}

struct MockLine {
    settings: LineSettings,
    irq: Option<Arc<IrqAction>>,
    last_event: Option<Instant>,
}

struct IrqAction {
    handler: EdgeHandler,
    armed: AtomicBool,
    // held for the duration of one invocation, like a masked interrupt line
    mask: Mutex<()>,
}

impl IrqAction {
    fn fire(&self, event: EdgeEvent) -> Option<IrqReturn> {
        let _masked = self.mask.lock();
        if !self.armed.load(Ordering::Acquire) {
            return None;
        }
        let ret = (self.handler)(event);
        if ret == IrqReturn::NotHandled {
            warn!("edge on line {} was not handled", event.line);
        }
        Some(ret)
    }
}

impl Default for MockGpioBackend {
    fn default() -> Self {
        Self::new(MOCK_GPIO_LINE_COUNT)
    }
}

impl MockGpioBackend {
    /// A controller exposing lines `0..line_count`.
    pub fn new(line_count: u32) -> Self {
        Self {
            line_count,
            lines: RwLock::new(FxHashMap::default()),
            levels: RwLock::new(FxHashMap::default()),
            reject_edge_attach: AtomicBool::new(false),
        }
    }

    /// Makes subsequent [`GpioBackend::attach_edge`] calls fail.
    pub fn reject_edge_attach(&self, reject: bool) {
        self.reject_edge_attach.store(reject, Ordering::Relaxed);
    }

    pub fn is_claimed(&self, line: u32) -> bool {
        self.lines.read().contains_key(&line)
    }

    pub fn has_edge_handler(&self, line: u32) -> bool {
        self.lines
            .read()
            .get(&line)
            .is_some_and(|l| l.irq.is_some())
    }

    /// Physical level of `line`, whether or not it is claimed.
    pub fn level(&self, line: u32) -> bool {
        self.levels.read().get(&line).copied().unwrap_or(false)
    }

    /// Drives an external signal onto `line`. A transition matching the
    /// configured edge, outside the debounce window, invokes the attached
    /// handler on the calling thread.
    pub fn set_input(&self, line: u32, level: bool) -> Option<IrqReturn> {
        let old = self.levels.write().insert(line, level).unwrap_or(false);
        let edge = match (old, level) {
            (false, true) => EdgeDetect::Rising,
            (true, false) => EdgeDetect::Falling,
            _ => return None,
        };

        let irq = {
            let mut lines = self.lines.write();
            let pin = lines.get_mut(&line)?;
            if pin.settings.direction != Direction::Input || pin.settings.edge != Some(edge) {
                return None;
            }

            let now = Instant::now();
            let window = Duration::from_millis(u64::from(pin.settings.debounce_ms));
            let allow = pin
                .last_event
                .map(|t| now.duration_since(t) >= window)
                .unwrap_or(true);
            if !allow {
                return None;
            }
            pin.last_event = Some(now);
            pin.irq.clone()?
        };

        irq.fire(EdgeEvent {
            line,
            edge,
            timestamp: realtime_now(),
        })
    }

    /// Raises `event` on its line directly, bypassing polarity and debounce.
    pub fn fire_edge(&self, event: EdgeEvent) -> Option<IrqReturn> {
        let irq = self
            .lines
            .read()
            .get(&event.line)
            .and_then(|l| l.irq.clone())?;
        irq.fire(event)
    }

    fn with_line<T>(
        &self,
        line: u32,
        f: impl FnOnce(&mut MockLine) -> Result<T, HardwareError>,
    ) -> Result<T, HardwareError> {
        let mut lines = self.lines.write();
        let pin = lines
            .get_mut(&line)
            .ok_or(HardwareError::Unavailable(line))?;
        f(pin)
    }
}

impl GpioBackend for MockGpioBackend {
    fn claim(&self, line: u32, settings: &LineSettings) -> Result<(), HardwareError> {
        if line >= self.line_count {
            return Err(HardwareError::Unavailable(line));
        }

        let mut lines = self.lines.write();
        if lines.contains_key(&line) {
            return Err(HardwareError::Unavailable(line));
        }
        lines.insert(
            line,
            MockLine {
                settings: *settings,
                irq: None,
                last_event: None,
            },
        );

        if settings.direction == Direction::Output {
            self.levels.write().insert(line, false);
        }
        Ok(())
    }

    fn reconfigure(&self, line: u32, settings: &LineSettings) -> Result<(), HardwareError> {
        self.with_line(line, |pin| {
            pin.settings = *settings;
            Ok(())
        })
    }

    fn release(&self, line: u32) {
        self.detach_edge(line);
        self.lines.write().remove(&line);
    }

    fn get_settings(&self, line: u32) -> Result<LineSettings, HardwareError> {
        self.with_line(line, |pin| Ok(pin.settings))
    }

    fn read_value(&self, line: u32) -> Result<bool, HardwareError> {
        if !self.is_claimed(line) {
            return Err(HardwareError::Unavailable(line));
        }
        Ok(self.level(line))
    }

    fn write_value(&self, line: u32, level: bool) -> Result<(), HardwareError> {
        let lines = self.lines.read();
        let pin = lines.get(&line).ok_or(HardwareError::Unavailable(line))?;
        if pin.settings.direction != Direction::Output {
            return Err(HardwareError::ConfigFailed(format!(
                "line {line} must be an output to set its value"
            )));
        }
        self.levels.write().insert(line, level);
        Ok(())
    }

    fn attach_edge(&self, line: u32, handler: EdgeHandler) -> Result<(), HardwareError> {
        if self.reject_edge_attach.load(Ordering::Relaxed) {
            return Err(HardwareError::ConfigFailed(format!(
                "no interrupt source for line {line}"
            )));
        }

        self.with_line(line, |pin| {
            if pin.settings.edge.is_none() {
                return Err(HardwareError::ConfigFailed(format!(
                    "line {line} has no edge detection configured"
                )));
            }
            if pin.irq.is_some() {
                return Err(HardwareError::Unavailable(line));
            }
            pin.irq = Some(Arc::new(IrqAction {
                handler,
                armed: AtomicBool::new(true),
                mask: Mutex::new(()),
            }));
            Ok(())
        })
    }

    fn detach_edge(&self, line: u32) {
        let irq = self
            .lines
            .write()
            .get_mut(&line)
            .and_then(|pin| pin.irq.take());

        if let Some(irq) = irq {
            irq.armed.store(false, Ordering::Release);
            // wait out an invocation that is already running
            drop(irq.mask.lock());
        }
    }
}
