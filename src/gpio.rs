use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::EdgeDetect;
use crate::error::HardwareError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineSettings {
    pub direction: Direction,
    pub debounce_ms: u32,
    pub edge: Option<EdgeDetect>,
}

impl LineSettings {
    /// Output line, driven low when claimed.
    pub fn output() -> Self {
        Self {
            direction: Direction::Output,
            debounce_ms: 0,
            edge: None,
        }
    }

    pub fn input(debounce_ms: u32, edge: Option<EdgeDetect>) -> Self {
        Self {
            direction: Direction::Input,
            debounce_ms,
            edge,
        }
    }
}

/// A single edge delivered by a backend. `timestamp` is wall-clock time
/// since the unix epoch, taken as close to the hardware event as the
/// backend allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub line: u32,
    pub edge: EdgeDetect,
    pub timestamp: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    Handled,
    NotHandled,
}

/// Interrupt-context callback. Implementations must not block.
pub type EdgeHandler = Arc<dyn Fn(EdgeEvent) -> IrqReturn + Send + Sync>;

pub trait GpioBackend: Send + Sync {
    fn claim(&self, line: u32, settings: &LineSettings) -> Result<(), HardwareError>;
    fn reconfigure(&self, line: u32, settings: &LineSettings) -> Result<(), HardwareError>;
    /// Releases a claimed line. Releasing an unclaimed line is a no-op.
    fn release(&self, line: u32);
    fn get_settings(&self, line: u32) -> Result<LineSettings, HardwareError>;
    fn read_value(&self, line: u32) -> Result<bool, HardwareError>;
    fn write_value(&self, line: u32, level: bool) -> Result<(), HardwareError>;
    /// Binds `handler` to the edge configured on `line`. The backend must
    /// never run the handler of one line concurrently with itself.
    fn attach_edge(&self, line: u32, handler: EdgeHandler) -> Result<(), HardwareError>;
    /// Unbinds the handler. Once this returns no invocation is running and
    /// none will start.
    fn detach_edge(&self, line: u32);
}

/// An exported GPIO line. The line is claimed on [`GpioLine::export`] and
/// released on [`GpioLine::unexport`] or drop, whichever comes first.
pub struct GpioLine<B: GpioBackend> {
    id: u32,
    backend: Arc<B>,
    settings: Mutex<LineSettings>,
    exported: AtomicBool,
}

impl<B: GpioBackend> GpioLine<B> {
    pub fn export(backend: Arc<B>, id: u32, settings: LineSettings) -> Result<Self, HardwareError> {
        backend.claim(id, &settings)?;
        debug!("exported GPIO line {id} as {:?}", settings.direction);

        Ok(Self {
            id,
            backend,
            settings: Mutex::new(settings),
            exported: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_exported(&self) -> bool {
        self.exported.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> LineSettings {
        *self.settings.lock()
    }

    pub fn debounce_ms(&self) -> u32 {
        self.settings.lock().debounce_ms
    }

    pub fn configure(
        &self,
        direction: Direction,
        debounce_ms: u32,
        edge: Option<EdgeDetect>,
    ) -> Result<(), HardwareError> {
        let mut settings = self.settings.lock();
        let next = LineSettings {
            direction,
            debounce_ms,
            edge,
        };
        self.ensure_exported()?;
        self.backend.reconfigure(self.id, &next)?;
        *settings = next;
        Ok(())
    }

    pub fn set_debounce(&self, debounce_ms: u32) -> Result<(), HardwareError> {
        let mut settings = self.settings.lock();
        if settings.debounce_ms == debounce_ms {
            return Ok(());
        }
        let next = LineSettings {
            debounce_ms,
            ..*settings
        };
        self.ensure_exported()?;
        self.backend.reconfigure(self.id, &next)?;
        *settings = next;
        Ok(())
    }

    pub fn read_level(&self) -> Result<bool, HardwareError> {
        self.ensure_exported()?;
        self.backend.read_value(self.id)
    }

    pub fn write_level(&self, level: bool) -> Result<(), HardwareError> {
        if self.settings.lock().direction != Direction::Output {
            return Err(HardwareError::ConfigFailed(format!(
                "line {} is not an output",
                self.id
            )));
        }
        self.ensure_exported()?;
        self.backend.write_value(self.id, level)
    }

    /// Releases the line. Safe to call any number of times.
    pub fn unexport(&self) {
        if self.exported.swap(false, Ordering::AcqRel) {
            self.backend.release(self.id);
            debug!("unexported GPIO line {}", self.id);
        }
    }

    fn ensure_exported(&self) -> Result<(), HardwareError> {
        if self.is_exported() {
            Ok(())
        } else {
            Err(HardwareError::Unavailable(self.id))
        }
    }
}

impl<B: GpioBackend> Drop for GpioLine<B> {
    fn drop(&mut self) {
        self.unexport();
    }
}

pub(crate) fn realtime_now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}
