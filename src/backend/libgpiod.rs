use log::warn;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, yield_now};
use std::time::Duration;

use libgpiod::{chip::Chip, line, line::EventClock, request};
use parking_lot::{FairMutex, RwLock};
use rustc_hash::FxHashMap;

use crate::config::EdgeDetect;
use crate::error::HardwareError;
use crate::gpio::{Direction, EdgeEvent, EdgeHandler, GpioBackend, IrqReturn, LineSettings};

const LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY: usize = 64;
const LIBGPIOD_BACKEND_EVENT_WAIT_TIMEOUT_MS: Duration = Duration::from_millis(10);

/// GPIO character-device backend. Every claimed line holds its own line
/// request on `chip`.
pub struct LibgpiodBackend {
    chip: String,
    lines: RwLock<FxHashMap<u32, LineHandle>>, // keyed by line offset
}

struct LineHandle {
    settings: LineSettings,
    gpiod_handle: Arc<FairMutex<GpiodHandle>>,
    listener: Option<EdgeListener>,
}

struct GpiodHandle {
    request: request::Request,
}

impl GpiodHandle {
    fn new(chip: &str, offset: u32, line_cfg: &line::Config) -> Result<Self, HardwareError> {
        let chip = Self::open_chip(chip, offset)?;
        let request = Self::request_lines(&chip, offset, line_cfg)?;
        Ok(Self { request })
    }

    fn open_chip(path: &str, offset: u32) -> Result<Chip, HardwareError> {
        let p = PathBuf::from(path);
        Chip::open(&p).map_err(|e| {
            warn!("open chip {path}: {e}");
            HardwareError::Unavailable(offset)
        })
    }

    fn request_lines(
        chip: &Chip,
        offset: u32,
        line_cfg: &line::Config,
    ) -> Result<request::Request, HardwareError> {
        let mut req_cfg = request::Config::new()
            .map_err(|e| HardwareError::ConfigFailed(format!("request config: {e}")))?;
        req_cfg
            .set_consumer(env!("CARGO_PKG_NAME"))
            .map_err(|e| HardwareError::ConfigFailed(format!("request consumer: {e}")))?;
        chip.request_lines(Some(&req_cfg), line_cfg).map_err(|e| {
            warn!("request line {offset}: {e}");
            HardwareError::Unavailable(offset)
        })
    }
}

struct EdgeListener {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EdgeListener {
    fn new(
        offset: u32,
        gpiod_handle: Arc<FairMutex<GpiodHandle>>,
        handler: EdgeHandler,
    ) -> Result<Self, HardwareError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = cancel.clone();
        let mut buffer = request::Buffer::new(LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY)
            .map_err(|e| HardwareError::ConfigFailed(format!("event buffer: {e}")))?;

        // a single thread per line, so the handler never runs concurrently with itself
        let handle = std::thread::spawn(move || {
            while !cancel_flag.load(Ordering::Relaxed) {
                let hdl = gpiod_handle.lock();
                let req = &hdl.request;

                let has_event =
                    match req.wait_edge_events(Some(LIBGPIOD_BACKEND_EVENT_WAIT_TIMEOUT_MS)) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!("wait edge events error for line {offset}: {e}");
                            yield_now();
                            continue;
                        }
                    };
                if !has_event {
                    continue;
                }

                let events = match req.read_edge_events(&mut buffer) {
                    Ok(evts) => evts,
                    Err(e) => {
                        warn!("read edge events error for line {offset}: {e}");
                        yield_now();
                        continue;
                    }
                };
                for evt in events {
                    let evt = match evt {
                        Ok(e) => e,
                        Err(_) => continue,
                    };
                    let edge = match evt.event_type() {
                        Ok(line::EdgeKind::Rising) => EdgeDetect::Rising,
                        Ok(line::EdgeKind::Falling) => EdgeDetect::Falling,
                        Err(_) => continue,
                    };

                    if handler(EdgeEvent {
                        line: offset,
                        edge,
                        timestamp: evt.timestamp(),
                    }) == IrqReturn::NotHandled
                    {
                        warn!("edge on line {offset} was not handled");
                    }
                }
            }
        });

        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }
}

impl Drop for EdgeListener {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl LibgpiodBackend {
    pub fn new(chip: impl Into<String>) -> Result<Self, HardwareError> {
        let chip = chip.into();
        // fail early if the chip is missing
        GpiodHandle::open_chip(&chip, 0)?;

        Ok(Self {
            chip,
            lines: RwLock::new(FxHashMap::default()),
        })
    }

    fn gpiod_handle(&self, line: u32) -> Result<Arc<FairMutex<GpiodHandle>>, HardwareError> {
        self.lines
            .read()
            .get(&line)
            .map(|h| h.gpiod_handle.clone())
            .ok_or(HardwareError::Unavailable(line))
    }

    fn make_line_settings(settings: &LineSettings) -> Result<line::Settings, HardwareError> {
        let mut ls = line::Settings::new()
            .map_err(|e| HardwareError::ConfigFailed(format!("libgpiod settings: {e}")))?;

        match settings.direction {
            Direction::Output => {
                ls.set_direction(line::Direction::Output)
                    .map_err(|e| HardwareError::ConfigFailed(format!("set direction: {e}")))?;
                ls.set_drive(line::Drive::PushPull)
                    .map_err(|e| HardwareError::ConfigFailed(format!("set drive: {e}")))?;
            }
            Direction::Input => {
                ls.set_direction(line::Direction::Input)
                    .map_err(|e| HardwareError::ConfigFailed(format!("set direction: {e}")))?;
                ls.set_bias(None)
                    .map_err(|e| HardwareError::ConfigFailed(format!("set bias: {e}")))?;
                ls.set_debounce_period(Duration::from_millis(u64::from(settings.debounce_ms)));

                if let Some(edge) = settings.edge {
                    let edge = match edge {
                        EdgeDetect::Rising => line::Edge::Rising,
                        EdgeDetect::Falling => line::Edge::Falling,
                    };
                    ls.set_edge_detection(Some(edge))
                        .map_err(|e| HardwareError::ConfigFailed(format!("set edge detection: {e}")))?;
                    ls.set_event_clock(EventClock::Realtime)
                        .map_err(|e| HardwareError::ConfigFailed(format!("set event clock: {e}")))?;
                }
            }
        }

        Ok(ls)
    }

    fn make_line_config(offset: u32, settings: &LineSettings) -> Result<line::Config, HardwareError> {
        let ls = Self::make_line_settings(settings)?;
        let mut cfg = line::Config::new()
            .map_err(|e| HardwareError::ConfigFailed(format!("line config: {e}")))?;
        cfg.add_line_settings(&[offset], ls)
            .map_err(|e| HardwareError::ConfigFailed(format!("line config add settings: {e}")))?;
        Ok(cfg)
    }
}

impl GpioBackend for LibgpiodBackend {
    fn claim(&self, line: u32, settings: &LineSettings) -> Result<(), HardwareError> {
        let mut lines = self.lines.write();
        if lines.contains_key(&line) {
            return Err(HardwareError::Unavailable(line));
        }

        let line_cfg = Self::make_line_config(line, settings)?;
        let gpiod_handle = Arc::new(FairMutex::new(GpiodHandle::new(
            &self.chip, line, &line_cfg,
        )?));
        lines.insert(
            line,
            LineHandle {
                settings: *settings,
                gpiod_handle,
                listener: None,
            },
        );
        Ok(())
    }

    fn reconfigure(&self, line: u32, settings: &LineSettings) -> Result<(), HardwareError> {
        // the listener holds the line mutex while the handler reads other lines,
        // so never wait on it with the map locked
        let gpiod_handle = self.gpiod_handle(line)?;
        let line_cfg = Self::make_line_config(line, settings)?;
        gpiod_handle
            .lock()
            .request
            .reconfigure_lines(&line_cfg)
            .map_err(|e| HardwareError::ConfigFailed(format!("reconfigure lines: {e}")))?;

        let mut lines = self.lines.write();
        let handle = lines
            .get_mut(&line)
            .ok_or(HardwareError::Unavailable(line))?;
        handle.settings = *settings;
        Ok(())
    }

    fn release(&self, line: u32) {
        // drops the listener before the request it polls
        let handle = self.lines.write().remove(&line);
        if let Some(mut handle) = handle {
            drop(handle.listener.take());
        }
    }

    fn get_settings(&self, line: u32) -> Result<LineSettings, HardwareError> {
        self.lines
            .read()
            .get(&line)
            .map(|h| h.settings)
            .ok_or(HardwareError::Unavailable(line))
    }

    fn read_value(&self, line: u32) -> Result<bool, HardwareError> {
        let value = self
            .gpiod_handle(line)?
            .lock()
            .request
            .value(line)
            .map_err(|e| HardwareError::ConfigFailed(format!("get value: {e}")))?;
        Ok(match value {
            line::Value::InActive => false,
            line::Value::Active => true,
        })
    }

    fn write_value(&self, line: u32, level: bool) -> Result<(), HardwareError> {
        if self.get_settings(line)?.direction != Direction::Output {
            return Err(HardwareError::ConfigFailed(format!(
                "line {line} must be an output to set its value"
            )));
        }

        self.gpiod_handle(line)?
            .lock()
            .request
            .set_value(
                line,
                if level {
                    line::Value::Active
                } else {
                    line::Value::InActive
                },
            )
            .map_err(|e| HardwareError::ConfigFailed(format!("set value: {e}")))?;
        Ok(())
    }

    fn attach_edge(&self, line: u32, handler: EdgeHandler) -> Result<(), HardwareError> {
        let mut lines = self.lines.write();
        let handle = lines
            .get_mut(&line)
            .ok_or(HardwareError::Unavailable(line))?;

        if handle.settings.edge.is_none() {
            return Err(HardwareError::ConfigFailed(format!(
                "line {line} has no edge detection configured"
            )));
        }
        if handle.listener.is_some() {
            return Err(HardwareError::Unavailable(line));
        }

        handle.listener = Some(EdgeListener::new(
            line,
            handle.gpiod_handle.clone(),
            handler,
        )?);
        Ok(())
    }

    fn detach_edge(&self, line: u32) {
        let listener = self
            .lines
            .write()
            .get_mut(&line)
            .and_then(|h| h.listener.take());
        // joins the listener thread outside the map lock
        drop(listener);
    }
}
