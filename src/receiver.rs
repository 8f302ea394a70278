use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::config::ReceiverConfig;
use crate::debounce::DebounceController;
use crate::error::InitError;
use crate::gpio::{GpioBackend, GpioLine, LineSettings, realtime_now};
use crate::handler::EdgeEventHandler;
use crate::properties::PropertySurface;
use crate::registry::{PropertyGroup, PropertyRegistry};
use crate::state::SharedStatus;

// field order is release order on drop
struct Resources<B: GpioBackend> {
    backend: Arc<B>,
    group: PropertyGroup<B>,
    power_down: Arc<GpioLine<B>>,
    detected: Arc<GpioLine<B>>,
    data: [Arc<GpioLine<B>>; 4],
    indicator: Arc<GpioLine<B>>,
}

/// A running receiver. Dropping it stops it.
pub struct DtmfReceiver<B: GpioBackend> {
    group: String,
    status: Arc<SharedStatus>,
    surface: Arc<PropertySurface<B>>,
    resources: Mutex<Option<Resources<B>>>,
}

impl<B: GpioBackend + 'static> DtmfReceiver<B> {
    /// Claims the lines, mounts the property group and arms the edge
    /// handler, in that order. On failure everything acquired so far is
    /// released in reverse order before the error is returned.
    pub fn start(
        config: &ReceiverConfig,
        backend: Arc<B>,
        registry: &Arc<PropertyRegistry<B>>,
    ) -> Result<Self, InitError> {
        config.validate().map_err(InitError::Config)?;

        let group = config.group_name();
        info!(
            "initializing DTMF receiver {group}: detected={} data={:?} power_down={} led={} edge={:?}",
            config.detected, config.data, config.power_down, config.led, config.edge
        );

        let status = Arc::new(SharedStatus::new(
            realtime_now(),
            config.history_capacity,
            config.broadcast_capacity,
        ));

        let output = |line: u32| -> Result<Arc<GpioLine<B>>, InitError> {
            let line = GpioLine::export(backend.clone(), line, LineSettings::output())?;
            line.write_level(false)?;
            Ok(Arc::new(line))
        };
        let input = |line: u32, settings: LineSettings| -> Result<Arc<GpioLine<B>>, InitError> {
            Ok(Arc::new(GpioLine::export(backend.clone(), line, settings)?))
        };
        let data_settings = LineSettings::input(config.debounce_ms, None);

        let indicator = output(config.led)?;
        let [d1, d2, d3, d4] = config.data;
        let data = [
            input(d1, data_settings)?,
            input(d2, data_settings)?,
            input(d3, data_settings)?,
            input(d4, data_settings)?,
        ];
        let detected = input(
            config.detected,
            LineSettings::input(config.debounce_ms, Some(config.edge)),
        )?;
        let power_down = output(config.power_down)?;

        match detected.read_level() {
            Ok(level) => info!("{group}: detected line is currently {}", u8::from(level)),
            Err(e) => warn!("{group}: could not read detected line: {e}"),
        }

        let surface = Arc::new(PropertySurface::new(
            group.clone(),
            status.clone(),
            detected.clone(),
            power_down.clone(),
            DebounceController::new(detected.clone(), config.debounce_ms),
        ));
        let mounted = registry.create_group(surface.clone())?;

        let handler = Arc::new(EdgeEventHandler::new(
            data.clone(),
            indicator.clone(),
            status.clone(),
        ));
        backend
            .attach_edge(detected.id(), handler.into_edge_handler())
            .map_err(|e| InitError::InterruptAttachFailed(e.to_string()))?;
        info!(
            "{group}: edge handler armed on line {} ({:?})",
            detected.id(),
            config.edge
        );

        Ok(Self {
            group,
            status,
            surface,
            resources: Mutex::new(Some(Resources {
                backend,
                group: mounted,
                power_down,
                detected,
                data,
                indicator,
            })),
        })
    }
}

impl<B: GpioBackend> DtmfReceiver<B> {
    /// Detaches the edge handler, turns the indicator off, unmounts the
    /// property group and releases every line. Calling it again is a no-op.
    pub fn stop(&self) {
        let Some(res) = self.resources.lock().take() else {
            debug!("{}: already stopped", self.group);
            return;
        };

        res.backend.detach_edge(res.detected.id());

        if let Err(e) = res.indicator.write_level(false) {
            warn!("{}: failed to turn indicator off: {e}", self.group);
        }
        self.status.set_indicator(false);

        res.group.remove();

        res.detected.unexport();
        for line in &res.data {
            line.unexport();
        }
        res.power_down.unexport();
        res.indicator.unexport();

        info!(
            "{}: DTMF was detected {} times, receiver stopped",
            self.group,
            self.status.snapshot().press_count
        );
    }

    pub fn group_name(&self) -> &str {
        &self.group
    }

    pub fn status(&self) -> &Arc<SharedStatus> {
        &self.status
    }

    pub fn surface(&self) -> &Arc<PropertySurface<B>> {
        &self.surface
    }

    pub fn is_running(&self) -> bool {
        self.resources.lock().is_some()
    }
}

impl<B: GpioBackend> Drop for DtmfReceiver<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
