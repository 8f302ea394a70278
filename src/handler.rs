use std::sync::Arc;

use log::{debug, warn};

use crate::config::EdgeDetect;
use crate::gpio::{EdgeEvent, EdgeHandler, GpioBackend, GpioLine, IrqReturn};
use crate::state::{EdgeSample, SharedStatus};

/// Interrupt-context routine bound to the "detected" line.
///
/// Samples the data lines, lights the indicator and commits one update to
/// the shared status. It has no failure path: a line that cannot be read
/// is sampled as low and logged.
pub struct EdgeEventHandler<B: GpioBackend> {
    data: [Arc<GpioLine<B>>; 4],
    indicator: Arc<GpioLine<B>>,
    status: Arc<SharedStatus>,
}

impl<B: GpioBackend + 'static> EdgeEventHandler<B> {
    pub fn new(
        data: [Arc<GpioLine<B>>; 4],
        indicator: Arc<GpioLine<B>>,
        status: Arc<SharedStatus>,
    ) -> Self {
        Self {
            data,
            indicator,
            status,
        }
    }

    pub fn handle(&self, event: EdgeEvent) -> IrqReturn {
        let mut data_bits = [false; 4];
        for (bit, line) in data_bits.iter_mut().zip(&self.data) {
            *bit = line.read_level().unwrap_or_else(|e| {
                warn!("failed to sample data line {}: {e}", line.id());
                false
            });
        }

        if let Err(e) = self.indicator.write_level(true) {
            warn!("failed to drive indicator line {}: {e}", self.indicator.id());
        }

        let snapshot = self.status.commit(EdgeSample {
            data_bits,
            detected: event.edge == EdgeDetect::Rising,
            indicator_on: true,
            timestamp: event.timestamp,
        });

        debug!(
            "DTMF digit {} (code {}) on line {}, press #{}",
            snapshot.digit, snapshot.digit_code, event.line, snapshot.press_count
        );

        IrqReturn::Handled
    }

    pub fn into_edge_handler(self: Arc<Self>) -> EdgeHandler {
        Arc::new(move |event| self.handle(event))
    }
}
