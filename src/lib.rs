mod backend;
mod config;
mod debounce;
mod decoder;
mod error;
mod gpio;
mod handler;
mod properties;
mod receiver;
mod registry;
mod routes;
mod state;

pub use config::{AppConfig, EdgeDetect, HttpConfig, ReceiverConfig};
pub use debounce::DebounceController;
pub use decoder::{DigitSymbol, INVALID_CODE, compose, decode};
pub use error::{AppError, HardwareError, InitError};
pub use gpio::{
    Direction, EdgeEvent, EdgeHandler, GpioBackend, GpioLine, IrqReturn, LineSettings,
};
pub use handler::EdgeEventHandler;
pub use properties::{
    Access, Attribute, ENDPOINTS, PropertyEndpoint, PropertySurface, find_endpoint,
    format_elapsed, format_time_of_day,
};
pub use receiver::DtmfReceiver;
pub use registry::{PropertyGroup, PropertyRegistry};
pub use routes::AppState;
pub use state::{DigitEvent, EdgeSample, SharedStatus, StatusSnapshot};

#[cfg(feature = "hardware-gpio")]
pub use backend::LibgpiodBackend;
pub use backend::MockGpioBackend;
