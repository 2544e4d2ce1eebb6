pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod push;

pub use config::PushConfig;
pub use error::{DispatchError, Result};
pub use push::{
    App, DeliveryOutcome, Device, EventSink, LogLevel, NotificationKind, PushDispatcher,
    PushVendor, TracingEventSink,
};
