pub mod dispatcher;
pub mod payload;
pub mod provider;
pub mod sink;
pub mod types;

pub use dispatcher::PushDispatcher;
pub use payload::{build_call_payload, build_message_payload, PushPayload};
pub use sink::{EventSink, RecordingSink, TracingEventSink};
pub use types::{
    App, DeliveryOutcome, Device, LogLevel, NotificationKind, NotificationRequest, PushVendor,
};
