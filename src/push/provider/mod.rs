pub mod apns;
pub mod fcm;
pub mod gcm;
pub mod mock;
pub mod provider_trait;

#[cfg(test)]
pub(crate) mod gateway_stub;

pub use apns::ApnsProvider;
pub use fcm::FcmProvider;
pub use gcm::GcmProvider;
pub use mock::{MockDelivery, MockProvider};
pub use provider_trait::PushProvider;
