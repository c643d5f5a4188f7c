pub mod broker;
pub mod credential;

pub use broker::{BrokerConfig, CredentialBroker};
