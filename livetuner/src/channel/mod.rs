pub mod catalog;
pub mod types;

pub use catalog::ChannelCatalog;
pub use types::{Broadcast, Channel, LiveCheck, UpdateMode};
