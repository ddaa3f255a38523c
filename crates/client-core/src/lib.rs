//! Configuration, paths and logging shared by the offline sync client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{CacheSettings, ClientConfig, DeliverySettings, SyncSettings, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level, LogConfig};
pub use paths::Paths;
