pub mod config;
pub mod deps;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use deps::{CacheInvalidator, EngineDeps, NoopInvalidator, RecordStore};
pub use error::PropMatchError;
pub use types::*;
