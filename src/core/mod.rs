pub mod config;
pub mod error;
pub mod run_context;
pub mod types;

pub use config::HarvestConfig;
pub use error::{HarvestError, HarvestResult};
pub use run_context::{RunLog, StopSignal};
