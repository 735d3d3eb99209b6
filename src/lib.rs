pub mod core;
pub mod features;
pub mod scraping;
pub mod tools;

// --- Primary core exports ---
pub use core::types::*;
pub use core::{HarvestConfig, HarvestError, HarvestResult, RunLog, StopSignal};

// --- Short module paths ---
pub use features::{antibot, progress_ledger, session_store};
pub use scraping::{browser_manager, navigator};
pub use tools::{discovery, download, harvest};
pub use tools::{Harvester, RunOutcome, RunReport};
