pub mod discovery;
pub mod download;
pub mod harvest;

pub use harvest::{Harvester, RunOutcome, RunReport};
