pub mod antibot;
pub mod progress_ledger;
pub mod session_store;
