pub mod config;
pub mod error;
pub mod error_recovery;
pub mod types;
