pub mod chain;
pub mod cli;
pub mod config;
pub mod errors;
pub mod feed;
pub mod instruments;
pub mod logging;
pub mod store;
pub mod types;
pub mod valuation;
