//! CLI command implementations
//!
//! Each command follows the same pattern: an Args struct parsed by clap and
//! a Command struct with an async execute taking the loaded config.

pub mod candles;
pub mod close;
pub mod open;
pub mod positions;
pub mod price;
pub mod watch;
