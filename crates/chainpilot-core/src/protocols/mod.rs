//! Built-in protocol modules and tool providers.

pub mod chain_tools;
pub mod strike;
pub mod stryke;
pub mod symbiosis;
pub mod transfer;
