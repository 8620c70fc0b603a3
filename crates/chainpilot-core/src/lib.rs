pub mod chain;
pub mod chain_client;
pub mod config;
pub mod confirm;
pub mod engine;
pub mod erc20;
pub mod error;
pub mod executor;
pub mod invocation;
pub mod params;
pub mod protocol;
pub mod protocols;
pub mod queue;
pub mod reconcile;
pub mod sequence;
pub mod registry;
pub mod signer;
pub mod store;
pub mod stream;
pub mod tokens;
pub mod tools;
pub mod types;
pub mod units;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::{PilotError, Result};
