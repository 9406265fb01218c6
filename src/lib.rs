pub mod abi;
pub mod cli;
pub mod codec;
pub mod commands;
pub mod config;
pub mod fixtures;
pub mod methods;
#[cfg(any(test, feature = "testing"))]
pub mod mock;
pub mod rpc;
pub mod scenario;
pub mod transport;
