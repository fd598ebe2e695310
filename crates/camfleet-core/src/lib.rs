//! camfleet core: error types, client configuration, server addressing.

pub mod address;
pub mod config;
pub mod error;

pub use address::{AddressSet, NetworkRange, ServerAddress};
pub use config::{ClientConfig, DEFAULT_PORT};
pub use error::{Error, Failure, Result};
