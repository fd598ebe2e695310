//! Network side of camfleet: the shared datagram transport, the protocol
//! engine that fans commands out to a fleet and reconciles the replies,
//! broadcast discovery, and single-file stream downloads.

pub mod discovery;
pub mod download;
pub mod engine;
pub mod outcome;
pub mod transport;

pub use download::DownloadTransfer;
pub use engine::{DispatchOptions, ProtocolEngine};
pub use outcome::{FleetResult, Outcome};
pub use transport::Transport;
