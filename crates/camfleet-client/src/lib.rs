//! camfleet client: the entry point front ends use to drive a fleet of
//! network camera servers.
//!
//! Commands fan out to every known server at once and come back as a
//! [`FleetResult`] keyed by server address. Settings, capture and clear
//! treat any failing server as an error; status and listing hand back the
//! full map so callers can spot stragglers themselves.

pub mod capture;
pub mod client;
pub mod skew;

pub use camfleet_core::{AddressSet, ClientConfig, Error, Failure, NetworkRange, Result, ServerAddress};
pub use camfleet_net::{DispatchOptions, FleetResult, Outcome};
pub use camfleet_protocol::{
    AgcMode, AwbMode, Command, FileRecord, FileType, MeteringMode, Resolution, ServerStatus,
};
pub use capture::CaptureScheduler;
pub use client::Client;
pub use skew::SkewReport;
