//! Client facade: address management and the fleet operation set.

use std::time::Duration;

use camfleet_core::{AddressSet, ClientConfig, Error, NetworkRange, Result, ServerAddress};
use camfleet_net::{DispatchOptions, DownloadTransfer, FleetResult, ProtocolEngine, Transport};
use camfleet_protocol::{
    AgcMode, AwbMode, Command, FileRecord, MeteringMode, Reply, Resolution, ServerStatus,
};
use parking_lot::RwLock;
use tokio::io::AsyncWrite;
use tracing::{debug, info};

use crate::capture::CaptureScheduler;

/// Handle on a fleet of camera servers.
///
/// Owns the command socket for its whole lifetime; dropping or closing the
/// client releases it. Every multi-server call works on a snapshot of the
/// address set taken when the call starts.
pub struct Client {
    config: ClientConfig,
    addresses: RwLock<AddressSet>,
    engine: ProtocolEngine,
    downloads: DownloadTransfer,
}

impl Client {
    /// Bind the command socket and start with an empty address set.
    /// Must be called inside a tokio runtime.
    pub async fn open(config: ClientConfig) -> Result<Self> {
        let transport = Transport::open(config.bind_addr)?;
        let engine = ProtocolEngine::new(transport, &config);
        let addresses = match config.network {
            Some(range) => AddressSet::with_network(range),
            None => AddressSet::new(),
        };
        info!(
            "Client opened on {} (server port {})",
            engine.transport().local_addr(),
            config.port
        );
        Ok(Self {
            downloads: DownloadTransfer::new(config.download_timeout()),
            addresses: RwLock::new(addresses),
            engine,
            config,
        })
    }

    /// Release the command socket.
    pub fn close(self) {
        info!(
            "Client on {} closed",
            self.engine.transport().local_addr()
        );
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    // ---------------------------------------------------------------
    // Addresses
    // ---------------------------------------------------------------

    pub fn network(&self) -> Option<NetworkRange> {
        self.addresses.read().network()
    }

    pub fn set_network(&self, range: NetworkRange) {
        self.addresses.write().set_network(range);
    }

    /// Add a server manually. Returns false if it was already known.
    pub fn add(&self, address: ServerAddress) -> bool {
        self.addresses.write().add(address)
    }

    /// Parse and add a server given as `ip` or `ip:port`; a missing port
    /// defaults to the configured server port.
    pub fn add_str(&self, address: &str) -> Result<ServerAddress> {
        let address = ServerAddress::parse_with_port(address, self.config.port)?;
        self.add(address);
        Ok(address)
    }

    pub fn remove(&self, address: &ServerAddress) -> bool {
        self.addresses.write().remove(address)
    }

    /// Snapshot of the current address set.
    pub fn addresses(&self) -> Vec<ServerAddress> {
        self.addresses.read().snapshot()
    }

    pub fn len(&self) -> usize {
        self.addresses.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.read().is_empty()
    }

    /// Discover servers on the configured network. Waits until `expected`
    /// servers answered or the window (default from config) elapsed, then
    /// returns the size of the address set. Finding fewer is not an error.
    pub async fn find(&self, expected: usize, window: Option<Duration>) -> Result<usize> {
        let range = self.network().ok_or_else(|| {
            Error::Validation("no network range configured for discovery".into())
        })?;
        let window = window.unwrap_or_else(|| self.config.discovery_timeout());
        let found = self
            .engine
            .discover(range, self.config.port, expected, window)
            .await?;
        let count = self.addresses.write().replace_discovered(found);
        info!("Address set now holds {} servers", count);
        Ok(count)
    }

    // ---------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------

    /// Send an acknowledged command to `targets`. Any failing server turns
    /// the call into `Error::PartialFleetFailure`.
    pub async fn command(
        &self,
        targets: &[ServerAddress],
        command: Command,
    ) -> Result<FleetResult<()>> {
        let result = self
            .engine
            .dispatch(targets, command, DispatchOptions::default())
            .await?;
        result.and_then(Reply::into_ack).into_uniform()
    }

    async fn command_all(&self, command: Command) -> Result<FleetResult<()>> {
        let targets = self.addresses();
        self.command(&targets, command).await
    }

    pub async fn resolution(&self, width: u32, height: u32) -> Result<FleetResult<()>> {
        self.command_all(Command::resolution(Resolution::new(width, height)))
            .await
    }

    pub async fn framerate(&self, rate: f64) -> Result<FleetResult<()>> {
        self.command_all(Command::Framerate { rate }).await
    }

    /// Gain may only be given with `AgcMode::Off`.
    pub async fn agc(&self, mode: AgcMode, gain: Option<f64>) -> Result<FleetResult<()>> {
        self.command_all(Command::Agc { mode, gain }).await
    }

    /// `(red, blue)` gains are required with `AwbMode::Off` and rejected otherwise.
    pub async fn awb(&self, mode: AwbMode, gains: Option<(f64, f64)>) -> Result<FleetResult<()>> {
        let (red, blue) = match gains {
            Some((red, blue)) => (Some(red), Some(blue)),
            None => (None, None),
        };
        self.command_all(Command::Awb { mode, red, blue }).await
    }

    /// 0 selects automatic ISO.
    pub async fn iso(&self, iso: u32) -> Result<FleetResult<()>> {
        self.command_all(Command::Iso { iso }).await
    }

    pub async fn metering(&self, mode: MeteringMode) -> Result<FleetResult<()>> {
        self.command_all(Command::Metering { mode }).await
    }

    pub async fn brightness(&self, value: i32) -> Result<FleetResult<()>> {
        self.command_all(Command::Brightness { value }).await
    }

    pub async fn contrast(&self, value: i32) -> Result<FleetResult<()>> {
        self.command_all(Command::Contrast { value }).await
    }

    pub async fn saturation(&self, value: i32) -> Result<FleetResult<()>> {
        self.command_all(Command::Saturation { value }).await
    }

    /// Exposure compensation.
    pub async fn ev(&self, value: i32) -> Result<FleetResult<()>> {
        self.command_all(Command::Ev { value }).await
    }

    pub async fn denoise(&self, enabled: bool) -> Result<FleetResult<()>> {
        self.command_all(Command::Denoise { enabled }).await
    }

    /// Ask every server to blink its indicator.
    pub async fn identify(&self) -> Result<FleetResult<()>> {
        self.command_all(Command::Identify).await
    }

    /// Capture `count` images on every server, optionally from the video
    /// port, optionally synchronized `delay` seconds from now.
    pub async fn capture(
        &self,
        count: u32,
        video_port: bool,
        delay: Option<f64>,
    ) -> Result<FleetResult<()>> {
        let targets = self.addresses();
        CaptureScheduler::new(&self.engine)
            .capture(&targets, count, video_port, delay)
            .await?
            .into_uniform()
    }

    /// Remove every stored capture on every server.
    pub async fn clear(&self) -> Result<FleetResult<()>> {
        self.command_all(Command::Clear).await
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Status of every server. Failures stay in the map for the caller.
    pub async fn status(&self) -> Result<FleetResult<ServerStatus>> {
        let targets = self.addresses();
        self.status_of(&targets).await
    }

    pub async fn status_of(&self, targets: &[ServerAddress]) -> Result<FleetResult<ServerStatus>> {
        let result = self
            .engine
            .dispatch(targets, Command::Status, DispatchOptions::default())
            .await?;
        Ok(result.and_then(Reply::into_status))
    }

    /// Stored captures per server, in server order.
    pub async fn list(&self) -> Result<FleetResult<Vec<FileRecord>>> {
        let targets = self.addresses();
        self.list_of(&targets).await
    }

    pub async fn list_of(&self, targets: &[ServerAddress]) -> Result<FleetResult<Vec<FileRecord>>> {
        let result = self
            .engine
            .dispatch(targets, Command::List, DispatchOptions::default())
            .await?;
        Ok(result.and_then(Reply::into_files))
    }

    /// Copy one stored file into `sink`, returning the bytes written.
    pub async fn download<W>(&self, address: ServerAddress, index: u32, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if !self.addresses.read().contains(&address) {
            debug!("Downloading from {} which is not in the address set", address);
        }
        self.downloads.download(address, index, sink).await
    }
}
