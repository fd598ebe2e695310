//! Broadcast discovery of camera servers.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use camfleet_core::{NetworkRange, Result, ServerAddress};
use camfleet_protocol::wire::MAX_DATAGRAM_SIZE;
use camfleet_protocol::{Command, Request, Response};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::ProtocolEngine;

/// Probes sent per discovery window, spread evenly across it.
const PROBES_PER_WINDOW: u32 = 3;

impl ProtocolEngine {
    /// Broadcast a hello probe into `range` and collect distinct responders.
    ///
    /// Stops once `expected` servers have answered or `window` has elapsed.
    /// An `expected` of zero always waits for the full window. Replies from
    /// outside `range` are ignored and repeated replies count once.
    pub async fn discover(
        &self,
        range: NetworkRange,
        port: u16,
        expected: usize,
        window: Duration,
    ) -> Result<Vec<ServerAddress>> {
        let probe = Request::new(0, Command::Hello).encode()?;
        let target = SocketAddr::new(IpAddr::V4(range.broadcast()), port);

        let _round = self.lock_round().await;
        let transport = self.transport();

        let deadline = Instant::now() + window;
        let probe_interval = window / PROBES_PER_WINDOW;
        let mut probes_left = PROBES_PER_WINDOW;
        let mut next_probe = Instant::now();

        let mut found: Vec<ServerAddress> = Vec::new();
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        info!("Discovering servers on {} (port {})", range, port);

        loop {
            if expected > 0 && found.len() >= expected {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if probes_left > 0 && now >= next_probe {
                if let Err(e) = transport.send_to(&probe, target).await {
                    warn!("Discovery probe to {} failed: {}", target, e);
                }
                probes_left -= 1;
                next_probe = now + probe_interval;
            }

            let wake = if probes_left > 0 {
                next_probe.min(deadline)
            } else {
                deadline
            };

            let (len, from) = match tokio::time::timeout_at(wake, transport.recv_from(&mut buf)).await
            {
                Ok(Ok(received)) => received,
                Ok(Err(e)) => {
                    debug!("Receive error during discovery: {}", e);
                    continue;
                }
                Err(_) => continue,
            };

            if !range.contains(from.ip()) {
                debug!("Ignoring reply from {} outside {}", from, range);
                continue;
            }
            match Response::decode(&buf[..len]) {
                Ok(response) if response.seq == 0 => {
                    let address = ServerAddress::new(from);
                    if !found.contains(&address) {
                        debug!("Discovered {}", address);
                        found.push(address);
                    }
                }
                Ok(response) => {
                    debug!("Ignoring late command reply from {} (seq {})", from, response.seq)
                }
                Err(e) => debug!("Ignoring undecodable discovery reply from {}: {}", from, e),
            }
        }

        info!("Discovery found {} servers on {}", found.len(), range);
        Ok(found)
    }
}
