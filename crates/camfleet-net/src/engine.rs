//! Protocol engine: fans one command out to many servers and reconciles
//! the replies into a per-server outcome map.
//!
//! Every target gets its own exchange task with its own sequence number and
//! reply channel. A single collector task owns the receive side of the shared
//! socket and routes each datagram to the exchange waiting on that sender,
//! dropping replies whose sequence number does not match.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use camfleet_core::{ClientConfig, Failure, Result, ServerAddress};
use camfleet_protocol::wire::MAX_DATAGRAM_SIZE;
use camfleet_protocol::{Command, Reply, Request, Response};
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::outcome::{FleetResult, Outcome};
use crate::transport::Transport;

/// Per-call overrides of the engine defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    pub timeout: Option<Duration>,
    /// Extra sends for idempotent commands. Ignored for mutating commands.
    pub retries: Option<u32>,
}

impl DispatchOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            retries: None,
        }
    }
}

/// An exchange waiting for its reply.
struct Pending {
    seq: u32,
    tx: mpsc::UnboundedSender<Outcome<Reply>>,
}

pub struct ProtocolEngine {
    transport: Transport,
    timeout: Duration,
    query_retries: u32,
    sequences: Mutex<HashMap<ServerAddress, u32>>,
    /// Held for a whole round so concurrent rounds never steal each other's replies.
    round: tokio::sync::Mutex<()>,
}

impl ProtocolEngine {
    pub fn new(transport: Transport, config: &ClientConfig) -> Self {
        Self {
            transport,
            timeout: config.timeout(),
            query_retries: config.query_retries,
            sequences: Mutex::new(HashMap::new()),
            round: tokio::sync::Mutex::new(()),
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    /// Next sequence number for `address`. Zero is reserved for discovery.
    fn next_seq(&self, address: ServerAddress) -> u32 {
        let mut sequences = self.sequences.lock();
        let seq = sequences.entry(address).or_insert(0);
        *seq = seq.wrapping_add(1).max(1);
        *seq
    }

    /// Exclusive use of the command socket for one round.
    pub(crate) async fn lock_round(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.round.lock().await
    }

    /// Send `command` to every address concurrently and wait for all of them.
    ///
    /// The returned map has exactly one entry per distinct address. Local
    /// validation and encoding errors are returned before anything is sent.
    pub async fn dispatch(
        &self,
        addresses: &[ServerAddress],
        command: Command,
        options: DispatchOptions,
    ) -> Result<FleetResult<Reply>> {
        command.validate()?;
        self.dispatch_with(addresses, move || Ok(command), options).await
    }

    /// Like [`dispatch`](Self::dispatch), but `build` runs only once this
    /// round holds the command socket. Anything relative to the current time
    /// is then measured from the moment of sending, not from when the call
    /// started queueing behind another round.
    pub async fn dispatch_with<F>(
        &self,
        addresses: &[ServerAddress],
        build: F,
        options: DispatchOptions,
    ) -> Result<FleetResult<Reply>>
    where
        F: FnOnce() -> Result<Command>,
    {
        let mut targets: Vec<ServerAddress> = Vec::with_capacity(addresses.len());
        for address in addresses {
            if !targets.contains(address) {
                targets.push(*address);
            }
        }

        let _round = if targets.is_empty() {
            None
        } else {
            Some(self.lock_round().await)
        };
        let command = build()?;
        command.validate()?;

        if targets.is_empty() {
            debug!("Dispatch of {} with no targets", command.name());
            return Ok(FleetResult::new());
        }

        let timeout = options.timeout.unwrap_or(self.timeout);
        let attempts = if command.is_idempotent() {
            1 + options.retries.unwrap_or(self.query_retries)
        } else {
            1
        };

        let mut pending: HashMap<SocketAddr, Pending> = HashMap::with_capacity(targets.len());
        let mut exchanges = Vec::with_capacity(targets.len());
        for address in &targets {
            let seq = self.next_seq(*address);
            let payload = Request::new(seq, command.clone()).encode()?;
            let (tx, rx) = mpsc::unbounded_channel();
            pending.insert(address.socket_addr(), Pending { seq, tx });
            exchanges.push((*address, payload, rx));
        }

        let collector = tokio::spawn(collect_replies(self.transport.clone(), pending));

        let started = Instant::now();
        let handles: Vec<_> = exchanges
            .into_iter()
            .map(|(address, payload, rx)| {
                let transport = self.transport.clone();
                let handle = tokio::spawn(exchange(
                    transport, address, payload, rx, timeout, attempts,
                ));
                (address, handle)
            })
            .collect();

        let (addrs, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let joined = join_all(handles).await;
        collector.abort();

        let result: FleetResult<Reply> = addrs
            .into_iter()
            .zip(joined)
            .map(|(address, joined)| {
                let outcome = joined.unwrap_or_else(|e| {
                    Err(Failure::Unreachable {
                        reason: format!("exchange task failed: {e}"),
                    })
                });
                (address, outcome)
            })
            .collect();

        let failed = result.failures().count();
        if failed > 0 {
            warn!(
                "{}: {} of {} servers failed ({:?})",
                command.name(),
                failed,
                result.len(),
                started.elapsed()
            );
        } else {
            info!(
                "{}: {} servers replied ({:?})",
                command.name(),
                result.len(),
                started.elapsed()
            );
        }
        Ok(result)
    }
}

/// One server's exchange: send, wait, and for idempotent commands resend
/// within the overall deadline.
async fn exchange(
    transport: Transport,
    address: ServerAddress,
    payload: Vec<u8>,
    mut rx: mpsc::UnboundedReceiver<Outcome<Reply>>,
    timeout: Duration,
    attempts: u32,
) -> Outcome<Reply> {
    let deadline = Instant::now() + timeout;
    let interval = timeout / attempts.max(1);

    for attempt in 1..=attempts {
        if let Err(e) = transport.send_to(&payload, address.socket_addr()).await {
            warn!("Send to {} failed: {}", address, e);
            return Err(Failure::Unreachable {
                reason: e.to_string(),
            });
        }

        let wait_until = if attempt == attempts {
            deadline
        } else {
            (Instant::now() + interval).min(deadline)
        };

        match tokio::time::timeout_at(wait_until, rx.recv()).await {
            Ok(Some(outcome)) => return outcome.and_then(Reply::into_result),
            Ok(None) => break,
            Err(_) => debug!("No reply from {} (attempt {}/{})", address, attempt, attempts),
        }
    }
    Err(Failure::Timeout)
}

/// Route incoming datagrams to the exchange waiting on each sender.
async fn collect_replies(transport: Transport, mut pending: HashMap<SocketAddr, Pending>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    while !pending.is_empty() {
        let (len, from) = match transport.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                // Some platforms surface ICMP errors from earlier sends here.
                debug!("Receive error on command socket: {}", e);
                continue;
            }
        };

        let Some(waiting) = pending.get(&from) else {
            debug!("Ignoring datagram from unexpected sender {}", from);
            continue;
        };

        let outcome = match Response::decode(&buf[..len]) {
            Ok(response) if response.seq == waiting.seq => Ok(response.reply),
            Ok(response) => {
                debug!(
                    "Discarding stale reply from {} (seq {}, expected {})",
                    from, response.seq, waiting.seq
                );
                continue;
            }
            Err(e) => {
                warn!("Undecodable reply from {}: {}", from, e);
                Err(Failure::Decode {
                    reason: e.to_string(),
                })
            }
        };

        if let Some(waiting) = pending.remove(&from) {
            let _ = waiting.tx.send(outcome);
        }
    }
}
