//! Datagram and stream primitives shared by the protocol engine.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use camfleet_core::Result;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, info};

/// Owned command socket. Clones share the same endpoint.
#[derive(Debug, Clone)]
pub struct Transport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
}

impl Transport {
    /// Bind the command socket. Must be called inside a tokio runtime.
    ///
    /// IPv4 sockets are broadcast-enabled so discovery can reach a whole range.
    pub fn open(bind_addr: SocketAddr) -> Result<Self> {
        let socket = Socket::new(
            Domain::for_address(bind_addr),
            Type::DGRAM,
            Some(Protocol::UDP),
        )?;
        if bind_addr.is_ipv4() {
            socket.set_broadcast(true)?;
        }
        socket.set_nonblocking(true)?;
        socket.bind(&bind_addr.into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        let local_addr = socket.local_addr()?;
        info!("Command socket bound on {}", local_addr);

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<()> {
        let sent = self.socket.send_to(payload, target).await?;
        if sent != payload.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram send: {sent} of {} bytes", payload.len()),
            ));
        }
        debug!("Sent {} bytes to {}", sent, target);
        Ok(())
    }

    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    /// Open a dedicated reliable stream to `target`.
    pub async fn connect_stream(target: SocketAddr, wait: Duration) -> io::Result<TcpStream> {
        match tokio::time::timeout(wait, TcpStream::connect(target)).await {
            Ok(stream) => stream,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {target} timed out"),
            )),
        }
    }
}
