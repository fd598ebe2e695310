//! Single-file download over a dedicated stream connection.

use std::io;
use std::time::Duration;

use camfleet_core::{Error, Result, ServerAddress};
use camfleet_protocol::wire::{decode_download_size, encode_download_request, DOWNLOAD_SIZE_HEADER};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::transport::Transport;

const CHUNK_SIZE: usize = 64 * 1024;
/// How long to wait for the server to close after the declared bytes.
const END_GRACE: Duration = Duration::from_millis(250);

/// Fetches stored captures one file per call.
///
/// Each call owns its connection; callers wanting parallel downloads issue
/// calls concurrently. Nothing is retried, and a failed transfer leaves
/// whatever was already written in the sink.
#[derive(Debug, Clone, Copy)]
pub struct DownloadTransfer {
    /// Limit on connecting and on each individual read or write.
    timeout: Duration,
}

impl DownloadTransfer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Copy file `index` from `address` into `sink`. Returns the byte count,
    /// which always equals the size the server declared.
    pub async fn download<W>(&self, address: ServerAddress, index: u32, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut stream = Transport::connect_stream(address.socket_addr(), self.timeout)
            .await
            .map_err(|e| transfer(address, index, format!("connect failed: {e}")))?;

        self.io(stream.write_all(&encode_download_request(index)))
            .await
            .map_err(|e| transfer(address, index, format!("sending request: {e}")))?;

        let mut header = [0u8; DOWNLOAD_SIZE_HEADER];
        self.io(stream.read_exact(&mut header))
            .await
            .map_err(|e| transfer(address, index, format!("reading size header: {e}")))?;
        let size = decode_download_size(header);
        debug!("{} file {}: {} bytes declared", address, index, size);

        let copied = self
            .copy_exact(&mut stream, sink, size)
            .await
            .map_err(|e| transfer(address, index, e))?;

        self.expect_end(&mut stream, size)
            .await
            .map_err(|e| transfer(address, index, e))?;

        self.io(sink.flush())
            .await
            .map_err(|e| transfer(address, index, format!("flushing sink: {e}")))?;

        info!("Downloaded file {} from {} ({} bytes)", index, address, copied);
        Ok(copied)
    }

    async fn copy_exact<R, W>(
        &self,
        stream: &mut R,
        sink: &mut W,
        size: u64,
    ) -> std::result::Result<u64, String>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut copied: u64 = 0;
        while copied < size {
            let want = (size - copied).min(CHUNK_SIZE as u64) as usize;
            let n = self
                .io(stream.read(&mut buf[..want]))
                .await
                .map_err(|e| format!("reading after {copied} of {size} bytes: {e}"))?;
            if n == 0 {
                return Err(format!("stream ended after {copied} of {size} bytes"));
            }
            self.io(sink.write_all(&buf[..n]))
                .await
                .map_err(|e| format!("writing sink: {e}"))?;
            copied += n as u64;
        }
        Ok(copied)
    }

    /// The server closes after the declared size; any further byte is a
    /// protocol violation. A server that keeps the stream open gets a short
    /// grace period, not the full transfer timeout.
    async fn expect_end<R>(&self, stream: &mut R, size: u64) -> std::result::Result<(), String>
    where
        R: AsyncRead + Unpin,
    {
        let mut extra = [0u8; 1];
        let grace = self.timeout.min(END_GRACE);
        match tokio::time::timeout(grace, stream.read(&mut extra)).await {
            Ok(Ok(0)) => Ok(()),
            Ok(Ok(_)) => Err(format!("server sent more than the declared {size} bytes")),
            Ok(Err(e)) => {
                debug!("Stream error after complete transfer: {}", e);
                Ok(())
            }
            Err(_) => {
                debug!("Server kept the stream open after {} bytes", size);
                Ok(())
            }
        }
    }

    async fn io<T>(&self, op: impl std::future::Future<Output = io::Result<T>>) -> io::Result<T> {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
        }
    }
}

fn transfer(address: ServerAddress, index: u32, detail: String) -> Error {
    Error::Transfer(format!("{address} file {index}: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camfleet_protocol::wire::{decode_download_request, encode_download_size};
    use tokio::net::TcpListener;

    /// Serves one connection: reads the index, declares `declared` bytes and
    /// sends `body`, then closes.
    async fn serve_once(declared: u64, body: Vec<u8>) -> (ServerAddress, tokio::task::JoinHandle<u32>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = ServerAddress::new(listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4];
            socket.read_exact(&mut request).await.unwrap();
            socket.write_all(&encode_download_size(declared)).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.unwrap();
            decode_download_request(request)
        });
        (address, handle)
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_exact_copy() {
        let body = payload(200_000);
        let (address, server) = serve_once(body.len() as u64, body.clone()).await;

        let mut sink: Vec<u8> = Vec::new();
        let copied = DownloadTransfer::new(Duration::from_secs(5))
            .download(address, 3, &mut sink)
            .await
            .unwrap();

        assert_eq!(copied, body.len() as u64);
        assert_eq!(sink, body);
        assert_eq!(server.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let (address, _server) = serve_once(0, Vec::new()).await;
        let mut sink: Vec<u8> = Vec::new();
        let copied = DownloadTransfer::new(Duration::from_secs(5))
            .download(address, 1, &mut sink)
            .await
            .unwrap();
        assert_eq!(copied, 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_short_stream_fails() {
        let (address, _server) = serve_once(1000, payload(600)).await;
        let mut sink: Vec<u8> = Vec::new();
        let err = DownloadTransfer::new(Duration::from_secs(5))
            .download(address, 1, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transfer(_)));
        assert!(err.to_string().contains("600 of 1000"));
        // Partial data stays in the sink.
        assert_eq!(sink.len(), 600);
    }

    #[tokio::test]
    async fn test_surplus_bytes_fail() {
        let (address, _server) = serve_once(100, payload(150)).await;
        let mut sink: Vec<u8> = Vec::new();
        let err = DownloadTransfer::new(Duration::from_secs(5))
            .download(address, 1, &mut sink)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("more than the declared 100 bytes"));
    }

    #[tokio::test]
    async fn test_lingering_stream_does_not_stall() {
        let body = payload(5000);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = ServerAddress::new(listener.local_addr().unwrap());
        let expected = body.clone();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4];
            socket.read_exact(&mut request).await.unwrap();
            socket.write_all(&encode_download_size(body.len() as u64)).await.unwrap();
            socket.write_all(&body).await.unwrap();
            // Keep the connection open well past the transfer.
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let started = std::time::Instant::now();
        let mut sink: Vec<u8> = Vec::new();
        let copied = DownloadTransfer::new(Duration::from_secs(10))
            .download(address, 1, &mut sink)
            .await
            .unwrap();
        assert_eq!(copied, 5000);
        assert_eq!(sink, expected);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let address: ServerAddress = format!("127.0.0.1:{port}").parse().unwrap();
        let mut sink: Vec<u8> = Vec::new();
        let err = DownloadTransfer::new(Duration::from_secs(2))
            .download(address, 1, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transfer(ref msg) if msg.contains("connect failed")));
    }
}
