//! Opening the raw line stream.
//!
//! The transport itself (authentication, encryption) is someone else's
//! problem. A [`Connector`] just hands back something line-readable.

use std::future::Future;
use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

/// Errors opening or reading the event stream.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("connection refused by {host}:{port}")]
    Refused { host: String, port: u16 },
}

/// Opens one connection to the event source.
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncBufRead + Unpin + Send + 'static;

    fn connect(&self) -> impl Future<Output = Result<Self::Stream, ConnectionError>> + Send;
}

/// Reads events from a plain TCP socket, e.g. an SSH tunnel's local end.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        TcpConnector {
            host: host.into(),
            port,
        }
    }
}

impl Connector for TcpConnector {
    type Stream = BufReader<TcpStream>;

    async fn connect(&self) -> Result<Self::Stream, ConnectionError> {
        debug!(host = %self.host, port = self.port, "Opening TCP connection");
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::ConnectionRefused => ConnectionError::Refused {
                    host: self.host.clone(),
                    port: self.port,
                },
                _ => ConnectionError::Io(e),
            })?;
        Ok(BufReader::new(stream))
    }
}
