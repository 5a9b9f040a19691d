//! Sensor byte stream sources.
//!
//! The sensor is normally wired to a UART and shows up as a device node
//! (e.g. `/dev/serial0`); line settings such as baud rate are applied
//! outside the process. For bench setups the same byte stream can be served
//! over TCP by a serial-to-network bridge (`tcp://host:port`).

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;

use thiserror::Error;
use tokio::io::AsyncRead;

/// Errors raised while opening a sensor source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source string is neither a path nor a `tcp://` address.
    #[error("Invalid sensor source: {0}")]
    InvalidSource(String),

    /// The source could not be opened.
    #[error("Failed to open sensor source {endpoint}: {source}")]
    Open {
        /// Human-readable description of the endpoint.
        endpoint: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Boxed byte stream returned by [`SensorEndpoint`].
pub type SensorReader = Pin<Box<dyn AsyncRead + Send>>;

/// Something the detection worker can (re)open to get sensor bytes.
pub trait SensorSource: Send + 'static {
    /// Reader type for one connection.
    type Reader: AsyncRead + Unpin + Send;

    /// Open a fresh connection.
    fn open(&mut self) -> impl Future<Output = Result<Self::Reader, SourceError>> + Send;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Where the sensor byte stream comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorEndpoint {
    /// A character device, opened read-only.
    ///
    /// Reads go through `tokio::fs`, which runs them on the blocking pool.
    /// Cancelling the worker returns at once, but a read already parked on a
    /// silent device keeps its blocking thread until the device yields a
    /// byte or the runtime is shut down with a timeout.
    Device(PathBuf),

    /// A TCP serial bridge, as `host:port`.
    Tcp(String),
}

impl FromStr for SensorEndpoint {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(addr) = s.strip_prefix("tcp://") {
            let valid = addr
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            return if valid {
                Ok(Self::Tcp(addr.to_string()))
            } else {
                Err(SourceError::InvalidSource(s.to_string()))
            };
        }
        if s.is_empty() || s.contains("://") {
            return Err(SourceError::InvalidSource(s.to_string()));
        }
        Ok(Self::Device(PathBuf::from(s)))
    }
}

impl fmt::Display for SensorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(path) => write!(f, "{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

impl SensorSource for SensorEndpoint {
    type Reader = SensorReader;

    async fn open(&mut self) -> Result<Self::Reader, SourceError> {
        let endpoint = self.to_string();
        let open_error = move |source: std::io::Error| SourceError::Open { endpoint, source };

        match &*self {
            Self::Device(path) => {
                let file = tokio::fs::File::open(path).await.map_err(open_error)?;
                Ok(Box::pin(file) as SensorReader)
            }
            Self::Tcp(addr) => {
                let stream = tokio::net::TcpStream::connect(addr.as_str())
                    .await
                    .map_err(open_error)?;
                Ok(Box::pin(stream) as SensorReader)
            }
        }
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}
