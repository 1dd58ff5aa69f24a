use crate::prelude::*;

use crate::error::{Stage, TransportError};
use crate::steca::packet::Decoder;
use crate::steca::telegram::{Telegram, TelegramFactory};

use {
    bytes::BytesMut,
    std::collections::HashMap,
    std::time::Duration,
    tokio::io::{AsyncReadExt, AsyncWriteExt},
    tokio::net::TcpStream,
    tokio::time::timeout,
};

/// Upper bound on a single response.
pub const MAX_RESPONSE_LEN: usize = 1024;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// More consecutive failures than this and the inverter is considered gone.
pub const UNREACHABLE_THRESHOLD: u32 = 5;

/// Per-client state that survives between round trips.
#[derive(Clone, Debug, Default)]
pub struct ConnectionState {
    consecutive_errors: u32,
    last_values: HashMap<RequestKind, DecodedValue>,
}

impl ConnectionState {
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn last_value(&self, kind: RequestKind) -> Option<&DecodedValue> {
        self.last_values.get(&kind)
    }

    fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Returns true once the failure count passes the unreachable threshold.
    fn record_failure(&mut self) -> bool {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        if self.consecutive_errors > UNREACHABLE_THRESHOLD {
            self.last_values.clear();
            true
        } else {
            false
        }
    }

    fn remember(&mut self, kind: RequestKind, value: &DecodedValue) {
        if value.is_available() {
            self.last_values.insert(kind, value.clone());
        }
    }
}

/// Client for one inverter. Each query is one short-lived TCP connection;
/// `&mut self` keeps requests to the same device strictly sequential.
#[derive(Clone, Debug)]
pub struct Inverter {
    host: String,
    port: u16,
    timeout: Duration,
    decoder: Decoder,
    state: ConnectionState,
}

impl Inverter {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout: DEFAULT_TIMEOUT,
            decoder: Decoder::new(),
            state: ConnectionState::default(),
        }
    }

    pub fn from_config(config: &config::Inverter) -> Self {
        Self::new(config.host(), config.port())
            .with_timeout(Duration::from_secs(config.read_timeout()))
            .with_decoder(
                Decoder::new()
                    .with_marker_search(config.marker_search())
                    .with_strict_checksum(config.strict_checksum()),
            )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.state.consecutive_errors()
    }

    /// Last reading successfully decoded for `kind`, if the inverter has not
    /// been declared unreachable since.
    pub fn last_value(&self, kind: RequestKind) -> Option<&DecodedValue> {
        self.state.last_value(kind)
    }

    pub async fn query(&mut self, kind: RequestKind) -> Result<DecodedValue, TransportError> {
        let telegram = TelegramFactory::build(kind);
        debug!("{}: TX {} [{}]", self.addr(), kind, telegram);

        let response = self.round_trip(&telegram).await?;
        debug!("{}: RX {} bytes [{}]", self.addr(), response.len(), Utils::hex(&response));

        let value = self.decoder.decode(kind, &response);
        self.state.remember(kind, &value);

        Ok(value)
    }

    /// One request, one connection. Updates the failure counter either way.
    pub async fn round_trip(&mut self, telegram: &Telegram) -> Result<Vec<u8>, TransportError> {
        match self.exchange(telegram).await {
            Ok(response) => {
                self.state.record_success();
                Ok(response)
            }
            Err(err) => {
                if self.state.record_failure() {
                    warn!(
                        "No response from inverter {} ({} consecutive failures): {}",
                        self.addr(),
                        self.state.consecutive_errors(),
                        err
                    );
                    Err(TransportError::Unreachable {
                        failures: self.state.consecutive_errors(),
                        last: Box::new(err),
                    })
                } else {
                    debug!(
                        "No response from inverter {} ({}): {}",
                        self.addr(),
                        self.state.consecutive_errors(),
                        err
                    );
                    Err(err)
                }
            }
        }
    }

    // the stream is dropped, closing the connection, on every return path
    async fn exchange(&self, telegram: &Telegram) -> Result<Vec<u8>, TransportError> {
        let addr = self.addr();
        let io_error = |stage, source| TransportError::Io {
            stage,
            addr: addr.clone(),
            source,
        };
        let timed_out = |stage| TransportError::Timeout {
            stage,
            addr: addr.clone(),
            after: self.timeout,
        };

        let mut stream = match timeout(
            self.timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(io_error(Stage::Connect, e)),
            Err(_) => return Err(timed_out(Stage::Connect)),
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        match timeout(self.timeout, stream.write_all(telegram.as_bytes())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(io_error(Stage::Write, e)),
            Err(_) => return Err(timed_out(Stage::Write)),
        }

        let mut buf = BytesMut::with_capacity(MAX_RESPONSE_LEN);
        let read = async {
            loop {
                let len = stream.read_buf(&mut buf).await?;
                if len == 0 || Self::is_complete(&buf) {
                    return Ok::<(), std::io::Error>(());
                }
            }
        };

        match timeout(self.timeout, read).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(io_error(Stage::Read, e)),
            // bridge kept the socket open after a short frame, let the
            // decoder judge what did arrive
            Err(_) if !buf.is_empty() => {
                debug!("{}: read timed out with {} bytes buffered", addr, buf.len());
            }
            Err(_) => return Err(timed_out(Stage::Read)),
        }

        if buf.is_empty() {
            return Err(TransportError::Closed { addr });
        }

        buf.truncate(MAX_RESPONSE_LEN);
        Ok(buf.to_vec())
    }

    /// A response is complete once the length announced in bytes 2..4 has
    /// arrived, or the buffer is full.
    fn is_complete(buf: &[u8]) -> bool {
        if buf.len() >= MAX_RESPONSE_LEN {
            return true;
        }

        match Utils::u16ify_be(buf, 2) {
            Some(declared) if declared as usize >= 4 => buf.len() >= declared as usize,
            _ => false,
        }
    }
}
