//! NetworkSink - TCP stream to the timing listener
//!
//! Fire-and-forget: a failed write is reported once and never retried. After
//! a write error the stream is dropped and later writes fail fast.

use contracts::{ContractError, DataSink, OutboundPacket};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, error, info, instrument, warn};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// Listener address (`host:port`, host names are resolved)
    pub addr: String,
    pub connect_timeout: Duration,
}

impl NetworkSinkConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Create config from params map (`addr`, `connect_timeout_ms`)
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr = params
            .get("addr")
            .filter(|a| !a.is_empty())
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let connect_timeout = match params.get("connect_timeout_ms") {
            Some(ms) => Duration::from_millis(
                ms.parse()
                    .map_err(|e| format!("invalid connect_timeout_ms '{ms}': {e}"))?,
            ),
            None => DEFAULT_CONNECT_TIMEOUT,
        };

        Ok(Self {
            addr: addr.clone(),
            connect_timeout,
        })
    }
}

/// Sink that writes packets to a TCP stream
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    stream: Option<TcpStream>,
}

impl NetworkSink {
    /// Connect to the listener
    #[instrument(name = "network_sink_connect", skip(name, config), fields(addr = %config.addr))]
    pub async fn connect(
        name: impl Into<String>,
        config: NetworkSinkConfig,
    ) -> std::io::Result<Self> {
        let name = name.into();
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&config.addr))
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", config.addr),
                )
            })??;
        stream.set_nodelay(true)?;

        info!(sink = %name, target = %config.addr, "NetworkSink connected");

        Ok(Self {
            name,
            config,
            stream: Some(stream),
        })
    }

    /// Create from params (for factory)
    #[instrument(name = "network_sink_from_params", skip(name, params))]
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| ContractError::sink_connection(&name, e))?;

        Self::connect(name.clone(), config)
            .await
            .map_err(|e| ContractError::sink_connection(name, e.to_string()))
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn transmit(&mut self, packet: &OutboundPacket) -> Result<(), ContractError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ContractError::sink_write(&self.name, "not connected"));
        };

        match stream.write_all(&packet.bytes).await {
            Ok(()) => {
                debug!(
                    sink = %self.name,
                    sequence = packet.sequence,
                    bytes = packet.bytes.len(),
                    "Sent"
                );
                Ok(())
            }
            Err(e) => {
                error!(sink = %self.name, target = %self.config.addr, error = %e, "TCP send failed");
                self.stream = None;
                Err(ContractError::sink_write(&self.name, e.to_string()))
            }
        }
    }
}

impl DataSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "network_sink_write",
        skip(self, packet),
        fields(sink = %self.name, sequence = packet.sequence)
    )]
    async fn write(&mut self, packet: &OutboundPacket) -> Result<(), ContractError> {
        self.transmit(packet).await
    }

    #[instrument(name = "network_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(stream) = self.stream.as_mut() {
            stream
                .flush()
                .await
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "network_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                warn!(sink = %self.name, error = %e, "TCP shutdown failed");
            }
        }
        debug!(sink = %self.name, "NetworkSink closed");
        Ok(())
    }
}
