//! FileSink - raw packet capture
//!
//! Appends every packet's exact wire bytes to one file, producing a
//! byte-for-byte transcript of what the timing listener would receive.

use contracts::{ContractError, DataSink, OutboundPacket};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Capture file path
    pub path: PathBuf,
    /// Truncate instead of appending
    pub truncate: bool,
}

impl FileSinkConfig {
    /// Create config from params map (`path`, `truncate`)
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output/capture.bin"));

        let truncate = params
            .get("truncate")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Self { path, truncate }
    }
}

/// Sink that appends raw packet bytes to a file
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Open (and create if needed) the capture file
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(!config.truncate)
            .truncate(config.truncate)
            .open(&config.path)?;

        Ok(Self {
            name: name.into(),
            config,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params);
        Self::new(name, config)
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, ContractError> {
        let name = &self.name;
        self.writer
            .as_mut()
            .ok_or_else(|| ContractError::sink_write(name, "capture file closed"))
    }

    fn append(&mut self, packet: &OutboundPacket) -> Result<(), ContractError> {
        let name = self.name.clone();
        self.writer()?.write_all(&packet.bytes).map_err(|e| {
            error!(sink = %name, sequence = packet.sequence, error = %e, "Write failed");
            ContractError::sink_write(&name, e.to_string())
        })
    }
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, packet),
        fields(sink = %self.name, sequence = packet.sequence)
    )]
    async fn write(&mut self, packet: &OutboundPacket) -> Result<(), ContractError> {
        self.append(packet)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        let name = self.name.clone();
        self.writer()?
            .flush()
            .map_err(|e| ContractError::sink_write(name, e.to_string()))
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        debug!(sink = %self.name, path = %self.config.path.display(), "FileSink closed");
        Ok(())
    }
}
