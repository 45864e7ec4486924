//! LogSink - logs each packet's wire text via tracing

use contracts::{ContractError, DataSink, OutboundPacket};
use tracing::{info, instrument};

/// Sink that logs packets for debugging
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_packet(&self, packet: &OutboundPacket) {
        info!(
            sink = %self.name,
            sequence = packet.sequence,
            opcode = packet.packet.opcode().letter(),
            sync = ?packet.packet.sync_status(),
            text = %packet.display_text(),
            "Timing packet"
        );
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, packet),
        fields(sink = %self.name, sequence = packet.sequence)
    )]
    async fn write(&mut self, packet: &OutboundPacket) -> Result<(), ContractError> {
        self.log_packet(packet);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
