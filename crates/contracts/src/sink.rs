//! DataSink trait - Dispatcher output interface
//!
//! Defines the abstract interface for byte sinks.

use crate::{ContractError, OutboundPacket};

/// Packet output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one encoded packet
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, packet: &OutboundPacket) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
