//! # Dispatcher
//!
//! Packet encoding and delivery.
//!
//! Responsibilities:
//! - Encode `TimingPacket`s into listener wire bytes (`PacketEncoder`)
//! - Fan out encoded packets to every sink
//! - Isolate slow sinks so they never block the race loop

pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{DataSink, OutboundPacket, TimingPacket};
pub use dispatcher::{
    create_dispatcher, create_sink_handle, Dispatcher, DispatcherBuilder, DispatcherConfig,
};
pub use encoder::PacketEncoder;
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, FileSinkConfig, LogSink, NetworkSink, NetworkSinkConfig};
