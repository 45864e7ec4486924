//! TimingPacket - what the timing listener receives
//!
//! A packet is one line of the listener protocol before encoding:
//! `<sync><opcode>,<HH:MM:SS.mmm>[,<lane>][,<event>[,<round>[,<heat>]]]\r\n`

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Lane, Timestamp};

/// Whether the listener may derive its clock from this packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SyncStatus {
    /// Suitable for Internal Sync
    SyncOk = 0x01,
    /// Not suitable for Internal Sync
    NoSync = 0x02,
}

impl SyncStatus {
    /// Leading wire byte
    #[inline]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    pub const fn from_flag(sync_ok: bool) -> Self {
        if sync_ok {
            Self::SyncOk
        } else {
            Self::NoSync
        }
    }
}

/// Packet semantic type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    /// Lap crossing (`S`)
    Split,
    /// Zero / start time (`Z`)
    Zero,
    /// Current time of day (`T`)
    TimeOfDay,
}

impl OpCode {
    /// Single-letter wire tag
    pub const fn letter(self) -> &'static str {
        match self {
            Self::Split => "S",
            Self::Zero => "Z",
            Self::TimeOfDay => "T",
        }
    }
}

/// Round label, optionally narrowed to a heat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundLabel {
    pub round: String,
    pub heat: Option<String>,
}

/// Event label, optionally narrowed to a round (and heat).
///
/// The nesting makes "heat without round" and "round without event"
/// unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLabel {
    pub event: String,
    pub round: Option<RoundLabel>,
}

impl EventLabel {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            round: None,
        }
    }

    pub fn with_round(mut self, round: impl Into<String>) -> Self {
        self.round = Some(RoundLabel {
            round: round.into(),
            heat: None,
        });
        self
    }

    /// Attach a heat; ignored when no round is set.
    pub fn with_heat(mut self, heat: impl Into<String>) -> Self {
        if let Some(round) = self.round.as_mut() {
            round.heat = Some(heat.into());
        }
        self
    }

    /// Labels in wire order.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = vec![self.event.as_str()];
        if let Some(round) = &self.round {
            fields.push(round.round.as_str());
            if let Some(heat) = &round.heat {
                fields.push(heat.as_str());
            }
        }
        fields
    }
}

/// One timing report. Lane is present exactly for `Split` packets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingPacket {
    sync_status: SyncStatus,
    opcode: OpCode,
    time: Timestamp,
    lane: Option<Lane>,
    labels: Option<EventLabel>,
}

impl TimingPacket {
    /// Lap crossing for `lane` at `time`.
    pub fn split(sync_status: SyncStatus, time: Timestamp, lane: Lane) -> Self {
        Self {
            sync_status,
            opcode: OpCode::Split,
            time,
            lane: Some(lane),
            labels: None,
        }
    }

    /// Race start marker.
    pub fn zero(sync_status: SyncStatus, time: Timestamp) -> Self {
        Self {
            sync_status,
            opcode: OpCode::Zero,
            time,
            lane: None,
            labels: None,
        }
    }

    /// Time-of-day sync marker.
    pub fn time_of_day(sync_status: SyncStatus, time: Timestamp) -> Self {
        Self {
            sync_status,
            opcode: OpCode::TimeOfDay,
            time,
            lane: None,
            labels: None,
        }
    }

    pub fn with_labels(mut self, labels: Option<EventLabel>) -> Self {
        self.labels = labels;
        self
    }

    /// Same packet reported at a different time.
    pub fn with_time(mut self, time: Timestamp) -> Self {
        self.time = time;
        self
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    pub fn time(&self) -> Timestamp {
        self.time
    }

    pub fn lane(&self) -> Option<Lane> {
        self.lane
    }

    pub fn labels(&self) -> Option<&EventLabel> {
        self.labels.as_ref()
    }
}

/// Packet plus its encoded wire bytes, as handed to sinks.
#[derive(Debug, Clone)]
pub struct OutboundPacket {
    /// Monotonically increasing per dispatcher
    pub sequence: u64,
    pub packet: TimingPacket,
    pub bytes: Bytes,
}

impl OutboundPacket {
    /// Wire text without the sync byte and CRLF, for display.
    pub fn display_text(&self) -> String {
        wire_text(&self.bytes)
    }
}

/// Encoded packet bytes as display text (sync byte and CRLF stripped).
pub fn wire_text(bytes: &[u8]) -> String {
    let body = bytes.get(1..).unwrap_or_default();
    String::from_utf8_lossy(body).trim_end().to_string()
}
