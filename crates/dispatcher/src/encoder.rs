//! PacketEncoder - TimingPacket to wire bytes
//!
//! Wire format, one packet per line:
//!
//! ```text
//! <sync byte><opcode>,<HH:MM:SS.mmm>[,<lane>][,<event>[,<round>[,<heat>]]]\r\n
//! ```
//!
//! The sync byte is written raw (0x01 / 0x02), with no separator before the
//! opcode letter. Times are local wall-clock time.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::TimeDelta;
use contracts::{LapRecord, OpCode, SyncStatus, Timestamp, TimingPacket};

/// Wire time format (`01:02:03.456`)
const TIME_FORMAT: &str = "%H:%M:%S%.3f";

const LINE_END: &[u8] = b"\r\n";

/// Stateless packet encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketEncoder;

impl PacketEncoder {
    /// Split packet for a completed lap; time and lane come from the record.
    pub fn split_packet(record: &LapRecord, sync_ok: bool) -> TimingPacket {
        TimingPacket::split(SyncStatus::from_flag(sync_ok), record.timestamp, record.lane)
    }

    /// Race start marker
    pub fn zero_packet(start: Timestamp) -> TimingPacket {
        TimingPacket::zero(SyncStatus::SyncOk, start)
    }

    /// Time-of-day marker
    pub fn time_sync_packet(time: Timestamp) -> TimingPacket {
        TimingPacket::time_of_day(SyncStatus::SyncOk, time)
    }

    /// The two reports of one crossing: the packet itself, then the same
    /// packet `delay` later.
    ///
    /// `None` when the delayed time falls outside the representable range.
    pub fn dual_transponder(packet: TimingPacket, delay: TimeDelta) -> Option<[TimingPacket; 2]> {
        let later = packet.time().checked_add_signed(delay)?;
        let second = packet.clone().with_time(later);
        Some([packet, second])
    }

    /// Encode a packet into its wire bytes.
    pub fn encode(packet: &TimingPacket) -> Bytes {
        let mut buf = BytesMut::with_capacity(48);
        buf.put_u8(packet.sync_status().as_byte());
        buf.put_slice(Self::fields(packet).join(",").as_bytes());
        buf.put_slice(LINE_END);
        buf.freeze()
    }

    /// Comma-separated fields in wire order.
    fn fields(packet: &TimingPacket) -> Vec<String> {
        let mut fields = vec![
            packet.opcode().letter().to_string(),
            packet.time().format(TIME_FORMAT).to_string(),
        ];

        if packet.opcode() == OpCode::Split {
            if let Some(lane) = packet.lane() {
                fields.push(lane.to_string());
            }
        }

        if let Some(labels) = packet.labels() {
            fields.extend(labels.fields().into_iter().map(str::to_string));
        }
        fields
    }
}
