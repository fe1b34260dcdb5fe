pub mod packet;
pub mod time;

#[cfg(test)]
pub mod testutil;

pub use packet::TsPacket;

/// Size of a transport stream packet in bytes.
pub const TS_PACKET_SIZE: usize = 188;
/// First byte of every TS packet.
pub const SYNC_BYTE: u8 = 0x47;

/// PID of the Program Association Table.
pub const PID_PAT: u16 = 0x0000;

pub const STREAM_TYPE_H264: u8 = 0x1b;
pub const STREAM_TYPE_HEVC: u8 = 0x24;
pub const STREAM_TYPE_AAC_ADTS: u8 = 0x0f;
pub const STREAM_TYPE_AAC_LATM: u8 = 0x11;

pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;

/// One frame at 29.97 fps in 90 kHz ticks.
pub const NOMINAL_FRAME_DURATION: u64 = 3003;
