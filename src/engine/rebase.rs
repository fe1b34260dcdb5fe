use crate::analyze::StreamInfo;
use crate::ts::time::{wrapping_delta, TIMESTAMP_MASK};
use crate::ts::TsPacket;

/// Timestamp bases of one source, captured from the first usable access
/// unit after readiness and fixed until the source is reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceBases {
    pub pts_base: u64,
    pub audio_pts_base: u64,
    pub pcr_base: u64,
}

/// Rewrites PCR, PTS and DTS so the output timeline keeps increasing across
/// source switches. The 90 kHz offset drives both clocks; a 27 MHz ledger
/// (the 90 kHz offset times 300, kept modulo 2^33) is carried alongside.
pub struct TimestampRebaser {
    pts_offset: u64,
    pcr_offset: u64,
}

impl TimestampRebaser {
    pub fn new() -> Self {
        Self {
            pts_offset: 0,
            pcr_offset: 0,
        }
    }

    pub fn pts_offset(&self) -> u64 {
        self.pts_offset
    }

    pub fn pcr_offset(&self) -> u64 {
        self.pcr_offset
    }

    /// Moves the output timeline past a finished segment. `segment_duration`
    /// is in 90 kHz ticks.
    pub fn advance_offsets(&mut self, segment_duration: u64) {
        self.pts_offset = (self.pts_offset + segment_duration) & TIMESTAMP_MASK;
        self.pcr_offset = (self.pcr_offset + segment_duration * 300) & TIMESTAMP_MASK;
    }

    /// Rebases every timestamp the packet carries. PAT packets are never
    /// rewritten; PES timestamps are only touched on the source's video and
    /// audio PIDs.
    pub fn rebase_packet(&self, pkt: &mut TsPacket, bases: &SourceBases, info: &StreamInfo) {
        if pkt.is_pat() {
            return;
        }

        if let Some(orig) = pkt.pcr_base() {
            let rebased = (wrapping_delta(orig, bases.pcr_base) + self.pts_offset) & TIMESTAMP_MASK;
            pkt.set_pcr_base(rebased);
        }

        if !pkt.is_pes_start() {
            return;
        }
        let pid = pkt.pid();
        let base = if pid == info.video_pid {
            bases.pts_base
        } else if pid == info.audio_pid {
            bases.audio_pts_base
        } else {
            return;
        };

        if let Some(pts) = pkt.pes_pts() {
            pkt.set_pes_pts((wrapping_delta(pts, base) + self.pts_offset) & TIMESTAMP_MASK);
        }
        if let Some(dts) = pkt.pes_dts() {
            pkt.set_pes_dts((wrapping_delta(dts, base) + self.pts_offset) & TIMESTAMP_MASK);
        }
    }
}

impl Default for TimestampRebaser {
    fn default() -> Self {
        Self::new()
    }
}
