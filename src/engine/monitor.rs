use std::collections::HashMap;
use std::sync::Arc;

use crate::stats::RelayStats;
use crate::ts::time::is_wraparound;
use crate::ts::TsPacket;

/// Watches the emitted stream for backwards timestamps. A decrease that is
/// not a 33-bit wraparound is counted as a discontinuity and signals a bug
/// in base selection or offset advance; packets are never rejected.
pub struct OutputMonitor {
    stats: Arc<RelayStats>,
    last_pts: HashMap<u16, u64>,
    last_dts: HashMap<u16, u64>,
    last_pcr: Option<u64>,
}

impl OutputMonitor {
    pub fn new(stats: Arc<RelayStats>) -> Self {
        Self {
            stats,
            last_pts: HashMap::new(),
            last_dts: HashMap::new(),
            last_pcr: None,
        }
    }

    pub fn observe(&mut self, pkt: &TsPacket) {
        if let Some(pcr) = pkt.pcr_base() {
            if let Some(prev) = self.last_pcr {
                if pcr < prev && !is_wraparound(pcr, prev) {
                    self.stats
                        .pcr_discontinuities
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    tracing::warn!(pid = pkt.pid(), pcr, prev, "PCR went backwards");
                }
            }
            self.last_pcr = Some(pcr);
        }

        let pid = pkt.pid();
        if let Some(pts) = pkt.pes_pts() {
            if let Some(&prev) = self.last_pts.get(&pid) {
                if pts < prev && !is_wraparound(pts, prev) {
                    self.stats
                        .pts_discontinuities
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    tracing::warn!(pid, pts, prev, "PTS went backwards");
                }
            }
            self.last_pts.insert(pid, pts);
        }
        if let Some(dts) = pkt.pes_dts() {
            if let Some(&prev) = self.last_dts.get(&pid) {
                if dts < prev && !is_wraparound(dts, prev) {
                    self.stats
                        .dts_discontinuities
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    tracing::warn!(pid, dts, prev, "DTS went backwards");
                }
            }
            self.last_dts.insert(pid, dts);
        }
    }
}
