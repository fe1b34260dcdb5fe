use std::collections::HashMap;

use crate::analyze::StreamInfo;
use crate::ts::{TsPacket, PID_PAT};

/// Rewrites fallback PIDs onto the live layout and renumbers continuity
/// counters. The counters are the emitted stream's, survive source switches,
/// and are applied to every emitted packet so the output counts stay
/// gapless across a switch. Adaptation-field-only packets repeat the last
/// counter instead of advancing it.
pub struct PidMapper {
    map: HashMap<u16, u16>,
    counters: HashMap<u16, u8>,
}

impl PidMapper {
    /// Builds the fallback→live table. With no live layout (live never
    /// initialized) the fallback keeps its own PIDs.
    pub fn new(live: Option<&StreamInfo>, fallback: &StreamInfo) -> Self {
        let mut map = HashMap::new();
        map.insert(PID_PAT, PID_PAT);
        if let Some(live) = live {
            map.insert(fallback.video_pid, live.video_pid);
            map.insert(fallback.audio_pid, live.audio_pid);
            map.insert(fallback.pmt_pid, live.pmt_pid);
        }
        Self {
            map,
            counters: HashMap::new(),
        }
    }

    /// Replaces the PID table, e.g. when a source initializes late. The
    /// emitted stream's continuity counters are kept.
    pub fn rebuild(&mut self, live: Option<&StreamInfo>, fallback: &StreamInfo) {
        let counters = std::mem::take(&mut self.counters);
        *self = Self::new(live, fallback);
        self.counters = counters;
    }

    /// True when the two layouts carry different codecs, which a PID
    /// rewrite alone cannot reconcile.
    pub fn layouts_compatible(live: &StreamInfo, fallback: &StreamInfo) -> bool {
        live.video_stream_type == fallback.video_stream_type
            && live.audio_stream_type == fallback.audio_stream_type
    }

    pub fn lookup(&self, pid: u16) -> Option<u16> {
        self.map.get(&pid).copied()
    }

    /// Rewrites the packet for emission. `remap` is set when the packet
    /// comes from the non-primary source.
    pub fn process(&mut self, pkt: &mut TsPacket, remap: bool) {
        if remap {
            if let Some(&to) = self.map.get(&pkt.pid()) {
                pkt.set_pid(to);
            }
        }
        let pid = pkt.pid();
        if pkt.has_payload() {
            let counter = self.counters.entry(pid).or_insert(0);
            pkt.set_continuity_counter(*counter);
            *counter = (*counter + 1) & 0x0f;
        } else if let Some(&counter) = self.counters.get(&pid) {
            pkt.set_continuity_counter(counter.wrapping_sub(1) & 0x0f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::testutil;

    fn live_info() -> StreamInfo {
        StreamInfo {
            video_pid: 0x100,
            audio_pid: 0x101,
            pcr_pid: 0x100,
            pmt_pid: 0x1000,
            video_stream_type: crate::ts::STREAM_TYPE_H264,
            audio_stream_type: crate::ts::STREAM_TYPE_AAC_ADTS,
            initialized: true,
            ..Default::default()
        }
    }

    fn fallback_info() -> StreamInfo {
        StreamInfo {
            video_pid: 0x200,
            audio_pid: 0x201,
            pcr_pid: 0x200,
            pmt_pid: 0x1001,
            video_stream_type: crate::ts::STREAM_TYPE_H264,
            audio_stream_type: crate::ts::STREAM_TYPE_AAC_ADTS,
            initialized: true,
            ..Default::default()
        }
    }

    #[test]
    fn fallback_pids_land_on_live_values() {
        let live = live_info();
        let fallback = fallback_info();
        let mut mapper = PidMapper::new(Some(&live), &fallback);

        let mut pkt = testutil::raw_packet(0x200, true, 9, &[0u8; 10]);
        mapper.process(&mut pkt, true);
        assert_eq!(pkt.pid(), 0x100);

        let mut pkt = testutil::raw_packet(0x201, true, 9, &[0u8; 10]);
        mapper.process(&mut pkt, true);
        assert_eq!(pkt.pid(), 0x101);

        let mut pkt = testutil::raw_packet(PID_PAT, true, 9, &[0u8; 10]);
        mapper.process(&mut pkt, true);
        assert_eq!(pkt.pid(), PID_PAT);
    }

    #[test]
    fn mapping_is_bijective_on_the_configured_set() {
        let live = live_info();
        let fallback = fallback_info();
        let mapper = PidMapper::new(Some(&live), &fallback);
        let mut seen = std::collections::HashSet::new();
        for from in [PID_PAT, fallback.video_pid, fallback.audio_pid, fallback.pmt_pid] {
            let to = mapper.lookup(from).unwrap();
            assert!(seen.insert(to), "pid 0x{to:04x} mapped twice");
        }
    }

    #[test]
    fn counters_advance_only_on_payload() {
        let live = live_info();
        let fallback = fallback_info();
        let mut mapper = PidMapper::new(Some(&live), &fallback);

        let mut last = None;
        for i in 0..20u8 {
            let mut pkt = testutil::raw_packet(0x100, false, 9, &[i; 4]);
            mapper.process(&mut pkt, false);
            if let Some(last) = last {
                assert_eq!(pkt.continuity_counter(), (last + 1) & 0x0f);
            }
            last = Some(pkt.continuity_counter());
        }

        // An adaptation-only packet repeats the previous counter.
        let mut pkt = testutil::pcr_packet(0x100, 9, 0);
        mapper.process(&mut pkt, false);
        assert_eq!(pkt.continuity_counter(), last.unwrap());

        let mut pkt = testutil::raw_packet(0x100, false, 9, &[0u8; 4]);
        mapper.process(&mut pkt, false);
        assert_eq!(pkt.continuity_counter(), (last.unwrap() + 1) & 0x0f);
    }

    #[test]
    fn counters_survive_source_changes() {
        let live = live_info();
        let fallback = fallback_info();
        let mut mapper = PidMapper::new(Some(&live), &fallback);

        let mut pkt = testutil::raw_packet(0x100, false, 3, &[0u8; 4]);
        mapper.process(&mut pkt, false);
        let first = pkt.continuity_counter();

        // Fallback video remaps onto the same output PID and continues the
        // same counter.
        let mut pkt = testutil::raw_packet(0x200, false, 11, &[0u8; 4]);
        mapper.process(&mut pkt, true);
        assert_eq!(pkt.pid(), 0x100);
        assert_eq!(pkt.continuity_counter(), (first + 1) & 0x0f);
    }

    #[test]
    fn codec_mismatch_is_flagged() {
        let live = live_info();
        let mut fallback = fallback_info();
        assert!(PidMapper::layouts_compatible(&live, &fallback));
        fallback.video_stream_type = crate::ts::STREAM_TYPE_HEVC;
        assert!(!PidMapper::layouts_compatible(&live, &fallback));
    }
}
