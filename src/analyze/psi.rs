use crate::ts::{
    TsPacket, PID_PAT, STREAM_TYPE_AAC_ADTS, STREAM_TYPE_AAC_LATM, STREAM_TYPE_H264,
    STREAM_TYPE_HEVC, TABLE_ID_PAT, TABLE_ID_PMT,
};

/// A source only counts as media-ready once this many video and audio PES
/// starts have been seen, so a source producing nothing but PSI is never
/// switched to.
pub const MIN_VALID_MEDIA_PACKETS: u64 = 5;

/// PID layout and media counters of one source, published once the PAT and
/// PMT have been resolved and not mutated afterwards except for the counters.
#[derive(Debug, Clone, Default)]
pub struct StreamInfo {
    pub video_pid: u16,
    pub audio_pid: u16,
    pub pcr_pid: u16,
    pub pmt_pid: u16,
    pub program_number: u16,
    pub video_stream_type: u8,
    pub audio_stream_type: u8,
    pub initialized: bool,
    pub valid_video_count: u64,
    pub valid_audio_count: u64,
}

impl StreamInfo {
    pub fn is_media_ready(&self) -> bool {
        self.initialized
            && self.valid_video_count >= MIN_VALID_MEDIA_PACKETS
            && self.valid_audio_count >= MIN_VALID_MEDIA_PACKETS
    }
}

/// Reassembles one PSI section across packets.
#[derive(Default)]
struct SectionBuffer {
    data: Vec<u8>,
    collecting: bool,
}

impl SectionBuffer {
    /// Feeds one packet's payload; returns a complete section when one is
    /// finished. A new PUSI restarts collection at the pointer field.
    fn feed(&mut self, payload: &[u8], pusi: bool) -> Option<Vec<u8>> {
        if pusi {
            if payload.is_empty() {
                return None;
            }
            let pointer = payload[0] as usize;
            if 1 + pointer >= payload.len() {
                return None;
            }
            self.data.clear();
            self.data.extend_from_slice(&payload[1 + pointer..]);
            self.collecting = true;
        } else if self.collecting {
            self.data.extend_from_slice(payload);
        } else {
            return None;
        }

        if self.data.len() < 3 {
            return None;
        }
        let section_len = 3 + (((self.data[1] as usize & 0x0f) << 8) | self.data[2] as usize);
        if self.data.len() < section_len {
            return None;
        }
        self.collecting = false;
        Some(self.data[..section_len].to_vec())
    }
}

/// Watches one source's packets, resolves PAT and PMT, and counts valid
/// media packets. Malformed PSI is dropped silently; the analyzer never
/// fails.
pub struct StreamAnalyzer {
    info: StreamInfo,
    pat: SectionBuffer,
    pmt: SectionBuffer,
    pmt_pid: Option<u16>,
}

impl StreamAnalyzer {
    pub fn new() -> Self {
        Self {
            info: StreamInfo::default(),
            pat: SectionBuffer::default(),
            pmt: SectionBuffer::default(),
            pmt_pid: None,
        }
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Consumes one packet. Returns true when this packet completed the
    /// PID discovery (the transition to `initialized`).
    pub fn observe(&mut self, pkt: &TsPacket) -> bool {
        if pkt.transport_error() {
            return false;
        }
        let Some(payload) = pkt.payload() else {
            return false;
        };
        let pid = pkt.pid();

        if pid == PID_PAT {
            if let Some(section) = self.pat.feed(payload, pkt.payload_unit_start()) {
                self.parse_pat(&section);
            }
            return false;
        }

        if !self.info.initialized {
            if Some(pid) == self.pmt_pid {
                if let Some(section) = self.pmt.feed(payload, pkt.payload_unit_start()) {
                    if self.parse_pmt(&section) {
                        return true;
                    }
                }
            }
            return false;
        }

        if pkt.payload_unit_start() && payload.len() >= 3 {
            let pes_start = payload[0] == 0x00 && payload[1] == 0x00 && payload[2] == 0x01;
            if pes_start {
                if pid == self.info.video_pid {
                    self.info.valid_video_count += 1;
                } else if pid == self.info.audio_pid {
                    self.info.valid_audio_count += 1;
                }
            }
        }
        false
    }

    fn parse_pat(&mut self, section: &[u8]) {
        if section.len() < 12 || section[0] != TABLE_ID_PAT {
            return;
        }
        let mut programs = Vec::new();
        let mut pos = 8;
        // Entries run up to the CRC32.
        while pos + 4 <= section.len() - 4 {
            let program_number = (u16::from(section[pos]) << 8) | u16::from(section[pos + 1]);
            let pid = (u16::from(section[pos + 2] & 0x1f) << 8) | u16::from(section[pos + 3]);
            if program_number != 0 {
                programs.push((program_number, pid));
            }
            pos += 4;
        }
        // Only single-program streams are routed.
        if programs.len() != 1 {
            tracing::trace!(programs = programs.len(), "ignoring PAT");
            return;
        }
        let (program_number, pmt_pid) = programs[0];
        if self.pmt_pid.is_none() {
            self.info.program_number = program_number;
            self.info.pmt_pid = pmt_pid;
            self.pmt_pid = Some(pmt_pid);
            tracing::debug!(program = program_number, pmt_pid, "resolved PAT");
        }
    }

    fn parse_pmt(&mut self, section: &[u8]) -> bool {
        if section.len() < 16 || section[0] != TABLE_ID_PMT {
            return false;
        }
        let pcr_pid = (u16::from(section[8] & 0x1f) << 8) | u16::from(section[9]);
        let program_info_len = ((section[10] as usize & 0x0f) << 8) | section[11] as usize;
        let mut pos = 12 + program_info_len;
        let end = section.len() - 4;

        let mut video: Option<(u8, u16)> = None;
        let mut audio: Option<(u8, u16)> = None;
        while pos + 5 <= end {
            let stream_type = section[pos];
            let pid = (u16::from(section[pos + 1] & 0x1f) << 8) | u16::from(section[pos + 2]);
            let es_info_len = ((section[pos + 3] as usize & 0x0f) << 8) | section[pos + 4] as usize;
            pos += 5 + es_info_len;

            match stream_type {
                STREAM_TYPE_H264 | STREAM_TYPE_HEVC if video.is_none() => {
                    video = Some((stream_type, pid));
                }
                STREAM_TYPE_AAC_ADTS | STREAM_TYPE_AAC_LATM if audio.is_none() => {
                    audio = Some((stream_type, pid));
                }
                _ => {}
            }
        }

        let (Some((video_type, video_pid)), Some((audio_type, audio_pid))) = (video, audio) else {
            tracing::trace!("PMT without usable video and audio streams");
            return false;
        };

        self.info.pcr_pid = pcr_pid;
        self.info.video_pid = video_pid;
        self.info.video_stream_type = video_type;
        self.info.audio_pid = audio_pid;
        self.info.audio_stream_type = audio_type;
        self.info.initialized = true;
        tracing::info!(
            video_pid,
            audio_pid,
            pcr_pid,
            video_type = format!("0x{video_type:02x}"),
            "stream layout resolved"
        );
        true
    }
}

impl Default for StreamAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
