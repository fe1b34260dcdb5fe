use bytes::BytesMut;

pub const NAL_SLICE_NON_IDR: u8 = 1;
pub const NAL_SLICE_IDR: u8 = 5;
pub const NAL_SEI: u8 = 6;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;
pub const NAL_AUD: u8 = 9;

/// Keeps a stray stream without PUSIs from growing the window forever.
const MAX_WINDOW_BYTES: usize = 512 * 1024;

/// Classification of one H.264 access unit.
#[derive(Debug, Clone, Default)]
pub struct FrameInfo {
    pub is_idr: bool,
    pub has_sps: bool,
    pub has_pps: bool,
    pub has_aud: bool,
    pub primary_nal_type: u8,
    pub nal_types: Vec<u8>,
}

impl FrameInfo {
    /// An access unit the output can start or restart from.
    pub fn is_clean_switch_point(&self) -> bool {
        self.is_idr && self.has_sps && self.has_pps
    }
}

/// Accumulates the elementary-stream bytes of one video access unit and
/// classifies its NAL units. Access units are delimited by the caller (a new
/// PUSI on the video PID) or by an access unit delimiter inside the window.
pub struct NalScanner {
    window: BytesMut,
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
}

impl NalScanner {
    pub fn new() -> Self {
        Self {
            window: BytesMut::new(),
            sps: None,
            pps: None,
        }
    }

    pub fn push_payload(&mut self, es: &[u8]) {
        if self.window.len() + es.len() > MAX_WINDOW_BYTES {
            self.window.clear();
        }
        self.window.extend_from_slice(es);
    }

    /// Classifies the access unit accumulated so far and clears the window.
    pub fn finish_access_unit(&mut self) -> FrameInfo {
        let info = self.scan();
        self.window.clear();
        info
    }

    /// Re-arms the scanner for a new loop; parameter-set caches are cleared.
    pub fn reset(&mut self) {
        self.window.clear();
        self.sps = None;
        self.pps = None;
    }

    /// Latest captured sequence parameter set, NAL header included.
    pub fn sps(&self) -> Option<&[u8]> {
        self.sps.as_deref()
    }

    pub fn pps(&self) -> Option<&[u8]> {
        self.pps.as_deref()
    }

    fn scan(&mut self) -> FrameInfo {
        let data: &[u8] = &self.window;
        let mut info = FrameInfo::default();
        let mut starts = Vec::new();
        let mut i = 0;
        while i + 3 <= data.len() {
            if data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x01 {
                starts.push(i + 3);
                i += 3;
            } else {
                i += 1;
            }
        }

        for (n, &start) in starts.iter().enumerate() {
            if start >= data.len() {
                break;
            }
            let nal_type = data[start] & 0x1f;

            // A second delimiter closes the unit; anything after it belongs
            // to the next access unit.
            if nal_type == NAL_AUD && !info.nal_types.is_empty() {
                break;
            }

            let mut end = starts
                .get(n + 1)
                .map(|&next| next - 3)
                .unwrap_or(data.len());
            // A four-byte start code leaves one zero of the next code's
            // prefix at the tail of this unit.
            if end > start && data[end - 1] == 0x00 {
                end -= 1;
            }

            info.nal_types.push(nal_type);
            match nal_type {
                NAL_AUD => info.has_aud = true,
                NAL_SPS => {
                    info.has_sps = true;
                    self.sps = Some(data[start..end].to_vec());
                }
                NAL_PPS => {
                    info.has_pps = true;
                    self.pps = Some(data[start..end].to_vec());
                }
                NAL_SLICE_IDR => {
                    info.is_idr = true;
                    if info.primary_nal_type == 0 {
                        info.primary_nal_type = nal_type;
                    }
                }
                NAL_SLICE_NON_IDR..=4 => {
                    if info.primary_nal_type == 0 {
                        info.primary_nal_type = nal_type;
                    }
                }
                _ => {}
            }
        }

        if info.primary_nal_type == 0 {
            info.primary_nal_type = info.nal_types.first().copied().unwrap_or(0);
        }
        info
    }
}

impl Default for NalScanner {
    fn default() -> Self {
        Self::new()
    }
}
