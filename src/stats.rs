use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Process-wide counters surfaced on the health endpoint. Written by the
/// engine and sink, read by the HTTP handlers.
pub struct RelayStats {
    pub packets_written: AtomicU64,
    pub packets_dropped: AtomicU64,
    pub pts_discontinuities: AtomicU64,
    pub dts_discontinuities: AtomicU64,
    pub pcr_discontinuities: AtomicU64,
    pub rtmp_connected: AtomicBool,
    pub stream_incompatible: AtomicBool,
    last_write: Mutex<Option<Instant>>,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            packets_written: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            pts_discontinuities: AtomicU64::new(0),
            dts_discontinuities: AtomicU64::new(0),
            pcr_discontinuities: AtomicU64::new(0),
            rtmp_connected: AtomicBool::new(false),
            stream_incompatible: AtomicBool::new(false),
            last_write: Mutex::new(None),
        }
    }

    pub fn note_write(&self) {
        self.packets_written.fetch_add(1, Ordering::Relaxed);
        *self.last_write.lock().unwrap() = Some(Instant::now());
    }

    /// Milliseconds since the last sink write; `u64::MAX` before the first.
    pub fn ms_since_last_write(&self) -> u64 {
        self.last_write
            .lock()
            .unwrap()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(u64::MAX)
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}
