use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::stats::RelayStats;
use crate::ts::TsPacket;

/// Where the engine writes the emitted stream. Implemented by the real sink
/// and by test collectors.
pub trait PacketSink: Send {
    fn write_packet(&mut self, pkt: &TsPacket) -> std::io::Result<()>;
}

enum SinkTarget {
    /// Child muxer process remuxing our MPEG-TS to RTMP.
    Rtmp(String),
    /// Plain file or named pipe.
    Path(PathBuf),
}

/// Blocking sink owned by the engine thread. Writes throttle the whole
/// pipeline by design; a broken pipe closes the handle and the next write
/// reopens it, with the engine restarting at a clean switch point.
pub struct OutputSink {
    target: SinkTarget,
    pacing: Duration,
    stats: Arc<RelayStats>,
    child: Option<Child>,
    writer: Option<Box<dyn Write + Send>>,
}

impl OutputSink {
    pub fn new(url: &str, pacing_us: u64, stats: Arc<RelayStats>) -> Self {
        let target = if url.starts_with("rtmp://") || url.starts_with("rtmps://") {
            SinkTarget::Rtmp(url.to_string())
        } else {
            SinkTarget::Path(PathBuf::from(url))
        };
        Self {
            target,
            pacing: Duration::from_micros(pacing_us),
            stats,
            child: None,
            writer: None,
        }
    }

    fn open(&mut self) -> std::io::Result<()> {
        match &self.target {
            SinkTarget::Rtmp(url) => {
                let mut child = Command::new("ffmpeg")
                    .args([
                        "-hide_banner",
                        "-loglevel",
                        "warning",
                        "-f",
                        "mpegts",
                        "-i",
                        "-",
                        "-c",
                        "copy",
                        "-f",
                        "flv",
                        url,
                    ])
                    .stdin(Stdio::piped())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()?;
                let stdin = child.stdin.take().ok_or_else(|| {
                    std::io::Error::other("failed to capture muxer stdin")
                })?;
                self.child = Some(child);
                self.writer = Some(Box::new(stdin));
                tracing::info!(url = %url, "sink muxer started");
            }
            SinkTarget::Path(path) => {
                let file = std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(path)?;
                self.writer = Some(Box::new(file));
                tracing::info!(path = %path.display(), "sink opened");
            }
        }
        self.stats.rtmp_connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn close(&mut self) {
        self.writer = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.stats.rtmp_connected.store(false, Ordering::Relaxed);
    }
}

impl PacketSink for OutputSink {
    fn write_packet(&mut self, pkt: &TsPacket) -> std::io::Result<()> {
        if self.writer.is_none() {
            self.open()?;
        }
        let result = match self.writer.as_mut() {
            Some(writer) => writer.write_all(pkt.as_bytes()),
            None => return Err(std::io::Error::other("sink not open")),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "sink write failed, reopening");
            self.close();
            self.stats.packets_dropped.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }
        self.stats.note_write();
        if !self.pacing.is_zero() {
            std::thread::sleep(self.pacing);
        }
        Ok(())
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        self.close();
    }
}
