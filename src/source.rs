use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::analyze::{NalScanner, StreamAnalyzer, StreamInfo};
use crate::buffer::{PacketQueue, SourceBuffer};
use crate::engine::switch::SwitchController;
use crate::ts::TsPacket;

const INDEX_BATCH: usize = 64;
const INDEX_POLL: Duration = Duration::from_millis(100);

/// One ingest feed: its packet queue, its ring buffer, and the published
/// stream layout. The analyzer and NAL scanner run on the indexer thread;
/// everything here is shared between that thread and the engine.
pub struct Source {
    name: String,
    queue: Arc<PacketQueue>,
    buffer: Arc<SourceBuffer>,
    info: RwLock<StreamInfo>,
    rearm_scanner: AtomicBool,
}

impl Source {
    pub fn new(name: impl Into<String>, queue_capacity: usize, buffer_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            queue: Arc::new(PacketQueue::new(queue_capacity)),
            buffer: Arc::new(SourceBuffer::new(buffer_capacity)),
            info: RwLock::new(StreamInfo::default()),
            rearm_scanner: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> &Arc<PacketQueue> {
        &self.queue
    }

    pub fn buffer(&self) -> &Arc<SourceBuffer> {
        &self.buffer
    }

    pub fn info(&self) -> StreamInfo {
        self.info.read().unwrap().clone()
    }

    pub fn is_media_ready(&self) -> bool {
        self.info.read().unwrap().is_media_ready()
    }

    pub fn wait_for_ready(&self, timeout: Duration) -> bool {
        self.buffer.wait_for_ready(timeout)
    }

    /// Re-arms switch-point detection: the scanner forgets its parameter
    /// sets and the buffer only accepts switch points observed from now on.
    pub fn reset_for_new_loop(&self) {
        self.buffer.rearm();
        self.rearm_scanner.store(true, Ordering::Release);
    }

    pub fn close(&self) {
        self.queue.close();
        self.buffer.close();
    }
}

/// Drains the source's queue, runs PSI analysis and NAL scanning inline,
/// and maintains the buffer's switch-point indices. Blocks until shutdown;
/// run on its own thread.
pub fn run_indexer(
    source: Arc<Source>,
    controller: Option<Arc<SwitchController>>,
    running: Arc<AtomicBool>,
) {
    let mut analyzer = StreamAnalyzer::new();
    let mut scanner = NalScanner::new();
    let mut au_start: Option<u64> = None;

    tracing::debug!(source = %source.name, "indexer started");
    while running.load(Ordering::Relaxed) {
        if source.rearm_scanner.swap(false, Ordering::Acquire) {
            scanner.reset();
            au_start = None;
        }

        let batch = source.queue.pop_batch(INDEX_BATCH, INDEX_POLL);
        if batch.is_empty() {
            continue;
        }
        let now = Instant::now();
        for pkt in batch {
            if let Some(ctrl) = &controller {
                ctrl.note_live_packet(now);
            }
            index_packet(&source, &mut analyzer, &mut scanner, &mut au_start, pkt);
        }
        if analyzer.info().initialized {
            *source.info.write().unwrap() = analyzer.info().clone();
        }
    }
    tracing::debug!(source = %source.name, "indexer stopped");
}

fn index_packet(
    source: &Source,
    analyzer: &mut StreamAnalyzer,
    scanner: &mut NalScanner,
    au_start: &mut Option<u64>,
    pkt: TsPacket,
) {
    let seq = source.buffer.push(pkt.clone());

    if analyzer.observe(&pkt) {
        *source.info.write().unwrap() = analyzer.info().clone();
        source.buffer.mark_pids_known();
        tracing::info!(source = %source.name, video_pid = analyzer.info().video_pid, "source initialized");
    }
    let info = analyzer.info();
    if !info.initialized {
        return;
    }

    if pkt.pid() == info.video_pid && pkt.has_payload() {
        if pkt.payload_unit_start() {
            if let Some(start) = au_start.take() {
                let frame = scanner.finish_access_unit();
                if frame.is_clean_switch_point() {
                    source.buffer.mark_idr(start);
                    tracing::trace!(source = %source.name, seq = start, "clean switch point");
                }
            }
            *au_start = Some(seq);
        }
        if au_start.is_some() {
            if let Some(es) = pkt.pes_elementary_payload() {
                scanner.push_payload(es);
            }
        }
    } else if pkt.pid() == info.audio_pid && pkt.is_pes_start() {
        source.buffer.note_audio_pusi(seq);
    }
}

/// Test-only synchronous ingest path: pushes packets through the same
/// indexing logic without a thread.
#[cfg(test)]
pub struct TestFeeder {
    pub source: Arc<Source>,
    analyzer: StreamAnalyzer,
    scanner: NalScanner,
    au_start: Option<u64>,
}

#[cfg(test)]
impl TestFeeder {
    pub fn new(source: Arc<Source>) -> Self {
        Self {
            source,
            analyzer: StreamAnalyzer::new(),
            scanner: NalScanner::new(),
            au_start: None,
        }
    }

    pub fn feed(&mut self, pkt: TsPacket) {
        if self.source.rearm_scanner.swap(false, Ordering::Acquire) {
            self.scanner.reset();
            self.au_start = None;
        }
        index_packet(
            &self.source,
            &mut self.analyzer,
            &mut self.scanner,
            &mut self.au_start,
            pkt,
        );
        if self.analyzer.info().initialized {
            *self.source.info.write().unwrap() = self.analyzer.info().clone();
        }
    }
}
