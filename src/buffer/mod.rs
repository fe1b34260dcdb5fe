pub mod queue;

pub use queue::PacketQueue;

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::ts::TsPacket;

/// Roughly three seconds of a 2 Mb/s stream.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1500;

/// Contiguous copy of buffered packets starting at a switch point.
pub struct Snapshot {
    pub packets: Vec<TsPacket>,
    /// Sequence of the first packet in `packets`.
    pub start_seq: u64,
    /// Sequence of the first audio PES start at or after the switch point.
    pub audio_sync_seq: u64,
    /// Buffer head at snapshot time; `init_consume_from(end_seq)` stitches
    /// live consumption onto the snapshot without duplication or gap.
    pub end_seq: u64,
}

/// Ring of recent packets for one source, indexed by absolute sequence
/// numbers that survive eviction. One producer (the source indexer), one
/// consumer (the engine); a mutex and condvar cover both.
pub struct SourceBuffer {
    state: Mutex<BufferState>,
    cond: Condvar,
    capacity: usize,
}

struct BufferState {
    packets: VecDeque<TsPacket>,
    first_seq: u64,
    pids_known: bool,
    first_idr: Option<u64>,
    latest_idr: Option<u64>,
    audio_sync: Option<u64>,
    consume_cursor: u64,
    last_snapshot_end: u64,
    /// Switch points below this sequence predate the last re-arm and are
    /// not fresh.
    rearm_floor: u64,
    /// Recent audio PES starts, kept so an audio sync point can be resolved
    /// for an IDR that is only recognized once its access unit completes.
    recent_audio: VecDeque<u64>,
    closed: bool,
}

const RECENT_AUDIO_KEPT: usize = 64;

impl BufferState {
    fn head_seq(&self) -> u64 {
        self.first_seq + self.packets.len() as u64
    }

    fn ready(&self) -> bool {
        self.pids_known && self.latest_idr.is_some() && self.audio_sync.is_some()
    }

    fn get(&self, seq: u64) -> Option<&TsPacket> {
        if seq < self.first_seq {
            return None;
        }
        self.packets.get((seq - self.first_seq) as usize)
    }
}

impl SourceBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BufferState {
                packets: VecDeque::with_capacity(capacity),
                first_seq: 0,
                pids_known: false,
                first_idr: None,
                latest_idr: None,
                audio_sync: None,
                consume_cursor: 0,
                last_snapshot_end: 0,
                rearm_floor: 0,
                recent_audio: VecDeque::new(),
                closed: false,
            }),
            cond: Condvar::new(),
            capacity: capacity.max(16),
        }
    }

    /// Appends a packet, evicting the oldest when full, and returns the
    /// sequence number assigned to it.
    pub fn push(&self, pkt: TsPacket) -> u64 {
        let mut state = self.state.lock().unwrap();
        if state.packets.len() >= self.capacity {
            state.packets.pop_front();
            state.first_seq += 1;
            // A consumer that fell behind the ring resumes at the oldest
            // packet still held.
            if state.consume_cursor < state.first_seq {
                state.consume_cursor = state.first_seq;
            }
            let first_seq = state.first_seq;
            let drop_if_evicted = |idx: &mut Option<u64>| {
                if idx.is_some_and(|s| s < first_seq) {
                    *idx = None;
                }
            };
            drop_if_evicted(&mut state.first_idr);
            drop_if_evicted(&mut state.latest_idr);
            drop_if_evicted(&mut state.audio_sync);
        }
        let seq = state.head_seq();
        state.packets.push_back(pkt);
        drop(state);
        self.cond.notify_all();
        seq
    }

    pub fn mark_pids_known(&self) {
        let mut state = self.state.lock().unwrap();
        state.pids_known = true;
        drop(state);
        self.cond.notify_all();
    }

    /// Records a clean switch point starting at `seq`. Points older than the
    /// last re-arm are ignored; a newer point invalidates an audio sync that
    /// now precedes it and re-resolves one from recent audio starts.
    pub fn mark_idr(&self, seq: u64) {
        let mut state = self.state.lock().unwrap();
        if seq < state.rearm_floor {
            return;
        }
        if state.first_idr.is_none() {
            state.first_idr = Some(seq);
        }
        state.latest_idr = Some(seq);
        if state.audio_sync.is_some_and(|a| a < seq) {
            state.audio_sync = None;
        }
        if state.audio_sync.is_none() {
            state.audio_sync = state.recent_audio.iter().copied().find(|&a| a >= seq);
        }
        drop(state);
        self.cond.notify_all();
    }

    /// Notes an audio PES start. It becomes the audio sync point when it is
    /// the first one at or after the latest switch point.
    pub fn note_audio_pusi(&self, seq: u64) {
        let mut state = self.state.lock().unwrap();
        state.recent_audio.push_back(seq);
        if state.recent_audio.len() > RECENT_AUDIO_KEPT {
            state.recent_audio.pop_front();
        }
        let Some(idr) = state.latest_idr else {
            return;
        };
        if state.audio_sync.is_none() && seq >= idr {
            state.audio_sync = Some(seq);
            drop(state);
            self.cond.notify_all();
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().unwrap().ready()
    }

    /// Blocks until PIDs are known, a clean switch point is buffered and an
    /// audio sync point follows it, or until `timeout`.
    pub fn wait_for_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        while !state.ready() && !state.closed {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self.cond.wait_timeout(state, deadline - now).unwrap().0;
        }
        state.ready()
    }

    /// Forgets all switch points so the next ones observed are fresh.
    pub fn rearm(&self) {
        let mut state = self.state.lock().unwrap();
        state.rearm_floor = state.head_seq();
        state.first_idr = None;
        state.latest_idr = None;
        state.audio_sync = None;
        state.recent_audio.clear();
    }

    /// Copies everything from the latest clean switch point to the head.
    pub fn snapshot_from_idr(&self) -> Option<Snapshot> {
        let mut state = self.state.lock().unwrap();
        let start = state.latest_idr?;
        Self::snapshot_locked(&mut state, start, start)
    }

    /// Like `snapshot_from_idr`, but requires the audio sync point and
    /// reports it so the caller can align audio emission to it.
    pub fn snapshot_from_audio_sync(&self) -> Option<Snapshot> {
        let mut state = self.state.lock().unwrap();
        let start = state.latest_idr?;
        let audio_sync = state.audio_sync?;
        Self::snapshot_locked(&mut state, start, audio_sync)
    }

    fn snapshot_locked(state: &mut BufferState, start: u64, audio_sync: u64) -> Option<Snapshot> {
        let end = state.head_seq();
        let mut packets = Vec::with_capacity((end - start) as usize);
        for seq in start..end {
            packets.push(state.get(seq)?.clone());
        }
        state.last_snapshot_end = end;
        Some(Snapshot {
            packets,
            start_seq: start,
            audio_sync_seq: audio_sync,
            end_seq: end,
        })
    }

    pub fn last_snapshot_end(&self) -> u64 {
        self.state.lock().unwrap().last_snapshot_end
    }

    /// Positions the consume cursor so the next `consume` starts at `seq`.
    pub fn init_consume_from(&self, seq: u64) {
        let mut state = self.state.lock().unwrap();
        state.consume_cursor = seq.max(state.first_seq);
    }

    /// Returns packets in `[cursor, head)`, at most `max`, advancing the
    /// cursor; blocks up to `timeout` when nothing new is buffered.
    pub fn consume(&self, max: usize, timeout: Duration) -> Vec<TsPacket> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        loop {
            if state.consume_cursor < state.first_seq {
                state.consume_cursor = state.first_seq;
            }
            if state.consume_cursor < state.head_seq() || state.closed {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                return Vec::new();
            }
            state = self.cond.wait_timeout(state, deadline - now).unwrap().0;
        }
        let head = state.head_seq();
        let take = ((head - state.consume_cursor) as usize).min(max);
        let mut out = Vec::with_capacity(take);
        for _ in 0..take {
            if let Some(pkt) = state.get(state.consume_cursor) {
                out.push(pkt.clone());
            }
            state.consume_cursor += 1;
        }
        out
    }

    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.cond.notify_all();
    }
}
